//! Hash calculation and digest-length utilities.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Digest algorithms recognisable from the length of their hex encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Identify the algorithm from a hex digest length.
    ///
    /// Unknown lengths return `None`; they are never guessed.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "MD5"),
            HashAlgorithm::Sha1 => write!(f, "SHA-1"),
            HashAlgorithm::Sha256 => write!(f, "SHA-256"),
            HashAlgorithm::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Fingerprint of a piece of supplied evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceHashes {
    /// SHA256 hash (primary)
    pub sha256: String,
    /// MD5 hash (for compatibility with older case records)
    pub md5: String,
    /// Size in bytes
    pub size: u64,
}

/// Hash calculator for in-memory evidence.
pub struct HashCalculator;

impl HashCalculator {
    /// Calculate both hashes in a single pass over a sequence of chunks.
    pub fn hash_chunks<'a, I>(chunks: I) -> EvidenceHashes
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut sha256_hasher = Sha256::new();
        let mut md5_hasher = Md5::new();
        let mut size = 0u64;

        for chunk in chunks {
            sha256_hasher.update(chunk);
            md5_hasher.update(chunk);
            size += chunk.len() as u64;
        }

        EvidenceHashes {
            sha256: hex::encode(sha256_hasher.finalize()),
            md5: hex::encode(md5_hasher.finalize()),
            size,
        }
    }

    /// Check whether a string is plain hexadecimal.
    pub fn is_hex(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_chunks_known_digests() {
        let hashes = HashCalculator::hash_chunks([&b"hello "[..], &b"world"[..]]);
        assert_eq!(
            hashes.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(hashes.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(hashes.size, 11);
    }

    #[test]
    fn test_hash_chunks_empty() {
        let hashes = HashCalculator::hash_chunks(std::iter::empty());
        assert_eq!(hashes.md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hashes.size, 0);
    }

    #[test]
    fn test_algorithm_from_len() {
        assert_eq!(HashAlgorithm::from_hex_len(32), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::from_hex_len(64), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_hex_len(4), None);
        assert_eq!(HashAlgorithm::from_hex_len(33), None);
    }

    #[test]
    fn test_is_hex() {
        assert!(HashCalculator::is_hex("deadBEEF01"));
        assert!(!HashCalculator::is_hex("xyz"));
        assert!(!HashCalculator::is_hex(""));
    }
}
