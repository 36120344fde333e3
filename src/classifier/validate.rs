//! Per-kind validation and normalization of candidate text.

use crate::core::types::{IndicatorKind, IndicatorTag};
use crate::utils::hash::{HashAlgorithm, HashCalculator};
use std::net::Ipv4Addr;
use thiserror::Error;

/// File extensions that look like top-level domains in memory strings.
const FILE_EXTENSION_TLDS: &[&str] = &[
    "exe", "dll", "sys", "scr", "bat", "cmd", "vbs", "msi", "lnk", "bin", "dat", "log", "txt",
    "tmp", "ini", "cfg", "conf", "inf", "cab", "js", "py", "sh", "so", "ko", "zip", "rar", "gz",
    "tar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "png", "jpg", "jpeg", "gif", "bmp",
    "htm", "html", "xml", "json", "csv", "db", "sqlite", "pdb", "pyc", "class", "jar", "blk",
];

/// Suffixes accepted for process and module names.
const EXECUTABLE_SUFFIXES: &[&str] = &[
    ".exe", ".dll", ".sys", ".scr", ".bat", ".cmd", ".ps1", ".vbs", ".msi",
];

/// Registry roots with their canonical long names.
const REGISTRY_ROOTS: &[(&str, &str)] = &[
    ("HKEY_LOCAL_MACHINE", "HKEY_LOCAL_MACHINE"),
    ("HKLM", "HKEY_LOCAL_MACHINE"),
    ("HKEY_CURRENT_USER", "HKEY_CURRENT_USER"),
    ("HKCU", "HKEY_CURRENT_USER"),
    ("HKEY_CLASSES_ROOT", "HKEY_CLASSES_ROOT"),
    ("HKCR", "HKEY_CLASSES_ROOT"),
    ("HKEY_USERS", "HKEY_USERS"),
    ("HKU", "HKEY_USERS"),
    ("HKEY_CURRENT_CONFIG", "HKEY_CURRENT_CONFIG"),
    ("HKCC", "HKEY_CURRENT_CONFIG"),
];

/// Hive names that may start a root-less key.
const REGISTRY_HIVES: &[&str] = &["SOFTWARE", "SYSTEM"];

/// A candidate that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Normalized value
    pub value: String,
    /// Tags to attach to the indicator
    pub tags: Vec<IndicatorTag>,
}

impl Validated {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            tags: Vec::new(),
        }
    }

    fn tagged(mut self, tag: IndicatorTag) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} candidate '{text}' rejected: {reason}")]
pub struct ValidationRejected {
    pub kind: IndicatorKind,
    pub text: String,
    pub reason: &'static str,
}

type Outcome = std::result::Result<Validated, &'static str>;

/// Validate and normalize candidate text as the given kind.
pub fn validate(kind: IndicatorKind, text: &str) -> Result<Validated, ValidationRejected> {
    let trimmed = text.trim();
    let outcome = match kind {
        IndicatorKind::Ip => validate_ip(trimmed),
        IndicatorKind::Domain => validate_domain(trimmed),
        IndicatorKind::Hash => validate_hash(trimmed),
        IndicatorKind::FilePath => validate_path(trimmed),
        IndicatorKind::RegistryKey => validate_registry(trimmed),
        IndicatorKind::ProcessName => validate_process(trimmed),
    };

    outcome.map_err(|reason| ValidationRejected {
        kind,
        text: text.to_string(),
        reason,
    })
}

fn validate_ip(text: &str) -> Outcome {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() != 4 {
        return Err("not four octets");
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err("octet is not decimal");
        }
        if part.len() > 1 && part.starts_with('0') {
            return Err("octet has leading zero");
        }
        *slot = part.parse::<u8>().map_err(|_| "octet out of range")?;
    }

    let addr = Ipv4Addr::from(octets);
    if octets[0] == 0 {
        return Err("unspecified network");
    }
    if addr.is_loopback() {
        return Err("loopback address");
    }
    if addr.is_link_local() {
        return Err("link-local address");
    }
    if addr.is_multicast() {
        return Err("multicast address");
    }
    if addr.is_broadcast() {
        return Err("broadcast address");
    }
    if octets[0] >= 240 {
        return Err("reserved address");
    }

    let validated = Validated::new(addr.to_string());
    if addr.is_private() {
        Ok(validated.tagged(IndicatorTag::Private))
    } else {
        Ok(validated)
    }
}

fn validate_hash(text: &str) -> Outcome {
    if !HashCalculator::is_hex(text) {
        return Err("not hexadecimal");
    }
    let algorithm = HashAlgorithm::from_hex_len(text.len()).ok_or("unsupported digest length")?;

    let value = text.to_ascii_lowercase();
    let first = value.as_bytes()[0];
    if value.bytes().all(|b| b == first) {
        return Err("single repeated digit");
    }

    Ok(Validated::new(value).tagged(IndicatorTag::Digest(algorithm)))
}

fn validate_domain(text: &str) -> Outcome {
    let value = text.strip_suffix('.').unwrap_or(text).to_ascii_lowercase();
    if value.is_empty() || value.len() > 253 {
        return Err("bad domain length");
    }

    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return Err("single label");
    }
    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err("bad label length");
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err("invalid label character");
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err("label has edge hyphen");
        }
    }

    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.bytes().all(|b| b.is_ascii_lowercase()) {
        return Err("top-level label is not alphabetic");
    }
    if FILE_EXTENSION_TLDS.contains(&tld) {
        return Err("top-level label is a file extension");
    }

    Ok(Validated::new(value))
}

fn validate_path(text: &str) -> Outcome {
    let text = text.trim_end_matches([' ', '.']);
    let bytes = text.as_bytes();

    if bytes.len() > 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\' {
        return Ok(Validated::new(text.to_lowercase()).tagged(IndicatorTag::BestEffort));
    }

    if bytes.len() > 1 && bytes[0] == b'/' && !text.contains('\0') {
        return Ok(Validated::new(text).tagged(IndicatorTag::BestEffort));
    }

    Err("not an absolute path")
}

fn validate_registry(text: &str) -> Outcome {
    let text = text.trim_end_matches([' ', '\\']);
    let (root, rest) = text.split_once('\\').ok_or("no subkey")?;
    if rest.trim().is_empty() {
        return Err("no subkey");
    }

    let root_upper = root.to_ascii_uppercase();
    let canonical = REGISTRY_ROOTS
        .iter()
        .find(|(alias, _)| *alias == root_upper)
        .map(|(_, long)| *long)
        .or_else(|| {
            REGISTRY_HIVES
                .iter()
                .find(|hive| **hive == root_upper)
                .copied()
        })
        .ok_or("unknown registry root")?;

    let value = format!("{}\\{}", canonical, rest).to_lowercase();
    Ok(Validated::new(value).tagged(IndicatorTag::BestEffort))
}

fn validate_process(text: &str) -> Outcome {
    let value = text.to_lowercase();
    if value.contains(['\\', '/']) {
        return Err("contains a path separator");
    }

    let suffix = EXECUTABLE_SUFFIXES
        .iter()
        .find(|suffix| value.ends_with(*suffix))
        .ok_or("not an executable suffix")?;
    if value.len() == suffix.len() {
        return Err("empty base name");
    }

    Ok(Validated::new(value).tagged(IndicatorTag::BestEffort))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(kind: IndicatorKind, text: &str) -> Validated {
        validate(kind, text).unwrap()
    }

    fn rejects(kind: IndicatorKind, text: &str) {
        assert!(validate(kind, text).is_err(), "{} should be rejected", text);
    }

    #[test]
    fn test_ip_validation() {
        let private = accepts(IndicatorKind::Ip, "192.168.1.100");
        assert_eq!(private.value, "192.168.1.100");
        assert_eq!(private.tags, vec![IndicatorTag::Private]);

        let public = accepts(IndicatorKind::Ip, "185.220.101.45");
        assert!(public.tags.is_empty());

        rejects(IndicatorKind::Ip, "999.999.999.999");
        rejects(IndicatorKind::Ip, "127.0.0.1");
        rejects(IndicatorKind::Ip, "169.254.10.1");
        rejects(IndicatorKind::Ip, "0.0.0.0");
        rejects(IndicatorKind::Ip, "224.0.0.251");
        rejects(IndicatorKind::Ip, "255.255.255.255");
        rejects(IndicatorKind::Ip, "250.1.1.1");
        rejects(IndicatorKind::Ip, "10.01.0.5");
        rejects(IndicatorKind::Ip, "1.2.3");
    }

    #[test]
    fn test_hash_validation() {
        let md5 = accepts(IndicatorKind::Hash, "D41D8CD98F00B204E9800998ECF8427E");
        assert_eq!(md5.value, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5.tags, vec![IndicatorTag::Digest(HashAlgorithm::Md5)]);

        let sha256 = accepts(
            IndicatorKind::Hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        );
        assert_eq!(sha256.tags, vec![IndicatorTag::Digest(HashAlgorithm::Sha256)]);

        rejects(IndicatorKind::Hash, "1234");
        rejects(IndicatorKind::Hash, &"0".repeat(64));
        rejects(IndicatorKind::Hash, &"ab".repeat(24));
        rejects(IndicatorKind::Hash, "g41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_domain_validation() {
        assert_eq!(
            accepts(IndicatorKind::Domain, "Evil-C2.Example.COM.").value,
            "evil-c2.example.com"
        );
        rejects(IndicatorKind::Domain, "svchost.exe");
        rejects(IndicatorKind::Domain, "10.0.0.5");
        rejects(IndicatorKind::Domain, "-bad.example.com");
        rejects(IndicatorKind::Domain, "localhost");
        rejects(IndicatorKind::Domain, &format!("{}.com", "a".repeat(64)));
    }

    #[test]
    fn test_path_validation() {
        let windows = accepts(IndicatorKind::FilePath, r"C:\Windows\Temp\Payload.EXE");
        assert_eq!(windows.value, r"c:\windows\temp\payload.exe");
        assert_eq!(windows.tags, vec![IndicatorTag::BestEffort]);

        let unix = accepts(IndicatorKind::FilePath, "/tmp/.X11/Agent");
        assert_eq!(unix.value, "/tmp/.X11/Agent");

        rejects(IndicatorKind::FilePath, "relative/path");
        rejects(IndicatorKind::FilePath, "C:");
    }

    #[test]
    fn test_registry_validation() {
        let key = accepts(
            IndicatorKind::RegistryKey,
            r"HKLM\Software\Microsoft\Windows\CurrentVersion\Run\",
        );
        assert_eq!(
            key.value,
            r"hkey_local_machine\software\microsoft\windows\currentversion\run"
        );

        let hive = accepts(IndicatorKind::RegistryKey, r"SYSTEM\CurrentControlSet\Services");
        assert_eq!(hive.value, r"system\currentcontrolset\services");

        rejects(IndicatorKind::RegistryKey, "HKLM");
        rejects(IndicatorKind::RegistryKey, r"HKXX\Software");
    }

    #[test]
    fn test_process_validation() {
        assert_eq!(
            accepts(IndicatorKind::ProcessName, "SvcHost.EXE").value,
            "svchost.exe"
        );
        rejects(IndicatorKind::ProcessName, ".exe");
        rejects(IndicatorKind::ProcessName, "notes.txt");
        rejects(IndicatorKind::ProcessName, r"c:\a.exe");
    }

    #[test]
    fn test_rejection_message() {
        let err = validate(IndicatorKind::Hash, "1234").unwrap_err();
        assert_eq!(err.reason, "unsupported digest length");
        assert!(err.to_string().contains("hash candidate '1234'"));
    }
}
