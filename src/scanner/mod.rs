//! Artifact scanning.
//!
//! This module turns raw evidence into unvalidated candidates:
//! - Byte-level signature matchers and their registry
//! - Chunked scanning with look-ahead overlap for byte streams
//! - Line-by-line scanning for decoded text evidence

pub mod artifact;
pub mod patterns;

pub use artifact::{ArtifactScanner, Candidates, ScanStats};
pub use patterns::{PatternRegistry, SignatureMatcher};
