//! Utility functions and helpers.

pub mod hash;
pub mod logging;
pub mod retry;

pub use hash::{EvidenceHashes, HashAlgorithm, HashCalculator};
pub use logging::{init_logging, LogConfig};
pub use retry::{retry_async, RetryConfig, Retryable};
