//! Evidence correlator: turns raw forensic evidence into a scored incident timeline.
//!
//! Evidence from heterogeneous sources (memory images, packet captures,
//! controller dumps, documents, video logs) flows through four stages:
//! pattern scanning, indicator classification, reputation correlation and
//! timeline merging. [`pipeline::CaseEngine`] drives them end to end.

pub mod classifier;
pub mod core;
pub mod pipeline;
pub mod reputation;
pub mod scanner;
pub mod timeline;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::EngineConfig;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
pub use crate::pipeline::{Case, CaseEngine, CaseReport};
