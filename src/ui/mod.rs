//! User interface components.
//!
//! This module provides:
//! - CLI interface
//! - Case manifest loading
//! - Report generation (text, CSV, JSON)

pub mod cli;
pub mod manifest;
pub mod report;

pub use cli::Cli;
pub use manifest::CaseManifest;
pub use report::{generate_report, CsvExporter, ReportFormat, TextReporter};
