//! Timeline correlation.
//!
//! This module provides:
//! - Merging of heterogeneous per-source events into one ordered timeline
//! - The derived case summary

pub mod merge;
pub mod summary;

pub use merge::{build_timeline, TimeBounds, Timeline, TimelineEvent};
pub use summary::{CaseSummary, Recommendation, SkippedSource, SourceCoverage};
