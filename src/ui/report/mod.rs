//! Report generation for case results.
//!
//! This module provides export functionality in multiple formats:
//! - Plain-text summaries
//! - CSV timelines
//! - JSON export

pub mod csv;
pub mod text;

use crate::core::error::{Error, Result};
use crate::pipeline::CaseReport;
use std::path::Path;

pub use csv::CsvExporter;
pub use text::TextReporter;

/// Report format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
}

impl ReportFormat {
    /// Pick a format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("txt") => ReportFormat::Text,
            Some("csv") => ReportFormat::Csv,
            _ => ReportFormat::Json,
        }
    }
}

/// Write a case report to a file.
///
/// CSV output writes the timeline to `output_path` and the scored indicators
/// next to it (see [`CsvExporter::indicators_path`]).
pub fn generate_report(report: &CaseReport, format: ReportFormat, output_path: &Path) -> Result<()> {
    match format {
        ReportFormat::Text => {
            let text = TextReporter::new().with_all_indicators(true).render(report);
            std::fs::write(output_path, text).map_err(|e| Error::Io(e.to_string()))
        }
        ReportFormat::Csv => {
            let exporter = CsvExporter::new();
            exporter.export(report, output_path)?;
            exporter.export_indicators(report, &CsvExporter::indicators_path(output_path))
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(report)?;
            std::fs::write(output_path, json).map_err(|e| Error::Io(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::types::{EvidenceSource, MediumKind, SourceEvent, SourceEvents};
    use crate::pipeline::{Case, CaseEngine};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ReportFormat::from_path(Path::new("case.CSV")), ReportFormat::Csv);
        assert_eq!(ReportFormat::from_path(Path::new("case.txt")), ReportFormat::Text);
        assert_eq!(ReportFormat::from_path(Path::new("case")), ReportFormat::Json);
    }

    #[tokio::test]
    async fn test_generate_all_formats() {
        let mut case = Case::new();
        case.register(EvidenceSource::new("pcap", MediumKind::Network))
            .unwrap();
        case.add_events(SourceEvents::new(
            "pcap",
            vec![SourceEvent::at(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
                "first beacon, port 443",
            )],
        ));
        let engine = CaseEngine::new(EngineConfig::default(), Vec::new()).unwrap();
        let report = engine.run(&case).await.unwrap();

        let dir = tempdir().unwrap();
        for (name, format) in [
            ("case.txt", ReportFormat::Text),
            ("case.csv", ReportFormat::Csv),
            ("case.json", ReportFormat::Json),
        ] {
            let path = dir.path().join(name);
            generate_report(&report, format, &path).unwrap();
            let contents = std::fs::read_to_string(&path).unwrap();
            assert!(!contents.is_empty());
        }

        let csv = std::fs::read_to_string(dir.path().join("case.csv")).unwrap();
        assert!(csv.contains("\"first beacon, port 443\""));
        let indicators = std::fs::read_to_string(dir.path().join("case.indicators.csv")).unwrap();
        assert!(indicators.starts_with("Kind,Value,Status,Sources,Occurrences,Rationale\n"));
        let text = std::fs::read_to_string(dir.path().join("case.txt")).unwrap();
        assert!(text.contains("Skipped Sources:"));
    }
}
