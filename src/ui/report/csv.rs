//! CSV export functionality.
//!
//! Exports the merged timeline and scored indicators for spreadsheet analysis.

use crate::core::error::Result;
use crate::pipeline::CaseReport;
use crate::ui::report::text::{confidence_label, describe};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// CSV exporter for case reports.
pub struct CsvExporter {
    /// Delimiter character
    delimiter: char,
    /// Include header row
    include_header: bool,
}

impl CsvExporter {
    /// Create a new CSV exporter.
    pub fn new() -> Self {
        Self {
            delimiter: ',',
            include_header: true,
        }
    }

    /// Set the delimiter character.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether to include headers.
    pub fn with_header(mut self, include: bool) -> Self {
        self.include_header = include;
        self
    }

    /// Export the timeline of a case to CSV.
    pub fn export(&self, report: &CaseReport, output_path: &Path) -> Result<()> {
        let mut file = File::create(output_path)?;
        file.write_all(self.timeline_csv(report).as_bytes())?;
        Ok(())
    }

    /// Export scored indicators to CSV.
    pub fn export_indicators(&self, report: &CaseReport, output_path: &Path) -> Result<()> {
        let mut file = File::create(output_path)?;
        file.write_all(self.indicators_csv(report).as_bytes())?;
        Ok(())
    }

    /// Sibling path for the indicator table of a timeline export:
    /// `case.csv` becomes `case.indicators.csv`.
    pub fn indicators_path(timeline_path: &Path) -> PathBuf {
        let stem = timeline_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "case".to_string());
        timeline_path.with_file_name(format!("{}.indicators.csv", stem))
    }

    fn timeline_csv(&self, report: &CaseReport) -> String {
        let mut rows = Vec::with_capacity(report.timeline.len() + 4);

        rows.push(format!("# Risk Level: {}", report.summary.risk_level));
        rows.push(format!("# Indicators: {}", report.summary.total_indicators));
        rows.push(format!("# Dropped Events: {}", report.summary.dropped_events));

        if self.include_header {
            rows.push(self.row(&[
                "Position",
                "Timestamp",
                "Not Before",
                "Not After",
                "Confidence",
                "Source",
                "Event",
            ]));
        }

        for event in report.timeline.iter() {
            let timestamp = event.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
            let after = event
                .bounds
                .and_then(|b| b.after)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            let before = event
                .bounds
                .and_then(|b| b.before)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            rows.push(self.row(&[
                &event.position.to_string(),
                &timestamp,
                &after,
                &before,
                confidence_label(event.confidence),
                event.source.as_str(),
                &describe(&event.payload, &event.declared),
            ]));
        }

        rows.join("\n") + "\n"
    }

    fn indicators_csv(&self, report: &CaseReport) -> String {
        let mut rows = Vec::with_capacity(report.scored.len() + 1);

        if self.include_header {
            rows.push(self.row(&["Kind", "Value", "Status", "Sources", "Occurrences", "Rationale"]));
        }

        for scored in &report.scored {
            let sources: Vec<&str> = scored
                .indicator
                .sources
                .iter()
                .map(|s| s.as_str())
                .collect();
            rows.push(self.row(&[
                scored.indicator.kind.as_str(),
                &scored.indicator.value,
                &scored.status.to_string(),
                &sources.join(" "),
                &scored.indicator.occurrences.to_string(),
                &scored.rationale,
            ]));
        }

        rows.join("\n") + "\n"
    }

    fn row(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|f| Self::escape_csv(f))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }

    /// Escape a CSV field.
    fn escape_csv(field: &str) -> String {
        if field.contains(',')
            || field.contains(';')
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r')
        {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new()
    }
}
