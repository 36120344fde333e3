//! Plain-text case report.

use crate::core::types::{Confidence, EventPayload, EventTime, ReputationStatus};
use crate::pipeline::CaseReport;
use std::fmt::Write;

/// Renders a [`CaseReport`] for a terminal.
pub struct TextReporter {
    /// Include the merged timeline
    include_timeline: bool,
    /// Include clean and unknown indicators, not only malicious ones
    include_all_indicators: bool,
}

impl TextReporter {
    pub fn new() -> Self {
        Self {
            include_timeline: true,
            include_all_indicators: false,
        }
    }

    /// Set whether the timeline is printed.
    pub fn with_timeline(mut self, include: bool) -> Self {
        self.include_timeline = include;
        self
    }

    /// Set whether non-malicious indicators are listed.
    pub fn with_all_indicators(mut self, include: bool) -> Self {
        self.include_all_indicators = include;
        self
    }

    /// Render the report.
    pub fn render(&self, report: &CaseReport) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_report(&mut out, report);
        out
    }

    fn write_report(&self, out: &mut String, report: &CaseReport) -> std::fmt::Result {
        let summary = &report.summary;
        let scanned = summary.coverage.iter().filter(|c| c.scanned).count();

        writeln!(out, "=== Case Analysis ===")?;
        writeln!(
            out,
            "Sources:          {} ({} scanned, {} skipped)",
            report.sources.len(),
            scanned,
            summary.skipped_sources.len()
        )?;

        let by_kind: Vec<String> = summary
            .indicators_by_kind
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| format!("{}: {}", kind, count))
            .collect();
        if by_kind.is_empty() {
            writeln!(out, "Indicators:       {}", summary.total_indicators)?;
        } else {
            writeln!(
                out,
                "Indicators:       {} ({})",
                summary.total_indicators,
                by_kind.join(", ")
            )?;
        }
        writeln!(
            out,
            "Malicious:        {} ({} provider verdicts)",
            summary.malicious_indicators, summary.malicious_verdicts
        )?;
        writeln!(out, "Clean:            {}", summary.clean_indicators)?;
        writeln!(out, "Unknown:          {}", summary.unknown_indicators)?;
        writeln!(
            out,
            "Risk Level:       {}",
            summary.risk_level.to_string().to_uppercase()
        )?;

        let by_confidence: Vec<String> = summary
            .events_by_confidence
            .iter()
            .map(|(confidence, count)| format!("{} {}", confidence_label(*confidence), count))
            .collect();
        writeln!(
            out,
            "Timeline Events:  {} ({}), {} dropped",
            report.timeline.len(),
            by_confidence.join(", "),
            summary.dropped_events
        )?;

        let listed: Vec<_> = report
            .scored
            .iter()
            .filter(|s| self.include_all_indicators || s.is_malicious())
            .collect();
        if !listed.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "{}:",
                if self.include_all_indicators {
                    "Indicators"
                } else {
                    "Malicious Indicators"
                }
            )?;
            for scored in listed {
                let rationale = if scored.rationale.is_empty() {
                    "no verdict".to_string()
                } else {
                    scored.rationale.clone()
                };
                writeln!(
                    out,
                    "  [{}] {} {} - {}",
                    status_label(scored.status),
                    scored.indicator.kind,
                    scored.indicator.value,
                    rationale
                )?;
            }
        }

        if !summary.skipped_sources.is_empty() {
            writeln!(out)?;
            writeln!(out, "Skipped Sources:")?;
            for skipped in &summary.skipped_sources {
                writeln!(out, "  {}: {}", skipped.source, skipped.reason)?;
            }
        }

        writeln!(out)?;
        writeln!(out, "Recommendations:")?;
        for (i, recommendation) in summary.recommendations.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, recommendation)?;
        }

        if self.include_timeline && !report.timeline.is_empty() {
            writeln!(out)?;
            writeln!(out, "Timeline:")?;
            for event in report.timeline.iter() {
                let when = event
                    .timestamp
                    .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
                writeln!(
                    out,
                    "  {} {:<12} {:<10} {}",
                    when,
                    confidence_label(event.confidence),
                    event.source.as_str(),
                    describe(&event.payload, &event.declared)
                )?;
            }
        }

        Ok(())
    }
}

impl Default for TextReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::Certain => "certain",
        Confidence::Inferred => "inferred",
        Confidence::Approximate => "approximate",
    }
}

fn status_label(status: ReputationStatus) -> &'static str {
    match status {
        ReputationStatus::Malicious => "MALICIOUS",
        ReputationStatus::Clean => "clean",
        ReputationStatus::Unknown => "unknown",
    }
}

/// One-line description of an event payload.
pub(crate) fn describe(payload: &EventPayload, declared: &EventTime) -> String {
    let text = match payload {
        EventPayload::Description { text } => text.clone(),
        EventPayload::Indicator { key, status } => match status {
            Some(status) => format!("{} seen ({})", key, status),
            None => format!("{} seen", key),
        },
    };
    match declared {
        EventTime::Offset(offset) if offset.num_milliseconds() != 0 => {
            format!("{} (+{}s)", text, offset.num_seconds())
        }
        _ => text,
    }
}
