//! Case-level summary derived from the final pipeline outputs.

use crate::classifier::IndicatorSet;
use crate::core::config::{RiskThresholds, ScoringConfig};
use crate::core::types::{
    Confidence, IndicatorKey, IndicatorKind, MediumKind, ReputationStatus, RiskLevel, SourceId,
};
use crate::reputation::ScoredIndicator;
use crate::timeline::merge::Timeline;
use crate::utils::hash::EvidenceHashes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What happened to one registered source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub source: SourceId,
    pub medium: MediumKind,
    /// Whether content was pattern-scanned
    pub scanned: bool,
    /// Raw candidates produced by the scanner
    pub candidates: u64,
    /// Candidates dropped by validation
    pub rejected: u64,
    /// Matches skipped at window boundaries
    pub truncated: u64,
    /// Distinct indicators seen in this source
    pub indicators: usize,
    /// Fingerprint of the supplied content
    pub hashes: Option<EvidenceHashes>,
}

/// Why a registered source contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub source: SourceId,
    pub reason: String,
}

/// Follow-up action suggested by the findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Recommendation {
    BlockAddress { address: String },
    MonitorDomain { domain: String },
    SweepHash { hash: String },
    InspectArtifact { indicator: IndicatorKey },
    RecheckUnknown { count: usize },
    SupplyEvidence { source: SourceId },
    ContinueMonitoring,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockAddress { address } => write!(f, "Block malicious address {}", address),
            Self::MonitorDomain { domain } => {
                write!(f, "Monitor network traffic to suspicious domain {}", domain)
            }
            Self::SweepHash { hash } => write!(f, "Scan systems for files matching {}", hash),
            Self::InspectArtifact { indicator } => write!(f, "Inspect host artifact {}", indicator),
            Self::RecheckUnknown { count } => {
                write!(f, "Re-check {} indicators no provider could score", count)
            }
            Self::SupplyEvidence { source } => {
                write!(f, "Supply extracted content for source {}", source)
            }
            Self::ContinueMonitoring => write!(f, "Continue monitoring for new threats"),
        }
    }
}

/// Aggregate view of a case. Derived once from final outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub indicators_by_kind: BTreeMap<IndicatorKind, usize>,
    pub total_indicators: usize,
    /// Provider verdicts flagging an indicator above the detection threshold
    pub malicious_verdicts: usize,
    pub malicious_indicators: usize,
    pub clean_indicators: usize,
    pub unknown_indicators: usize,
    pub risk_level: RiskLevel,
    pub risk_thresholds: RiskThresholds,
    pub skipped_sources: Vec<SkippedSource>,
    pub dropped_events: usize,
    pub events_by_confidence: BTreeMap<Confidence, usize>,
    pub coverage: Vec<SourceCoverage>,
    pub recommendations: Vec<Recommendation>,
}

impl CaseSummary {
    /// Recompute the summary from the sets it describes.
    pub fn derive(
        indicators: &IndicatorSet,
        scored: &[ScoredIndicator],
        timeline: &Timeline,
        scoring: &ScoringConfig,
        coverage: Vec<SourceCoverage>,
        skipped_sources: Vec<SkippedSource>,
    ) -> Self {
        let status_count =
            |status: ReputationStatus| scored.iter().filter(|s| s.status == status).count();

        let threshold = scoring.detection_ratio_threshold;
        let malicious_indicators = status_count(ReputationStatus::Malicious);
        let unknown_indicators = status_count(ReputationStatus::Unknown);

        Self {
            indicators_by_kind: indicators.count_by_kind(),
            total_indicators: indicators.len(),
            malicious_verdicts: scored
                .iter()
                .flat_map(|s| s.verdicts.iter())
                .filter(|v| v.malicious && v.ratio.fraction() > threshold)
                .count(),
            malicious_indicators,
            clean_indicators: status_count(ReputationStatus::Clean),
            unknown_indicators,
            risk_level: scoring.risk.level_for(malicious_indicators, scored.len()),
            risk_thresholds: scoring.risk,
            recommendations: recommend(scored, unknown_indicators, &skipped_sources),
            skipped_sources,
            dropped_events: timeline.dropped,
            events_by_confidence: timeline.count_by_confidence(),
            coverage,
        }
    }
}

fn recommend(
    scored: &[ScoredIndicator],
    unknown: usize,
    skipped: &[SkippedSource],
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = scored
        .iter()
        .filter(|s| s.is_malicious())
        .map(|s| {
            let value = s.indicator.value.clone();
            match s.indicator.kind {
                IndicatorKind::Ip => Recommendation::BlockAddress { address: value },
                IndicatorKind::Domain => Recommendation::MonitorDomain { domain: value },
                IndicatorKind::Hash => Recommendation::SweepHash { hash: value },
                _ => Recommendation::InspectArtifact {
                    indicator: s.indicator.key(),
                },
            }
        })
        .collect();

    if unknown > 0 {
        recommendations.push(Recommendation::RecheckUnknown { count: unknown });
    }

    recommendations.extend(skipped.iter().map(|s| Recommendation::SupplyEvidence {
        source: s.source.clone(),
    }));

    if recommendations.is_empty() {
        recommendations.push(Recommendation::ContinueMonitoring);
    }

    recommendations
}
