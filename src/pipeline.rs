//! Case assembly and the end-to-end correlation pipeline.

use crate::classifier::{ClassifyStats, IndicatorClassifier, IndicatorSet};
use crate::core::config::EngineConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{
    EventPayload, EventTime, Evidence, EvidenceSource, IndicatorKey, ReputationStatus,
    SourceEvent, SourceEvents, SourceId,
};
use crate::reputation::{ReputationCorrelator, ReputationProvider, ScoredIndicator};
use crate::scanner::{ArtifactScanner, ScanStats};
use crate::timeline::{build_timeline, CaseSummary, SkippedSource, SourceCoverage, Timeline};
use crate::utils::hash::{EvidenceHashes, HashCalculator};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Registered sources, their supplied content and external events.
#[derive(Debug, Clone, Default)]
pub struct Case {
    sources: Vec<EvidenceSource>,
    evidence: HashMap<SourceId, Arc<Evidence>>,
    events: Vec<SourceEvents>,
}

impl Case {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evidence source. Registration order is significant.
    pub fn register(&mut self, source: EvidenceSource) -> Result<()> {
        if self.source(&source.id).is_some() {
            return Err(Error::DuplicateSource(source.id.to_string()));
        }
        log::debug!("Registered source {} ({})", source.id, source.medium);
        self.sources.push(source);
        Ok(())
    }

    /// Supply extracted content for a registered source.
    pub fn supply(&mut self, id: &SourceId, evidence: Evidence) -> Result<()> {
        if self.source(id).is_none() {
            return Err(Error::UnknownSource(id.to_string()));
        }
        self.evidence.insert(id.clone(), Arc::new(evidence));
        Ok(())
    }

    /// Add externally supplied events. Events for unknown sources are
    /// accepted here and dropped when the timeline is built.
    pub fn add_events(&mut self, events: SourceEvents) {
        self.events.push(events);
    }

    pub fn source(&self, id: &SourceId) -> Option<&EvidenceSource> {
        self.sources.iter().find(|s| &s.id == id)
    }

    /// Sources in registration order.
    pub fn sources(&self) -> &[EvidenceSource] {
        &self.sources
    }

    pub fn evidence(&self, id: &SourceId) -> Option<&Evidence> {
        self.evidence.get(id).map(|e| e.as_ref())
    }
}

/// Everything the engine produces for a case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub sources: Vec<EvidenceSource>,
    pub indicators: IndicatorSet,
    pub scored: Vec<ScoredIndicator>,
    pub timeline: Timeline,
    pub summary: CaseSummary,
}

/// Output of scanning and classifying one source.
struct SourceScan {
    indicators: IndicatorSet,
    scan: ScanStats,
    classify: ClassifyStats,
    hashes: EvidenceHashes,
}

/// Drives scan, classify, correlate and merge for a case.
pub struct CaseEngine {
    config: EngineConfig,
    scanner: Arc<ArtifactScanner>,
    classifier: IndicatorClassifier,
    correlator: ReputationCorrelator,
}

impl CaseEngine {
    /// Build an engine. Invalid configuration is refused here.
    pub fn new(config: EngineConfig, providers: Vec<Arc<dyn ReputationProvider>>) -> Result<Self> {
        config.validate()?;

        let scanner = ArtifactScanner::from_config(&config.scan)?;
        let correlator = ReputationCorrelator::new(
            providers,
            config.scoring.clone(),
            config.reputation.clone(),
        )?;

        log::info!(
            "Engine ready: {} signatures, {} providers",
            scanner.registry().len(),
            correlator.provider_ids().len()
        );

        Ok(Self {
            config,
            scanner: Arc::new(scanner),
            classifier: IndicatorClassifier::new(),
            correlator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over a case.
    pub async fn run(&self, case: &Case) -> Result<CaseReport> {
        let start = Instant::now();
        let sources = case.sources();

        let mut skipped = Vec::new();
        let mut pending = Vec::new();

        for source in sources {
            let evidence = case.evidence.get(&source.id).cloned();

            if !source.capabilities().scan {
                log::debug!("{} is {} evidence, not scanned", source.id, source.medium);
                pending.push((source, None, evidence.map(|e| fingerprint(&e))));
                continue;
            }

            let Some(evidence) = evidence else {
                let error = Error::input_unavailable(source.id.as_str());
                log::warn!("{}", error);
                skipped.push(SkippedSource {
                    source: source.id.clone(),
                    reason: error.to_string(),
                });
                continue;
            };

            let scanner = Arc::clone(&self.scanner);
            let classifier = self.classifier;
            let owned = source.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let hashes = fingerprint(&evidence);
                let mut candidates = scanner.scan(&owned, &evidence);
                let (indicators, classify) = classifier.classify_counted(candidates.by_ref());
                SourceScan {
                    indicators,
                    scan: candidates.stats(),
                    classify,
                    hashes,
                }
            });
            pending.push((source, Some(handle), None));
        }

        let mut per_source: Vec<(SourceId, IndicatorSet)> = Vec::new();
        let mut coverage = Vec::new();

        for (source, handle, hashes) in pending {
            let Some(handle) = handle else {
                coverage.push(SourceCoverage {
                    source: source.id.clone(),
                    medium: source.medium,
                    scanned: false,
                    candidates: 0,
                    rejected: 0,
                    truncated: 0,
                    indicators: 0,
                    hashes,
                });
                continue;
            };

            match handle.await {
                Ok(result) => {
                    log::info!(
                        "{}: {} candidates, {} indicators, {} truncated",
                        source.id,
                        result.scan.candidates,
                        result.indicators.len(),
                        result.scan.truncated
                    );
                    coverage.push(SourceCoverage {
                        source: source.id.clone(),
                        medium: source.medium,
                        scanned: true,
                        candidates: result.scan.candidates,
                        rejected: result.classify.rejected,
                        truncated: result.scan.truncated,
                        indicators: result.indicators.len(),
                        hashes: Some(result.hashes),
                    });
                    per_source.push((source.id.clone(), result.indicators));
                }
                Err(e) => {
                    let error = Error::TaskJoin {
                        context: format!("scanning {}: {}", source.id, e),
                    };
                    log::error!("{}", error);
                    skipped.push(SkippedSource {
                        source: source.id.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        let indicators = per_source
            .iter()
            .map(|(_, set)| set.clone())
            .fold(IndicatorSet::new(), IndicatorSet::merge);
        log::info!(
            "{} distinct indicators across {} scanned sources",
            indicators.len(),
            per_source.len()
        );

        let scored = self.correlator.correlate(&indicators).await;

        let mut events = case.events.clone();
        events.extend(artifact_events(&per_source, &scored));
        let timeline = build_timeline(sources, events);

        let summary = CaseSummary::derive(
            &indicators,
            &scored,
            &timeline,
            &self.config.scoring,
            coverage,
            skipped,
        );

        log::info!(
            "Case analysed in {:?}: risk {}, {} malicious of {} scored, {} timeline events",
            start.elapsed(),
            summary.risk_level,
            summary.malicious_indicators,
            scored.len(),
            timeline.len()
        );

        Ok(CaseReport {
            sources: sources.to_vec(),
            indicators,
            scored,
            timeline,
            summary,
        })
    }
}

/// One event per indicator sighting, at the source's capture time.
fn artifact_events(
    per_source: &[(SourceId, IndicatorSet)],
    scored: &[ScoredIndicator],
) -> Vec<SourceEvents> {
    let status: HashMap<IndicatorKey, ReputationStatus> = scored
        .iter()
        .map(|s| (s.indicator.key(), s.status))
        .collect();

    per_source
        .iter()
        .filter(|(_, set)| !set.is_empty())
        .map(|(source, set)| {
            let events = set
                .iter()
                .map(|indicator| {
                    let key = indicator.key();
                    SourceEvent::new(
                        EventTime::Offset(chrono::Duration::zero()),
                        EventPayload::Indicator {
                            status: status.get(&key).copied(),
                            key,
                        },
                    )
                })
                .collect();
            SourceEvents::new(source.clone(), events)
        })
        .collect()
}

fn fingerprint(evidence: &Evidence) -> EvidenceHashes {
    match evidence {
        Evidence::Bytes(bytes) => HashCalculator::hash_chunks([bytes.as_slice()]),
        Evidence::Lines(lines) => HashCalculator::hash_chunks(
            lines
                .iter()
                .flat_map(|line| [line.as_bytes(), b"\n".as_slice()]),
        ),
    }
}
