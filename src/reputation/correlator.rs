//! Concurrent reputation lookups and verdict aggregation.

use crate::classifier::IndicatorSet;
use crate::core::config::{LookupPolicy, ReputationConfig, ScoringConfig};
use crate::core::error::{Error, Result};
use crate::core::types::{Indicator, ReputationVerdict, RiskLevel};
use crate::reputation::{LookupError, ReputationProvider, ScoredIndicator};
use crate::utils::retry::{retry_async, Retryable};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs every configured provider against an indicator set.
pub struct ReputationCorrelator {
    providers: Vec<Arc<dyn ReputationProvider>>,
    scoring: ScoringConfig,
    reputation: ReputationConfig,
}

impl ReputationCorrelator {
    /// Create a correlator. Providers are queried and reported in the given order.
    pub fn new(
        providers: Vec<Arc<dyn ReputationProvider>>,
        scoring: ScoringConfig,
        reputation: ReputationConfig,
    ) -> Result<Self> {
        scoring.validate()?;
        reputation.validate()?;

        log::info!(
            "Risk thresholds: low < {:.0}%, elevated <= {:.0}%, detection ratio > {:.2}",
            scoring.risk.low * 100.0,
            scoring.risk.elevated * 100.0,
            scoring.detection_ratio_threshold
        );
        log::debug!(
            "Reputation providers: [{}], concurrency limit {}",
            providers
                .iter()
                .map(|p| p.id().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            reputation.concurrency_limit
        );

        Ok(Self {
            providers,
            scoring,
            reputation,
        })
    }

    /// Identifiers of the configured providers, in query order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    /// Score every indicator in the set.
    ///
    /// Output follows the set's key order; verdicts within an indicator
    /// follow provider order, whatever order the lookups finish in.
    pub async fn correlate(&self, indicators: &IndicatorSet) -> Vec<ScoredIndicator> {
        let semaphore = Arc::new(Semaphore::new(self.reputation.concurrency_limit));
        let mut pending: Vec<(Indicator, Vec<(String, JoinHandle<Result<ReputationVerdict>>)>)> =
            Vec::with_capacity(indicators.len());

        for indicator in indicators.iter() {
            let shared = Arc::new(indicator.clone());
            let mut handles = Vec::new();

            for provider in &self.providers {
                if !provider.supports(indicator.kind) {
                    continue;
                }

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        log::error!("Lookup semaphore closed: {}", e);
                        break;
                    }
                };
                let provider = Arc::clone(provider);
                let target = Arc::clone(&shared);
                let policy = self.reputation.policy_for(provider.id()).clone();
                let id = provider.id().to_string();

                let handle = tokio::spawn(async move {
                    let result = lookup_with_policy(provider.as_ref(), &target, &policy).await;
                    drop(permit);
                    result
                });
                handles.push((id, handle));
            }

            pending.push((indicator.clone(), handles));
        }

        let threshold = self.scoring.detection_ratio_threshold;
        let mut scored = Vec::with_capacity(pending.len());

        for (indicator, handles) in pending {
            let mut outcomes = Vec::with_capacity(handles.len());
            for (provider, handle) in handles {
                let outcome = match handle.await {
                    Ok(Ok(verdict)) => Ok(verdict),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => {
                        let error = Error::TaskJoin {
                            context: format!("{} lookup of {}: {}", provider, indicator.key(), e),
                        };
                        log::warn!("{}", error);
                        Err(error.to_string())
                    }
                };
                outcomes.push((provider, outcome));
            }
            scored.push(ScoredIndicator::aggregate(indicator, outcomes, threshold));
        }

        log::info!(
            "Scored {} indicators against {} providers ({} malicious)",
            scored.len(),
            self.providers.len(),
            scored.iter().filter(|s| s.is_malicious()).count()
        );

        scored
    }

    /// Overall risk from the malicious proportion of all scored indicators.
    pub fn risk_level(&self, scored: &[ScoredIndicator]) -> RiskLevel {
        let malicious = scored.iter().filter(|s| s.is_malicious()).count();
        self.scoring.risk.level_for(malicious, scored.len())
    }
}

/// One lookup under a provider's timeout and retry policy.
async fn lookup_with_policy(
    provider: &dyn ReputationProvider,
    indicator: &Indicator,
    policy: &LookupPolicy,
) -> Result<ReputationVerdict> {
    let operation = format!("{} lookup {}", provider.id(), indicator.key());
    let timeout = policy.timeout();

    retry_async(
        &operation,
        &policy.retry_config(),
        |e: &LookupError| e.is_retryable(),
        || async move {
            match tokio::time::timeout(timeout, provider.lookup(indicator)).await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout),
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RiskThresholds;
    use crate::core::types::{
        DetectionRatio, IndicatorKind, Location, ReputationStatus, SourceId,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Flags everything whose value contains a marker.
    struct MarkerProvider {
        id: &'static str,
        marker: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl ReputationProvider for MarkerProvider {
        fn id(&self) -> &str {
            self.id
        }

        async fn lookup(&self, indicator: &Indicator) -> std::result::Result<ReputationVerdict, LookupError> {
            tokio::time::sleep(self.delay).await;
            if indicator.value.contains(self.marker) {
                Ok(ReputationVerdict::malicious(
                    indicator.key(),
                    self.id,
                    DetectionRatio::new(45, 70),
                    "Marked",
                ))
            } else {
                Ok(ReputationVerdict::clean(
                    indicator.key(),
                    self.id,
                    DetectionRatio::new(0, 70),
                    "Unmarked",
                ))
            }
        }
    }

    struct DownProvider;

    #[async_trait]
    impl ReputationProvider for DownProvider {
        fn id(&self) -> &str {
            "down"
        }

        async fn lookup(&self, _indicator: &Indicator) -> std::result::Result<ReputationVerdict, LookupError> {
            Err(LookupError::Unavailable("offline".to_string()))
        }
    }

    /// Fails transiently until its attempt budget runs out.
    struct FlakyProvider {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl ReputationProvider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }

        fn supports(&self, kind: IndicatorKind) -> bool {
            kind == IndicatorKind::Hash
        }

        async fn lookup(&self, indicator: &Indicator) -> std::result::Result<ReputationVerdict, LookupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LookupError::Transient("connection reset".to_string()));
            }
            Ok(ReputationVerdict::malicious(
                indicator.key(),
                "flaky",
                DetectionRatio::new(52, 70),
                "Known malware hash",
            ))
        }
    }

    fn indicators(values: &[(IndicatorKind, &str)]) -> IndicatorSet {
        values
            .iter()
            .enumerate()
            .map(|(i, (kind, value))| {
                Indicator::new(*kind, *value, SourceId::from("ram"), Location::Byte(i as u64))
            })
            .collect()
    }

    fn quick_config() -> ReputationConfig {
        let mut config = ReputationConfig::default();
        config.default_policy.timeout_ms = 200;
        config.default_policy.initial_backoff_ms = 1;
        config.default_policy.max_backoff_ms = 5;
        config
    }

    #[tokio::test]
    async fn test_malicious_with_unavailable_provider() {
        let providers: Vec<Arc<dyn ReputationProvider>> = vec![
            Arc::new(MarkerProvider {
                id: "feed",
                marker: "44d886",
                delay: Duration::ZERO,
            }),
            Arc::new(DownProvider),
        ];
        let correlator =
            ReputationCorrelator::new(providers, ScoringConfig::default(), quick_config()).unwrap();

        let set = indicators(&[(IndicatorKind::Hash, "44d88612fea8a8f36de82e1278abb02f")]);
        let scored = correlator.correlate(&set).await;

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].status, ReputationStatus::Malicious);
        assert_eq!(scored[0].unavailable, vec!["down".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_unavailable() {
        let providers: Vec<Arc<dyn ReputationProvider>> = vec![Arc::new(MarkerProvider {
            id: "slow",
            marker: "x",
            delay: Duration::from_secs(5),
        })];
        let mut config = quick_config();
        config.default_policy.timeout_ms = 20;
        let correlator =
            ReputationCorrelator::new(providers, ScoringConfig::default(), config).unwrap();

        let scored = correlator
            .correlate(&indicators(&[(IndicatorKind::Domain, "evil-c2.example")]))
            .await;
        assert_eq!(scored[0].status, ReputationStatus::Unknown);
        assert_eq!(scored[0].unavailable, vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_policy_override() {
        let flaky = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let providers: Vec<Arc<dyn ReputationProvider>> = vec![flaky.clone()];
        let mut config = quick_config();
        let mut policy = config.default_policy.clone();
        policy.max_attempts = 3;
        config.provider_policies.insert("flaky".to_string(), policy);

        let correlator =
            ReputationCorrelator::new(providers, ScoringConfig::default(), config).unwrap();
        let scored = correlator
            .correlate(&indicators(&[
                (IndicatorKind::Hash, "44d88612fea8a8f36de82e1278abb02f"),
                (IndicatorKind::Ip, "185.220.101.45"),
            ]))
            .await;

        let by_kind = |kind| scored.iter().find(|s| s.indicator.kind == kind).unwrap();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(by_kind(IndicatorKind::Hash).status, ReputationStatus::Malicious);
        // Unsupported kinds are skipped, not unavailable.
        let ip = by_kind(IndicatorKind::Ip);
        assert_eq!(ip.status, ReputationStatus::Unknown);
        assert!(ip.unavailable.is_empty());
    }

    #[tokio::test]
    async fn test_order_is_deterministic() {
        let providers: Vec<Arc<dyn ReputationProvider>> = vec![
            Arc::new(MarkerProvider {
                id: "slow-feed",
                marker: "evil",
                delay: Duration::from_millis(15),
            }),
            Arc::new(MarkerProvider {
                id: "fast-feed",
                marker: "c2",
                delay: Duration::ZERO,
            }),
        ];
        let mut config = quick_config();
        config.concurrency_limit = 2;
        let correlator =
            ReputationCorrelator::new(providers, ScoringConfig::default(), config).unwrap();

        let set = indicators(&[
            (IndicatorKind::Domain, "evil-c2.example"),
            (IndicatorKind::Domain, "benign.example"),
            (IndicatorKind::Ip, "185.220.101.45"),
        ]);
        let first = correlator.correlate(&set).await;
        let second = correlator.correlate(&set).await;

        assert_eq!(first, second);
        let providers: Vec<&str> = first[1]
            .verdicts
            .iter()
            .map(|v| v.provider.as_str())
            .collect();
        assert_eq!(providers, vec!["slow-feed", "fast-feed"]);
    }

    #[tokio::test]
    async fn test_risk_level() {
        let providers: Vec<Arc<dyn ReputationProvider>> = vec![Arc::new(MarkerProvider {
            id: "feed",
            marker: "bad",
            delay: Duration::ZERO,
        })];
        let mut scoring = ScoringConfig::default();
        scoring.risk = RiskThresholds::new(0.25, 0.50).unwrap();
        let correlator = ReputationCorrelator::new(providers, scoring, quick_config()).unwrap();

        let values: Vec<String> = (0..10)
            .map(|i| {
                if i < 2 {
                    format!("bad{}.example", i)
                } else {
                    format!("host{}.example", i)
                }
            })
            .collect();
        let set: IndicatorSet = values
            .iter()
            .map(|v| Indicator::new(IndicatorKind::Domain, v.clone(), SourceId::from("pcap"), Location::Line(0)))
            .collect();

        let scored = correlator.correlate(&set).await;
        assert_eq!(correlator.risk_level(&scored), RiskLevel::Low);
        assert_eq!(correlator.risk_level(&[]), RiskLevel::None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut scoring = ScoringConfig::default();
        scoring.detection_ratio_threshold = -0.5;
        let result = ReputationCorrelator::new(Vec::new(), scoring, ReputationConfig::default());
        assert!(matches!(result, Err(Error::ConfigurationInvalid { .. })));
    }
}
