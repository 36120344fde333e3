//! Reputation scoring of indicators.
//!
//! Providers are pluggable behind [`ReputationProvider`]. The
//! [`ReputationCorrelator`] fans lookups out under a concurrency limit and
//! folds every provider's answer into one [`ScoredIndicator`] per indicator.

pub mod correlator;
pub mod providers;

pub use correlator::ReputationCorrelator;
pub use providers::{create_provider, ProviderSpec, ReputationStore, StaticListProvider};

use crate::core::types::{Indicator, IndicatorKind, ReputationStatus, ReputationVerdict};
use crate::utils::retry::Retryable;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Error type for a single reputation lookup.
///
/// Every variant makes the provider count as unavailable for that indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The provider has no record of the indicator
    NotListed,
    /// The provider cannot answer at all
    Unavailable(String),
    /// A transient failure worth retrying
    Transient(String),
    /// The attempt exceeded its time budget
    Timeout,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotListed => write!(f, "Indicator not listed"),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::Transient(msg) => write!(f, "Transient failure: {}", msg),
            Self::Timeout => write!(f, "Lookup timeout"),
        }
    }
}

impl std::error::Error for LookupError {}

impl Retryable for LookupError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }
}

/// Trait for reputation providers.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Stable provider identifier, used for policy overrides and rationales.
    fn id(&self) -> &str;

    /// Whether the provider scores this kind of indicator at all.
    fn supports(&self, _kind: IndicatorKind) -> bool {
        true
    }

    /// Look up one indicator.
    async fn lookup(&self, indicator: &Indicator) -> Result<ReputationVerdict, LookupError>;
}

/// An indicator with every provider's verdict and the aggregate outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredIndicator {
    pub indicator: Indicator,
    /// Successful verdicts in provider order
    pub verdicts: Vec<ReputationVerdict>,
    pub status: ReputationStatus,
    /// Verdict rationales concatenated in provider order
    pub rationale: String,
    /// Providers that failed for this indicator
    pub unavailable: Vec<String>,
}

impl ScoredIndicator {
    /// Fold provider outcomes into an aggregate.
    ///
    /// `outcomes` must be in provider order. A verdict counts as malicious
    /// only when its detection ratio is strictly above `threshold`.
    pub fn aggregate(
        indicator: Indicator,
        outcomes: Vec<(String, Result<ReputationVerdict, String>)>,
        threshold: f64,
    ) -> Self {
        let mut verdicts = Vec::new();
        let mut unavailable = Vec::new();

        for (provider, outcome) in outcomes {
            match outcome {
                Ok(verdict) => verdicts.push(verdict),
                Err(reason) => {
                    log::debug!("{} unavailable for {}: {}", provider, indicator.key(), reason);
                    unavailable.push(provider);
                }
            }
        }

        let status = if verdicts
            .iter()
            .any(|v| v.malicious && v.ratio.fraction() > threshold)
        {
            ReputationStatus::Malicious
        } else if verdicts.is_empty() {
            ReputationStatus::Unknown
        } else {
            ReputationStatus::Clean
        };

        let rationale = verdicts
            .iter()
            .map(|v| format!("{} ({}): {}", v.provider, v.ratio, v.rationale))
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            indicator,
            verdicts,
            status,
            rationale,
            unavailable,
        }
    }

    pub fn is_malicious(&self) -> bool {
        self.status == ReputationStatus::Malicious
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DetectionRatio, Location, SourceId};

    fn hash_indicator() -> Indicator {
        Indicator::new(
            IndicatorKind::Hash,
            "44d88612fea8a8f36de82e1278abb02f",
            SourceId::from("ram"),
            Location::Byte(0),
        )
    }

    #[test]
    fn test_malicious_beats_unavailable() {
        let indicator = hash_indicator();
        let verdict = ReputationVerdict::malicious(
            indicator.key(),
            "feed-a",
            DetectionRatio::new(52, 70),
            "Known malware hash",
        );
        let scored = ScoredIndicator::aggregate(
            indicator,
            vec![
                ("feed-a".to_string(), Ok(verdict)),
                ("feed-b".to_string(), Err("timeout".to_string())),
            ],
            0.0,
        );

        assert_eq!(scored.status, ReputationStatus::Malicious);
        assert_eq!(scored.unavailable, vec!["feed-b".to_string()]);
        assert_eq!(scored.rationale, "feed-a (52/70): Known malware hash");
    }

    #[test]
    fn test_all_unavailable_is_unknown() {
        let scored = ScoredIndicator::aggregate(
            hash_indicator(),
            vec![("feed-a".to_string(), Err("not listed".to_string()))],
            0.0,
        );
        assert_eq!(scored.status, ReputationStatus::Unknown);
        assert!(scored.rationale.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        let indicator = hash_indicator();
        let weak = ReputationVerdict::malicious(
            indicator.key(),
            "feed-a",
            DetectionRatio::new(7, 70),
            "Low detection",
        );
        let clean = ReputationVerdict::clean(
            indicator.key(),
            "feed-b",
            DetectionRatio::new(0, 70),
            "No detections",
        );
        let scored = ScoredIndicator::aggregate(
            indicator,
            vec![
                ("feed-a".to_string(), Ok(weak)),
                ("feed-b".to_string(), Ok(clean)),
            ],
            0.1,
        );

        assert_eq!(scored.status, ReputationStatus::Clean);
        assert_eq!(
            scored.rationale,
            "feed-a (7/70): Low detection; feed-b (0/70): No detections"
        );
    }

    #[test]
    fn test_lookup_error_retryable() {
        assert!(LookupError::Timeout.is_retryable());
        assert!(LookupError::Transient("reset".to_string()).is_retryable());
        assert!(!LookupError::NotListed.is_retryable());
        assert!(!LookupError::Unavailable("down".to_string()).is_retryable());
    }
}
