//! Configuration management for the correlation engine.

use crate::core::error::{Error, Result};
use crate::core::types::{IndicatorKind, RiskLevel};
use crate::utils::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Artifact scanner settings
    #[serde(default)]
    pub scan: ScanConfig,
    /// Verdict aggregation and risk thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Reputation lookup settings
    #[serde(default)]
    pub reputation: ReputationConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigSave(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from the default location, falling back to defaults.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    /// Get the application data directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("evidence-correlator")
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.scoring.validate()?;
        self.reputation.validate()?;
        Ok(())
    }
}

/// A user-supplied signature added to the scanner registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Unique signature name
    pub name: String,
    /// Kind of indicator the signature proposes
    pub kind: IndicatorKind,
    /// Regular expression over bytes
    pub regex: String,
}

/// Artifact scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Bytes owned by each scan window
    pub chunk_size: usize,
    /// Look-ahead bytes appended to each window
    pub chunk_overlap: usize,
    /// Extra signatures appended to the built-in registry
    pub extra_patterns: Vec<PatternSpec>,
    /// Built-in signatures to switch off, by name
    pub disabled_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            chunk_overlap: 4096,
            extra_patterns: Vec::new(),
            disabled_patterns: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config_invalid(
                "scan.chunk_size",
                "Must be greater than 0",
            ));
        }

        if self.chunk_overlap > self.chunk_size {
            return Err(Error::config_invalid(
                "scan.chunk_overlap",
                "Must not exceed scan.chunk_size",
            ));
        }

        let mut names = HashSet::new();
        for pattern in &self.extra_patterns {
            if pattern.name.trim().is_empty() {
                return Err(Error::config_invalid(
                    "scan.extra_patterns",
                    "Pattern name must not be empty",
                ));
            }
            if !names.insert(pattern.name.as_str()) {
                return Err(Error::config_invalid(
                    "scan.extra_patterns",
                    format!("Duplicate pattern name '{}'", pattern.name),
                ));
            }
            regex::bytes::Regex::new(&pattern.regex).map_err(|e| {
                Error::config_invalid(
                    format!("scan.extra_patterns.{}", pattern.name),
                    format!("Invalid regex: {}", e),
                )
            })?;
        }

        Ok(())
    }
}

/// Verdict aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// A malicious verdict counts only when its detection ratio is strictly
    /// above this value. 0.0 means any non-zero malicious verdict counts.
    pub detection_ratio_threshold: f64,
    /// Bands mapping the malicious proportion to a risk level
    pub risk: RiskThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            detection_ratio_threshold: 0.0,
            risk: RiskThresholds::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let threshold = self.detection_ratio_threshold;
        if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
            return Err(Error::config_invalid(
                "scoring.detection_ratio_threshold",
                "Must be in [0.0, 1.0)",
            ));
        }
        self.risk.validate()
    }
}

/// Risk bands over the proportion of malicious indicators.
///
/// `none` when nothing is malicious, `low` below `low`, `elevated` up to and
/// including `elevated`, `high` above it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Exclusive upper bound of the low band
    pub low: f64,
    /// Inclusive upper bound of the elevated band
    pub elevated: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.25,
            elevated: 0.50,
        }
    }
}

impl RiskThresholds {
    /// Create validated thresholds.
    pub fn new(low: f64, elevated: f64) -> Result<Self> {
        let thresholds = Self { low, elevated };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || self.low <= 0.0 || self.low > 1.0 {
            return Err(Error::config_invalid(
                "scoring.risk.low",
                "Must be in (0.0, 1.0]",
            ));
        }
        if !self.elevated.is_finite() || self.elevated < self.low || self.elevated > 1.0 {
            return Err(Error::config_invalid(
                "scoring.risk.elevated",
                "Must be in [scoring.risk.low, 1.0]",
            ));
        }
        Ok(())
    }

    /// Map a malicious count over a total to a risk level.
    pub fn level_for(&self, malicious: usize, total: usize) -> RiskLevel {
        if malicious == 0 || total == 0 {
            return RiskLevel::None;
        }
        let proportion = malicious as f64 / total as f64;
        if proportion < self.low {
            RiskLevel::Low
        } else if proportion <= self.elevated {
            RiskLevel::Elevated
        } else {
            RiskLevel::High
        }
    }
}

/// Timeout and retry policy for calls to one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupPolicy {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Attempts per lookup (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff cap in milliseconds
    pub max_backoff_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 1,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl LookupPolicy {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry behaviour derived from this policy.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            add_jitter: true,
        }
    }

    fn validate(&self, field: &str) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::config_invalid(
                format!("{}.timeout_ms", field),
                "Must be greater than 0",
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::config_invalid(
                format!("{}.max_attempts", field),
                "Must be at least 1",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config_invalid(
                format!("{}.backoff_multiplier", field),
                "Must be at least 1.0",
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::config_invalid(
                format!("{}.max_backoff_ms", field),
                "Must not be below initial_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Reputation lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Maximum lookups in flight at once
    pub concurrency_limit: usize,
    /// Policy for providers without an override
    pub default_policy: LookupPolicy,
    /// Per-provider overrides keyed by provider id
    pub provider_policies: BTreeMap<String, LookupPolicy>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            default_policy: LookupPolicy::default(),
            provider_policies: BTreeMap::new(),
        }
    }
}

impl ReputationConfig {
    /// Policy in effect for a provider.
    pub fn policy_for(&self, provider: &str) -> &LookupPolicy {
        self.provider_policies
            .get(provider)
            .unwrap_or(&self.default_policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::config_invalid(
                "reputation.concurrency_limit",
                "Must be at least 1",
            ));
        }
        self.default_policy.validate("reputation.default_policy")?;
        for (provider, policy) in &self.provider_policies {
            policy.validate(&format!("reputation.provider_policies.{}", provider))?;
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Colorize console output
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            color: true,
        }
    }
}
