//! Reputation from an analyst-maintained list.

use crate::classifier::validate;
use crate::core::error::{Error, Result};
use crate::core::types::{
    DetectionRatio, Indicator, IndicatorKey, IndicatorKind, IndicatorTag, ReputationVerdict,
};
use crate::reputation::{LookupError, ReputationProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Engine count used when a list does not say how many feeds back it.
pub const DEFAULT_ENGINE_COUNT: u32 = 70;

fn default_engines() -> u32 {
    DEFAULT_ENGINE_COUNT
}

/// One listed indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticListEntry {
    pub kind: IndicatorKind,
    pub value: String,
    pub malicious: bool,
    /// Detections out of the list's engine count; defaults to all engines
    /// for malicious entries and none for clean ones.
    #[serde(default)]
    pub detections: Option<u32>,
    #[serde(default)]
    pub rationale: String,
}

/// Serialized form of a static reputation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticList {
    #[serde(default)]
    pub entries: Vec<StaticListEntry>,
    /// Domains under these suffixes are reported clean
    #[serde(default)]
    pub benign_domain_suffixes: Vec<String>,
    /// Report RFC 1918 addresses as clean
    #[serde(default)]
    pub private_is_clean: bool,
    #[serde(default = "default_engines")]
    pub engines: u32,
}

impl Default for StaticList {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            benign_domain_suffixes: Vec::new(),
            private_is_clean: false,
            engines: DEFAULT_ENGINE_COUNT,
        }
    }
}

impl StaticList {
    /// Load a list from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::config_invalid(
                format!("reputation list {}", path.display()),
                e.to_string(),
            )
        })
    }
}

/// Provider answering from a fixed list; anything unlisted is unavailable.
pub struct StaticListProvider {
    id: String,
    entries: HashMap<IndicatorKey, StaticListEntry>,
    benign_domain_suffixes: Vec<String>,
    private_is_clean: bool,
    engines: u32,
}

impl StaticListProvider {
    /// Build a provider from a parsed list.
    pub fn new(id: impl Into<String>, list: StaticList) -> Self {
        let entries = list
            .entries
            .into_iter()
            .map(|mut entry| {
                // Key entries the way scanned indicators are normalized.
                entry.value = match validate(entry.kind, &entry.value) {
                    Ok(validated) => validated.value,
                    Err(_) => entry.value.trim().to_string(),
                };
                (IndicatorKey::new(entry.kind, entry.value.clone()), entry)
            })
            .collect();

        let benign_domain_suffixes = list
            .benign_domain_suffixes
            .into_iter()
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            id: id.into(),
            entries,
            benign_domain_suffixes,
            private_is_clean: list.private_is_clean,
            engines: list.engines.max(1),
        }
    }

    /// Load a provider from a JSON list file.
    pub fn from_json_file(id: impl Into<String>, path: &Path) -> Result<Self> {
        let list = StaticList::load(path)?;
        let provider = Self::new(id, list);
        log::info!(
            "Loaded {} reputation entries for '{}' from {}",
            provider.len(),
            provider.id,
            path.display()
        );
        Ok(provider)
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_benign_domain(&self, domain: &str) -> bool {
        self.benign_domain_suffixes.iter().any(|suffix| {
            domain == suffix
                || domain
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|head| head.ends_with('.'))
        })
    }
}

#[async_trait]
impl ReputationProvider for StaticListProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn lookup(&self, indicator: &Indicator) -> std::result::Result<ReputationVerdict, LookupError> {
        let key = indicator.key();

        if let Some(entry) = self.entries.get(&key) {
            let rationale = if entry.rationale.is_empty() {
                if entry.malicious {
                    "Listed as malicious".to_string()
                } else {
                    "Listed as clean".to_string()
                }
            } else {
                entry.rationale.clone()
            };

            return Ok(if entry.malicious {
                let detections = entry.detections.unwrap_or(self.engines).min(self.engines);
                ReputationVerdict::malicious(
                    key,
                    &self.id,
                    DetectionRatio::new(detections, self.engines),
                    rationale,
                )
            } else {
                let detections = entry.detections.unwrap_or(0).min(self.engines);
                ReputationVerdict::clean(
                    key,
                    &self.id,
                    DetectionRatio::new(detections, self.engines),
                    rationale,
                )
            });
        }

        if self.private_is_clean && indicator.has_tag(IndicatorTag::Private) {
            return Ok(ReputationVerdict::clean(
                key,
                &self.id,
                DetectionRatio::new(0, self.engines),
                "Private IP address",
            ));
        }

        if indicator.kind == IndicatorKind::Domain && self.is_benign_domain(&indicator.value) {
            return Ok(ReputationVerdict::clean(
                key,
                &self.id,
                DetectionRatio::new(0, self.engines),
                "Legitimate domain",
            ));
        }

        Err(LookupError::NotListed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Location, SourceId};
    use tempfile::tempdir;

    fn indicator(kind: IndicatorKind, value: &str) -> Indicator {
        Indicator::new(kind, value, SourceId::from("pcap"), Location::Line(0))
    }

    fn sample() -> StaticListProvider {
        StaticListProvider::new(
            "analyst-list",
            StaticList {
                entries: vec![
                    StaticListEntry {
                        kind: IndicatorKind::Ip,
                        value: "185.220.101.45".to_string(),
                        malicious: true,
                        detections: Some(45),
                        rationale: "Known malicious IP".to_string(),
                    },
                    StaticListEntry {
                        kind: IndicatorKind::Hash,
                        value: "44D88612FEA8A8F36DE82E1278ABB02F".to_string(),
                        malicious: true,
                        detections: None,
                        rationale: String::new(),
                    },
                ],
                benign_domain_suffixes: vec!["microsoft.com".to_string(), ".google.com".to_string()],
                private_is_clean: true,
                engines: 70,
            },
        )
    }

    #[tokio::test]
    async fn test_listed_entries() {
        let provider = sample();

        let ip = provider
            .lookup(&indicator(IndicatorKind::Ip, "185.220.101.45"))
            .await
            .unwrap();
        assert!(ip.malicious);
        assert_eq!(ip.ratio, DetectionRatio::new(45, 70));

        let hash = provider
            .lookup(&indicator(IndicatorKind::Hash, "44d88612fea8a8f36de82e1278abb02f"))
            .await
            .unwrap();
        assert_eq!(hash.ratio, DetectionRatio::new(70, 70));
        assert_eq!(hash.rationale, "Listed as malicious");
    }

    #[tokio::test]
    async fn test_private_and_benign_rules() {
        let provider = sample();

        let private = indicator(IndicatorKind::Ip, "10.0.0.5").with_tag(IndicatorTag::Private);
        assert!(!provider.lookup(&private).await.unwrap().malicious);

        let update = indicator(IndicatorKind::Domain, "update.microsoft.com");
        assert!(!provider.lookup(&update).await.unwrap().malicious);

        let lookalike = indicator(IndicatorKind::Domain, "evilmicrosoft.com");
        assert_eq!(provider.lookup(&lookalike).await, Err(LookupError::NotListed));
    }

    #[tokio::test]
    async fn test_unlisted_is_unavailable() {
        let provider = sample();
        let result = provider
            .lookup(&indicator(IndicatorKind::ProcessName, "svchost.exe"))
            .await;
        assert_eq!(result, Err(LookupError::NotListed));
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.json");
        std::fs::write(
            &path,
            r#"{"entries": [{"kind": "domain", "value": "evil-c2.example", "malicious": true}],
                "private_is_clean": true}"#,
        )
        .unwrap();

        let provider = StaticListProvider::from_json_file("file-list", &path).unwrap();
        assert_eq!(provider.len(), 1);
        assert_eq!(provider.id(), "file-list");
        assert_eq!(provider.engines, DEFAULT_ENGINE_COUNT);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StaticList::load(&path).unwrap_err().is_fatal());
    }
}
