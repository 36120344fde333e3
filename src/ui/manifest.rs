//! Case manifest files for the command-line tool.
//!
//! A manifest lists the evidence sources of a case, where their extracted
//! content lives on disk and any events already known for them.

use crate::core::error::{Error, Result};
use crate::core::types::{Evidence, EvidenceSource, MediumKind, SourceEvent, SourceEvents, SourceId};
use crate::pipeline::Case;
use crate::reputation::ProviderSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How an evidence file is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceFormat {
    /// Raw bytes
    #[default]
    Bytes,
    /// UTF-8 text, one record per line
    Lines,
}

/// Location of a source's extracted content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    /// Path, relative to the manifest unless absolute
    pub path: PathBuf,
    #[serde(default)]
    pub format: EvidenceFormat,
}

/// One source entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSource {
    pub id: String,
    pub medium: MediumKind,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence: Option<EvidenceFile>,
    #[serde(default)]
    pub events: Vec<SourceEvent>,
}

/// A case description on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseManifest {
    pub sources: Vec<ManifestSource>,
    /// Reputation providers to consult in addition to command-line ones
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

impl CaseManifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("Failed to read manifest {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::config_invalid(format!("manifest {}", path.display()), e.to_string()))
    }

    /// Build a case, reading evidence files relative to `base_dir`.
    ///
    /// Unreadable evidence files leave their source registered but
    /// unsupplied, so the engine records it as skipped.
    pub fn into_case(self, base_dir: &Path) -> Result<Case> {
        let mut case = Case::new();

        for entry in self.sources {
            let id = SourceId::from(entry.id);
            let mut source = EvidenceSource::new(id.clone(), entry.medium);
            if let Some(captured_at) = entry.captured_at {
                source = source.with_captured_at(captured_at);
            }

            let evidence = entry.evidence.and_then(|file| {
                let path = if file.path.is_absolute() {
                    file.path
                } else {
                    base_dir.join(file.path)
                };
                match read_evidence(&path, file.format) {
                    Ok(evidence) => Some(evidence),
                    Err(e) => {
                        log::warn!("Evidence for {} unreadable: {}", id, e);
                        None
                    }
                }
            });

            if let Some(evidence) = &evidence {
                source = source.with_byte_length(evidence.len());
            }
            case.register(source)?;
            if let Some(evidence) = evidence {
                case.supply(&id, evidence)?;
            }
            if !entry.events.is_empty() {
                case.add_events(SourceEvents::new(id, entry.events));
            }
        }

        Ok(case)
    }
}

fn read_evidence(path: &Path, format: EvidenceFormat) -> Result<Evidence> {
    match format {
        EvidenceFormat::Bytes => Ok(Evidence::Bytes(std::fs::read(path)?)),
        EvidenceFormat::Lines => Ok(Evidence::from_text(&std::fs::read_to_string(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"{
        "sources": [
            {
                "id": "pcap",
                "medium": "network",
                "captured_at": "2024-03-01T10:00:00Z",
                "evidence": {"path": "dns.log", "format": "lines"},
                "events": [
                    {"time": {"type": "absolute", "value": "2024-03-01T10:00:10Z"},
                     "payload": {"type": "description", "text": "first beacon"}}
                ]
            },
            {"id": "ram", "medium": "memory", "evidence": {"path": "missing.bin"}},
            {"id": "cctv", "medium": "video",
             "events": [{"time": {"type": "offset", "value": 20000},
                         "payload": {"type": "description", "text": "figure at HMI"}}]}
        ],
        "providers": [{"type": "inline_list", "id": "intel", "list": {}}]
    }"#;

    #[test]
    fn test_manifest_into_case() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("dns.log"), "A evil-c2.example\nA update.microsoft.com\n")
            .unwrap();
        let path = dir.path().join("case.json");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = CaseManifest::load(&path).unwrap();
        assert_eq!(manifest.providers.len(), 1);

        let case = manifest.into_case(dir.path()).unwrap();
        assert_eq!(case.sources().len(), 3);

        let pcap = SourceId::from("pcap");
        assert!(matches!(case.evidence(&pcap), Some(Evidence::Lines(lines)) if lines.len() == 2));
        assert!(case.source(&pcap).unwrap().captured_at.is_some());

        // Missing file: registered, not supplied.
        let ram = SourceId::from("ram");
        assert!(case.source(&ram).is_some());
        assert!(case.evidence(&ram).is_none());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let manifest = CaseManifest {
            sources: vec![
                ManifestSource {
                    id: "ram".to_string(),
                    medium: MediumKind::Memory,
                    captured_at: None,
                    evidence: None,
                    events: Vec::new(),
                },
                ManifestSource {
                    id: "ram".to_string(),
                    medium: MediumKind::Controller,
                    captured_at: None,
                    evidence: None,
                    events: Vec::new(),
                },
            ],
            providers: Vec::new(),
        };
        let result = manifest.into_case(Path::new("."));
        assert!(matches!(result, Err(Error::DuplicateSource(_))));
    }

    #[test]
    fn test_invalid_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("case.json");
        std::fs::write(&path, r#"{"sources": [{"id": "x", "medium": "tape"}]}"#).unwrap();
        assert!(matches!(
            CaseManifest::load(&path),
            Err(Error::ConfigurationInvalid { .. })
        ));
    }
}
