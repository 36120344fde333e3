//! Core type definitions shared by every pipeline stage.

use crate::utils::hash::HashAlgorithm;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a registered evidence source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a new source identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of medium an evidence source was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediumKind {
    /// RAM image or memory-string extraction
    Memory,
    /// Packet capture or decoded network log
    Network,
    /// Industrial controller (PLC) memory dump
    Controller,
    /// Video footage; contributes timeline events only
    Video,
    /// Office documents, manuals, notes
    Document,
}

impl MediumKind {
    /// Whether byte/line content of this medium is pattern-scanned.
    pub fn scannable(&self) -> bool {
        !matches!(self, MediumKind::Video)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediumKind::Memory => "memory",
            MediumKind::Network => "network",
            MediumKind::Controller => "controller",
            MediumKind::Video => "video",
            MediumKind::Document => "document",
        }
    }
}

impl std::fmt::Display for MediumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine can do with a given source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Content can be scanned for indicators
    pub scan: bool,
    /// Relative event offsets can be resolved against a capture time
    pub timestamp_resolve: bool,
}

/// A named origin of raw forensic data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    /// Unique identifier within a case
    pub id: SourceId,
    /// Medium the evidence came from
    pub medium: MediumKind,
    /// Size of the original evidence, if known
    pub byte_length: Option<u64>,
    /// When the evidence was captured, if known
    pub captured_at: Option<DateTime<Utc>>,
}

impl EvidenceSource {
    /// Create a new evidence source.
    pub fn new(id: impl Into<SourceId>, medium: MediumKind) -> Self {
        Self {
            id: id.into(),
            medium,
            byte_length: None,
            captured_at: None,
        }
    }

    /// Set the original evidence size.
    pub fn with_byte_length(mut self, byte_length: u64) -> Self {
        self.byte_length = Some(byte_length);
        self
    }

    /// Set the capture time.
    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    /// Capabilities of this source.
    pub fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            scan: self.medium.scannable(),
            timestamp_resolve: self.captured_at.is_some(),
        }
    }
}

/// Already-extracted content of an evidence source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Raw bytes (memory image, controller dump, capture payload)
    Bytes(Vec<u8>),
    /// Line-oriented text (decoder output, string extraction)
    Lines(Vec<String>),
}

impl Evidence {
    /// Split text into line evidence.
    pub fn from_text(text: &str) -> Self {
        Evidence::Lines(text.lines().map(str::to_string).collect())
    }

    /// Total content size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Evidence::Bytes(bytes) => bytes.len() as u64,
            Evidence::Lines(lines) => lines.iter().map(|l| l.len() as u64 + 1).sum(),
        }
    }

    /// Whether there is no content at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Evidence::Bytes(bytes) => bytes.is_empty(),
            Evidence::Lines(lines) => lines.is_empty(),
        }
    }
}

/// Position of a match inside its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "unit", content = "at")]
pub enum Location {
    /// Byte offset into a byte stream
    Byte(u64),
    /// Zero-based line number in line evidence
    Line(u64),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Byte(offset) => write!(f, "0x{:x}", offset),
            Location::Line(line) => write!(f, "line {}", line + 1),
        }
    }
}

/// Type of a forensic indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Ip,
    Domain,
    Hash,
    FilePath,
    RegistryKey,
    ProcessName,
}

impl IndicatorKind {
    /// All indicator kinds in canonical order.
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Ip,
        IndicatorKind::Domain,
        IndicatorKind::Hash,
        IndicatorKind::FilePath,
        IndicatorKind::RegistryKey,
        IndicatorKind::ProcessName,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Ip => "ip",
            IndicatorKind::Domain => "domain",
            IndicatorKind::Hash => "hash",
            IndicatorKind::FilePath => "file_path",
            IndicatorKind::RegistryKey => "registry_key",
            IndicatorKind::ProcessName => "process_name",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ip" | "ipv4" => Some(IndicatorKind::Ip),
            "domain" => Some(IndicatorKind::Domain),
            "hash" => Some(IndicatorKind::Hash),
            "file_path" | "path" => Some(IndicatorKind::FilePath),
            "registry_key" | "registry" => Some(IndicatorKind::RegistryKey),
            "process_name" | "process" => Some(IndicatorKind::ProcessName),
            _ => None,
        }
    }
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation attached to an indicator during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorTag {
    /// RFC 1918 private address
    Private,
    /// Only prefix/suffix checks were applied
    BestEffort,
    /// Digest algorithm inferred from hex length
    Digest(HashAlgorithm),
}

/// Uniqueness key of an indicator: kind plus normalized value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndicatorKey {
    pub kind: IndicatorKind,
    pub value: String,
}

impl IndicatorKey {
    /// Create a new indicator key.
    pub fn new(kind: IndicatorKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// An unvalidated pattern match straight out of the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    /// Source the match was found in
    pub source: SourceId,
    /// Where in the source it was found
    pub location: Location,
    /// Matched text (lossy UTF-8 for binary input)
    pub text: String,
    /// Kind the matching signature proposes
    pub kind: IndicatorKind,
    /// Name of the signature that matched
    pub pattern: String,
}

/// A validated, normalized and deduplicated indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    /// Indicator type
    pub kind: IndicatorKind,
    /// Normalized value
    pub value: String,
    /// Every source the indicator was seen in
    pub sources: BTreeSet<SourceId>,
    /// Earliest location across all sightings
    pub first_seen: Location,
    /// Number of raw candidates folded into this record
    pub occurrences: u64,
    /// Classification annotations
    pub tags: BTreeSet<IndicatorTag>,
}

impl Indicator {
    /// Create an indicator from its first sighting.
    pub fn new(
        kind: IndicatorKind,
        value: impl Into<String>,
        source: SourceId,
        first_seen: Location,
    ) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            kind,
            value: value.into(),
            sources,
            first_seen,
            occurrences: 1,
            tags: BTreeSet::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: IndicatorTag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Uniqueness key of this indicator.
    pub fn key(&self) -> IndicatorKey {
        IndicatorKey::new(self.kind, self.value.clone())
    }

    /// Whether the indicator carries a tag.
    pub fn has_tag(&self, tag: IndicatorTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Fold another record with the same key into this one.
    ///
    /// Commutative and associative: sources and tags are unioned, the
    /// earliest location wins and occurrence counts add up.
    pub fn absorb(&mut self, other: Indicator) {
        debug_assert_eq!(self.key(), other.key());
        self.sources.extend(other.sources);
        self.tags.extend(other.tags);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.occurrences += other.occurrences;
    }
}

/// Detections out of engines/feeds consulted by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRatio {
    pub detections: u32,
    pub total: u32,
}

impl DetectionRatio {
    /// Create a new detection ratio.
    pub fn new(detections: u32, total: u32) -> Self {
        Self { detections, total }
    }

    /// Ratio as a fraction in [0, 1]; zero when nothing was consulted.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.detections.min(self.total)) / f64::from(self.total)
        }
    }
}

impl std::fmt::Display for DetectionRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.detections, self.total)
    }
}

/// One provider's opinion about one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationVerdict {
    /// Indicator the verdict is about
    pub indicator: IndicatorKey,
    /// Whether the provider considers it malicious
    pub malicious: bool,
    /// Supporting detection ratio
    pub ratio: DetectionRatio,
    /// Free-text reasoning
    pub rationale: String,
    /// Provider that produced the verdict
    pub provider: String,
}

impl ReputationVerdict {
    /// Create a malicious verdict.
    pub fn malicious(
        indicator: IndicatorKey,
        provider: impl Into<String>,
        ratio: DetectionRatio,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            indicator,
            malicious: true,
            ratio,
            rationale: rationale.into(),
            provider: provider.into(),
        }
    }

    /// Create a clean verdict.
    pub fn clean(
        indicator: IndicatorKey,
        provider: impl Into<String>,
        ratio: DetectionRatio,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            indicator,
            malicious: false,
            ratio,
            rationale: rationale.into(),
            provider: provider.into(),
        }
    }
}

/// Aggregate reputation of an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationStatus {
    /// At least one provider flagged it above the detection threshold
    Malicious,
    /// Looked up successfully, nothing flagged it
    Clean,
    /// No provider produced a verdict
    Unknown,
}

impl std::fmt::Display for ReputationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malicious => write!(f, "malicious"),
            Self::Clean => write!(f, "clean"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Overall case risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Elevated,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Low => write!(f, "low"),
            Self::Elevated => write!(f, "elevated"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How firmly a timeline event is anchored in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Exact timestamp supplied by the source
    Certain,
    /// Bounded by neighbouring events of the same source
    Inferred,
    /// No temporal anchor at all
    Approximate,
}

/// Time information a source declares for one of its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum EventTime {
    /// Absolute wall-clock time
    Absolute(DateTime<Utc>),
    /// Offset from the source's capture time
    #[serde(with = "duration_millis")]
    Offset(Duration),
    /// Only the position in the source's own event order is known
    Sequence,
    /// No time information
    Unknown,
}

/// What a timeline event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventPayload {
    /// Sighting of an indicator, with its aggregate reputation if scored
    Indicator {
        key: IndicatorKey,
        status: Option<ReputationStatus>,
    },
    /// Opaque description supplied by the caller
    Description { text: String },
}

impl EventPayload {
    /// Create a description payload.
    pub fn description(text: impl Into<String>) -> Self {
        EventPayload::Description { text: text.into() }
    }
}

/// An event as contributed by one source, before merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvent {
    pub time: EventTime,
    pub payload: EventPayload,
}

impl SourceEvent {
    /// Create a new source event.
    pub fn new(time: EventTime, payload: EventPayload) -> Self {
        Self { time, payload }
    }

    /// Event at an absolute time.
    pub fn at(time: DateTime<Utc>, description: impl Into<String>) -> Self {
        Self::new(EventTime::Absolute(time), EventPayload::description(description))
    }

    /// Event at an offset from the source's capture time.
    pub fn offset(offset: Duration, description: impl Into<String>) -> Self {
        Self::new(EventTime::Offset(offset), EventPayload::description(description))
    }

    /// Event known only by its position in the source's order.
    pub fn sequenced(description: impl Into<String>) -> Self {
        Self::new(EventTime::Sequence, EventPayload::description(description))
    }

    /// Event without any time information.
    pub fn untimed(description: impl Into<String>) -> Self {
        Self::new(EventTime::Unknown, EventPayload::description(description))
    }
}

/// All events contributed by one source, in the source's declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvents {
    pub source: SourceId,
    pub events: Vec<SourceEvent>,
}

impl SourceEvents {
    /// Create an event set for a source.
    pub fn new(source: impl Into<SourceId>, events: Vec<SourceEvent>) -> Self {
        Self {
            source: source.into(),
            events,
        }
    }
}

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(millis))
    }
}
