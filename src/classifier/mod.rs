//! Indicator classification.
//!
//! Raw candidates are validated per kind, normalized and folded into a
//! deduplicated [`IndicatorSet`] keyed by `(kind, value)`.

pub mod validate;

pub use validate::{validate, Validated, ValidationRejected};

use crate::core::types::{Indicator, IndicatorKey, IndicatorKind, RawCandidate};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Deduplicated indicators, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSet {
    indicators: BTreeMap<IndicatorKey, Indicator>,
}

impl IndicatorSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an indicator, folding it into an existing record with the same key.
    pub fn insert(&mut self, indicator: Indicator) {
        match self.indicators.get_mut(&indicator.key()) {
            Some(existing) => existing.absorb(indicator),
            None => {
                self.indicators.insert(indicator.key(), indicator);
            }
        }
    }

    /// Union of two sets. Order of the operands does not matter.
    pub fn merge(mut self, other: IndicatorSet) -> IndicatorSet {
        for indicator in other.indicators.into_values() {
            self.insert(indicator);
        }
        self
    }

    /// Look up an indicator by key.
    pub fn get(&self, key: &IndicatorKey) -> Option<&Indicator> {
        self.indicators.get(key)
    }

    /// Whether an indicator with this key exists.
    pub fn contains(&self, key: &IndicatorKey) -> bool {
        self.indicators.contains_key(key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Indicator> {
        self.indicators.values()
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Number of indicators per kind. Every kind is present, zero or not.
    pub fn count_by_kind(&self) -> BTreeMap<IndicatorKind, usize> {
        let mut counts: BTreeMap<IndicatorKind, usize> =
            IndicatorKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        for indicator in self.iter() {
            *counts.entry(indicator.kind).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<Indicator> for IndicatorSet {
    fn from_iter<I: IntoIterator<Item = Indicator>>(iter: I) -> Self {
        let mut set = IndicatorSet::new();
        for indicator in iter {
            set.insert(indicator);
        }
        set
    }
}

impl Serialize for IndicatorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.indicators.values())
    }
}

/// Counters from one classification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyStats {
    /// Candidates consumed
    pub candidates: u64,
    /// Candidates dropped by validation
    pub rejected: u64,
}

/// Validates candidates into indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorClassifier;

impl IndicatorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a stream of candidates.
    pub fn classify<I>(&self, candidates: I) -> IndicatorSet
    where
        I: IntoIterator<Item = RawCandidate>,
    {
        self.classify_counted(candidates).0
    }

    /// Classify a stream of candidates, also returning counters.
    ///
    /// Rejected candidates are dropped and only trace-logged.
    pub fn classify_counted<I>(&self, candidates: I) -> (IndicatorSet, ClassifyStats)
    where
        I: IntoIterator<Item = RawCandidate>,
    {
        let mut set = IndicatorSet::new();
        let mut stats = ClassifyStats::default();

        for candidate in candidates {
            stats.candidates += 1;
            match validate(candidate.kind, &candidate.text) {
                Ok(validated) => {
                    let mut indicator = Indicator::new(
                        candidate.kind,
                        validated.value,
                        candidate.source,
                        candidate.location,
                    );
                    indicator.tags.extend(validated.tags);
                    set.insert(indicator);
                }
                Err(rejection) => {
                    stats.rejected += 1;
                    log::trace!("{} ({}, {})", rejection, candidate.source, candidate.pattern);
                }
            }
        }

        log::debug!(
            "Classified {} candidates into {} indicators ({} rejected)",
            stats.candidates,
            set.len(),
            stats.rejected
        );

        (set, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IndicatorTag, Location, SourceId};

    fn candidate(source: &str, at: u64, kind: IndicatorKind, text: &str) -> RawCandidate {
        RawCandidate {
            source: SourceId::from(source),
            location: Location::Byte(at),
            text: text.to_string(),
            kind,
            pattern: "test".to_string(),
        }
    }

    #[test]
    fn test_classify_drops_rejections() {
        let classifier = IndicatorClassifier::new();
        let (set, stats) = classifier.classify_counted(vec![
            candidate("ram", 0, IndicatorKind::Ip, "999.999.999.999"),
            candidate("ram", 20, IndicatorKind::Hash, "1234"),
            candidate("ram", 40, IndicatorKind::Ip, "192.168.1.100"),
        ]);

        assert_eq!(set.len(), 1);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.rejected, 2);

        let ip = set
            .get(&IndicatorKey::new(IndicatorKind::Ip, "192.168.1.100"))
            .unwrap();
        assert!(ip.has_tag(IndicatorTag::Private));
    }

    #[test]
    fn test_classify_empty() {
        let set = IndicatorClassifier::new().classify(Vec::new());
        assert!(set.is_empty());
        assert!(set.count_by_kind().values().all(|count| *count == 0));
    }

    #[test]
    fn test_repeated_sightings_fold() {
        let set = IndicatorClassifier::new().classify(vec![
            candidate("ram", 90, IndicatorKind::ProcessName, "EVIL.exe"),
            candidate("ram", 10, IndicatorKind::ProcessName, "evil.EXE"),
        ]);

        assert_eq!(set.len(), 1);
        let evil = set.iter().next().unwrap();
        assert_eq!(evil.value, "evil.exe");
        assert_eq!(evil.occurrences, 2);
        assert_eq!(evil.first_seen, Location::Byte(10));
    }

    #[test]
    fn test_merge_across_sources() {
        let classifier = IndicatorClassifier::new();
        let ram = classifier.classify(vec![candidate(
            "ram",
            5,
            IndicatorKind::Ip,
            "185.220.101.45",
        )]);
        let pcap = classifier.classify(vec![
            candidate("pcap", 7, IndicatorKind::Ip, "185.220.101.45"),
            candidate("pcap", 9, IndicatorKind::Domain, "evil-c2.example"),
        ]);

        let left = ram.clone().merge(pcap.clone());
        let right = pcap.merge(ram);
        assert_eq!(left, right);
        assert_eq!(left.len(), 2);

        let ip = left
            .get(&IndicatorKey::new(IndicatorKind::Ip, "185.220.101.45"))
            .unwrap();
        assert_eq!(ip.sources.len(), 2);

        // Merging a set with itself adds no records.
        let again = left.clone().merge(left.clone());
        assert_eq!(again.len(), left.len());
    }

    #[test]
    fn test_count_by_kind() {
        let set = IndicatorClassifier::new().classify(vec![
            candidate("ram", 0, IndicatorKind::Ip, "185.220.101.45"),
            candidate("ram", 1, IndicatorKind::Ip, "45.33.32.156"),
            candidate("ram", 2, IndicatorKind::Domain, "evil-c2.example"),
        ]);
        let counts = set.count_by_kind();
        assert_eq!(counts[&IndicatorKind::Ip], 2);
        assert_eq!(counts[&IndicatorKind::Domain], 1);
        assert_eq!(counts[&IndicatorKind::Hash], 0);
    }
}
