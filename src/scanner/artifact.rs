//! Chunked signature scanning over evidence content.

use crate::core::config::ScanConfig;
use crate::core::error::Result;
use crate::core::types::{Evidence, EvidenceSource, Location, RawCandidate};
use crate::scanner::patterns::PatternRegistry;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counters collected while a candidate stream is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Bytes of content covered
    pub bytes_scanned: u64,
    /// Windows (byte evidence) or lines (line evidence) processed
    pub windows: u64,
    /// Candidates emitted
    pub candidates: u64,
    /// Matches skipped because they ran into the end of a window
    pub truncated: u64,
}

/// Pattern scanner producing raw candidates from evidence.
#[derive(Debug, Clone)]
pub struct ArtifactScanner {
    registry: PatternRegistry,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ArtifactScanner {
    /// Create a scanner over a registry with explicit window sizes.
    pub fn new(registry: PatternRegistry, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            registry,
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    /// Create a scanner from configuration.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let registry = PatternRegistry::from_config(config)?;
        Ok(Self::new(registry, config.chunk_size, config.chunk_overlap))
    }

    /// Signature registry in use.
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Lazily scan evidence belonging to `source`.
    ///
    /// Candidates come out in stream order: by offset (or line), then by
    /// signature registration order. Nothing is deduplicated here.
    pub fn scan<'a>(&'a self, source: &'a EvidenceSource, evidence: &'a Evidence) -> Candidates<'a> {
        let cursor = match evidence {
            Evidence::Bytes(data) => Cursor::Bytes { data, next: 0 },
            Evidence::Lines(lines) => Cursor::Lines { lines, next: 0 },
        };

        log::debug!(
            "Scanning {} ({}, {} bytes) with {} signatures",
            source.id,
            source.medium,
            evidence.len(),
            self.registry.len()
        );

        Candidates {
            scanner: self,
            source,
            cursor,
            buffer: VecDeque::new(),
            covered: vec![0; self.registry.len()],
            stats: ScanStats::default(),
        }
    }
}

enum Cursor<'a> {
    Bytes { data: &'a [u8], next: usize },
    Lines { lines: &'a [String], next: usize },
}

/// Lazy stream of raw candidates for one source.
pub struct Candidates<'a> {
    scanner: &'a ArtifactScanner,
    source: &'a EvidenceSource,
    cursor: Cursor<'a>,
    buffer: VecDeque<RawCandidate>,
    /// Per-signature absolute end of the last span already accounted for.
    covered: Vec<usize>,
    stats: ScanStats,
}

impl Candidates<'_> {
    /// Counters so far. Final once the iterator is exhausted.
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Process the next window or line into the buffer.
    /// Returns false once the evidence is exhausted.
    fn fill(&mut self) -> bool {
        match self.cursor {
            Cursor::Bytes { data, next } => {
                if next >= data.len() {
                    return false;
                }
                let owned_end = next.saturating_add(self.scanner.chunk_size).min(data.len());
                self.scan_window(data, next, owned_end);
                self.cursor = Cursor::Bytes {
                    data,
                    next: owned_end,
                };
                true
            }
            Cursor::Lines { lines, next } => {
                let Some(line) = lines.get(next) else {
                    return false;
                };
                self.scan_line(line, next as u64);
                self.cursor = Cursor::Lines {
                    lines,
                    next: next + 1,
                };
                true
            }
        }
    }

    fn scan_window(&mut self, data: &[u8], start: usize, owned_end: usize) {
        let window_end = owned_end
            .saturating_add(self.scanner.chunk_overlap)
            .min(data.len());
        let is_final = window_end == data.len();
        // Slice from zero so word boundaries see the bytes before the window.
        let haystack = &data[..window_end];

        let scanner = self.scanner;
        let mut spans = Vec::new();
        for (index, matcher) in scanner.registry.iter().enumerate() {
            for (s, e) in matcher.find_starting_in(haystack, start, owned_end) {
                if s < self.covered[index] {
                    continue;
                }
                if !is_final && e == window_end {
                    self.stats.truncated += 1;
                    self.covered[index] = e;
                    log::trace!(
                        "{}: '{}' match at 0x{:x} reaches window end, skipped",
                        self.source.id,
                        matcher.name(),
                        s
                    );
                    continue;
                }
                self.covered[index] = e;
                spans.push((s, index, e));
            }
        }
        spans.sort_unstable();

        for (s, index, e) in spans {
            self.push(index, Location::Byte(s as u64), &data[s..e]);
        }

        self.stats.windows += 1;
        self.stats.bytes_scanned += (owned_end - start) as u64;
    }

    fn scan_line(&mut self, line: &str, number: u64) {
        let bytes = line.as_bytes();
        let scanner = self.scanner;
        let mut spans = Vec::new();
        for (index, matcher) in scanner.registry.iter().enumerate() {
            for (s, e) in matcher.find_starting_in(bytes, 0, bytes.len()) {
                spans.push((s, index, e));
            }
        }
        spans.sort_unstable();

        for (s, index, e) in spans {
            self.push(index, Location::Line(number), &bytes[s..e]);
        }

        self.stats.windows += 1;
        self.stats.bytes_scanned += bytes.len() as u64 + 1;
    }

    fn push(&mut self, index: usize, location: Location, matched: &[u8]) {
        let scanner = self.scanner;
        let Some(matcher) = scanner.registry.iter().nth(index) else {
            return;
        };
        self.buffer.push_back(RawCandidate {
            source: self.source.id.clone(),
            location,
            text: String::from_utf8_lossy(matched).into_owned(),
            kind: matcher.kind(),
            pattern: matcher.name().to_string(),
        });
        self.stats.candidates += 1;
    }
}

impl Iterator for Candidates<'_> {
    type Item = RawCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            if !self.fill() {
                return None;
            }
        }
    }
}
