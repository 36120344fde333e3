//! Signature matchers used by the artifact scanner.
//!
//! Every matcher is a byte-level regular expression tagged with the
//! indicator kind it proposes. Matching is purely textual; nothing here
//! understands file formats.

use crate::core::config::{PatternSpec, ScanConfig};
use crate::core::error::{Error, Result};
use crate::core::types::IndicatorKind;
use regex::bytes::Regex;

/// Dotted-quad IPv4 candidates; octet ranges are checked by the classifier.
const IPV4: &str = r"(?-u)\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b";

/// Hostnames with at least one dot and an alphabetic final label.
const DOMAIN: &str = r"(?i-u)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24}\b";

/// Hex runs long enough to be a digest; exact lengths are checked later.
const HEX_DIGEST: &str = r"(?i-u)\b[0-9a-f]{32,128}\b";

/// Drive-letter paths. Directory names may contain spaces, the leaf may not.
const WINDOWS_PATH: &str =
    r"(?i-u)\b[a-z]:\\(?:[a-z0-9 _.$~()'\-]+\\)*[a-z0-9_.$~()'\-]+";

/// Absolute paths under well-known Unix top-level directories.
const UNIX_PATH: &str = r"(?-u)/(?:bin|boot|dev|etc|home|lib|lib64|mnt|opt|proc|root|run|sbin|srv|sys|tmp|usr|var)(?:/[A-Za-z0-9_.\-]+)+";

/// Keys under a registry root, long or abbreviated. Intermediate keys may
/// contain spaces, the last one may not.
const REGISTRY_ROOT: &str = r"(?i-u)\b(?:HKEY_LOCAL_MACHINE|HKEY_CURRENT_USER|HKEY_CLASSES_ROOT|HKEY_USERS|HKEY_CURRENT_CONFIG|HKLM|HKCU|HKCR|HKU|HKCC)\\(?:[a-z0-9 _.{}\-]+\\)*[a-z0-9_.{}\-]+";

/// Hive-relative keys as they appear in memory strings.
const REGISTRY_HIVE: &str =
    r"(?i-u)\b(?:SOFTWARE|SYSTEM)\\[a-z0-9_.{}\-]+(?:\\[a-z0-9 _.{}\-]+)*\\[a-z0-9_.{}\-]+";

/// File names with an executable or script suffix.
const EXECUTABLE_NAME: &str =
    r"(?i-u)\b[a-z0-9_\-]{1,64}\.(?:exe|dll|sys|scr|bat|cmd|ps1|vbs|msi)\b";

/// A named, kind-tagged byte pattern.
#[derive(Debug, Clone)]
pub struct SignatureMatcher {
    name: String,
    kind: IndicatorKind,
    regex: Regex,
}

impl SignatureMatcher {
    /// Compile a new matcher.
    pub fn new(name: impl Into<String>, kind: IndicatorKind, pattern: &str) -> Result<Self> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| {
            Error::config_invalid(
                format!("scan.patterns.{}", name),
                format!("Failed to compile pattern: {}", e),
            )
        })?;
        Ok(Self { name, kind, regex })
    }

    /// Compile a matcher from a configuration entry.
    pub fn from_spec(spec: &PatternSpec) -> Result<Self> {
        Self::new(spec.name.clone(), spec.kind, &spec.regex)
    }

    /// Signature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indicator kind this signature proposes.
    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    /// Find non-empty matches that start in `from..until`.
    ///
    /// The haystack may extend before `from`, so word boundaries see the
    /// bytes preceding the search range.
    pub fn find_starting_in(&self, haystack: &[u8], from: usize, until: usize) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut pos = from;

        while pos < until && pos <= haystack.len() {
            let Some(m) = self.regex.find_at(haystack, pos) else {
                break;
            };
            if m.start() >= until {
                break;
            }
            if m.end() > m.start() {
                spans.push((m.start(), m.end()));
                pos = m.end();
            } else {
                pos = m.start() + 1;
            }
        }

        spans
    }
}

/// Ordered, extensible set of signature matchers.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    matchers: Vec<SignatureMatcher>,
}

impl PatternRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create the registry of built-in signatures.
    pub fn builtin() -> Self {
        let builtins: [(&str, IndicatorKind, &str); 8] = [
            ("ipv4", IndicatorKind::Ip, IPV4),
            ("domain", IndicatorKind::Domain, DOMAIN),
            ("hex-digest", IndicatorKind::Hash, HEX_DIGEST),
            ("windows-path", IndicatorKind::FilePath, WINDOWS_PATH),
            ("unix-path", IndicatorKind::FilePath, UNIX_PATH),
            ("registry-root", IndicatorKind::RegistryKey, REGISTRY_ROOT),
            ("registry-hive", IndicatorKind::RegistryKey, REGISTRY_HIVE),
            ("executable-name", IndicatorKind::ProcessName, EXECUTABLE_NAME),
        ];

        let matchers = builtins
            .iter()
            .filter_map(|(name, kind, pattern)| match SignatureMatcher::new(*name, *kind, pattern) {
                Ok(matcher) => Some(matcher),
                Err(e) => {
                    log::error!("Built-in signature '{}' failed to compile: {}", name, e);
                    None
                }
            })
            .collect();

        Self { matchers }
    }

    /// Build the registry described by a scan configuration.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let mut registry = Self::builtin();

        for name in &config.disabled_patterns {
            if !registry.disable(name) {
                return Err(Error::config_invalid(
                    "scan.disabled_patterns",
                    format!("No signature named '{}'", name),
                ));
            }
        }

        for spec in &config.extra_patterns {
            registry.register(SignatureMatcher::from_spec(spec)?)?;
        }

        Ok(registry)
    }

    /// Add a signature. Names must be unique.
    pub fn register(&mut self, matcher: SignatureMatcher) -> Result<()> {
        if self.get(matcher.name()).is_some() {
            return Err(Error::config_invalid(
                "scan.patterns",
                format!("Duplicate signature name '{}'", matcher.name()),
            ));
        }
        log::debug!(
            "Registered signature '{}' ({})",
            matcher.name(),
            matcher.kind()
        );
        self.matchers.push(matcher);
        Ok(())
    }

    /// Remove a signature by name. Returns whether it existed.
    pub fn disable(&mut self, name: &str) -> bool {
        let before = self.matchers.len();
        self.matchers.retain(|m| m.name() != name);
        self.matchers.len() != before
    }

    /// Look up a signature by name.
    pub fn get(&self, name: &str) -> Option<&SignatureMatcher> {
        self.matchers.iter().find(|m| m.name() == name)
    }

    /// Iterate over signatures in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &SignatureMatcher> {
        self.matchers.iter()
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Whether the registry has no signatures.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}
