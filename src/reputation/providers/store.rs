//! SQLite-backed store of previously obtained verdicts.

use crate::core::config::EngineConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{
    DetectionRatio, Indicator, IndicatorKey, IndicatorKind, ReputationVerdict,
};
use crate::reputation::{LookupError, ReputationProvider, ScoredIndicator};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// SQL schema version for migrations.
const SCHEMA_VERSION: u32 = 1;

/// Provider id used when none is given.
pub const DEFAULT_STORE_ID: &str = "reputation-store";

/// Verdict store usable as a reputation provider.
pub struct ReputationStore {
    id: String,
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl ReputationStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Store(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("Failed to open store: {}", e)))?;

        let store = Self {
            id: DEFAULT_STORE_ID.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            id: DEFAULT_STORE_ID.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open the store under the application data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(&EngineConfig::data_dir().join("reputation.db"))
    }

    /// Use a different provider id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::lock_poisoned("reputation store connection"))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::Store(format!("Failed to create metadata table: {}", e)))?;

        let version: Option<u32> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
            )
            .optional()
            .map_err(|e| Error::Store(format!("Failed to query schema version: {}", e)))?;

        if version.unwrap_or(0) < SCHEMA_VERSION {
            log::info!(
                "Migrating reputation store from version {} to {}",
                version.unwrap_or(0),
                SCHEMA_VERSION
            );
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS verdicts (
                    kind TEXT NOT NULL,
                    value TEXT NOT NULL,
                    provider TEXT NOT NULL,
                    malicious INTEGER NOT NULL,
                    detections INTEGER NOT NULL,
                    total INTEGER NOT NULL,
                    rationale TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (kind, value)
                );

                CREATE INDEX IF NOT EXISTS idx_verdicts_malicious
                    ON verdicts(malicious);
                ",
            )
            .map_err(|e| Error::Store(format!("Failed to create schema: {}", e)))?;

            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )
            .map_err(|e| Error::Store(format!("Failed to update schema version: {}", e)))?;
        }

        Ok(())
    }

    /// Insert or replace the verdict for an indicator.
    pub fn upsert(&self, verdict: &ReputationVerdict) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO verdicts (
                kind, value, provider, malicious, detections, total, rationale, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(kind, value) DO UPDATE SET
                provider = excluded.provider,
                malicious = excluded.malicious,
                detections = excluded.detections,
                total = excluded.total,
                rationale = excluded.rationale,
                updated_at = excluded.updated_at",
            params![
                verdict.indicator.kind.as_str(),
                verdict.indicator.value,
                verdict.provider,
                verdict.malicious as i32,
                verdict.ratio.detections,
                verdict.ratio.total,
                verdict.rationale,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to upsert verdict: {}", e)))?;
        Ok(())
    }

    /// Record every verdict of a scoring run, skipping this store's own.
    pub fn record(&self, scored: &[ScoredIndicator]) -> Result<usize> {
        let mut written = 0;
        for verdict in scored
            .iter()
            .flat_map(|s| s.verdicts.iter())
            .filter(|v| v.provider != self.id)
        {
            self.upsert(verdict)?;
            written += 1;
        }
        log::debug!("Recorded {} verdicts in {}", written, self.id);
        Ok(written)
    }

    /// Fetch the stored verdict for an indicator.
    pub fn get(&self, key: &IndicatorKey) -> Result<Option<ReputationVerdict>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT provider, malicious, detections, total, rationale
             FROM verdicts WHERE kind = ?1 AND value = ?2",
            params![key.kind.as_str(), key.value],
            |row| {
                Ok(ReputationVerdict {
                    indicator: key.clone(),
                    provider: row.get(0)?,
                    malicious: row.get::<_, i32>(1)? != 0,
                    ratio: DetectionRatio::new(row.get(2)?, row.get(3)?),
                    rationale: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Store(format!("Failed to query verdict: {}", e)))
    }

    /// Delete the stored verdict for an indicator. Returns whether one existed.
    pub fn remove(&self, key: &IndicatorKey) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM verdicts WHERE kind = ?1 AND value = ?2",
                params![key.kind.as_str(), key.value],
            )
            .map_err(|e| Error::Store(format!("Failed to delete verdict: {}", e)))?;
        Ok(removed > 0)
    }

    /// Number of stored verdicts.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM verdicts", [], |row| row.get(0))
            .map_err(|e| Error::Store(format!("Failed to count verdicts: {}", e)))
    }

    /// Number of stored verdicts per indicator kind.
    pub fn count_by_kind(&self) -> Result<Vec<(IndicatorKind, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT kind, COUNT(*) FROM verdicts GROUP BY kind ORDER BY kind")
            .map_err(|e| Error::Store(format!("Failed to prepare query: {}", e)))?;

        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
            .map_err(|e| Error::Store(format!("Failed to count by kind: {}", e)))?
            .filter_map(|r| r.ok())
            .filter_map(|(kind, count)| IndicatorKind::parse(&kind).map(|k| (k, count)))
            .collect();

        Ok(counts)
    }
}

#[async_trait]
impl ReputationProvider for ReputationStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn lookup(&self, indicator: &Indicator) -> std::result::Result<ReputationVerdict, LookupError> {
        let stored = self
            .get(&indicator.key())
            .map_err(|e| LookupError::Unavailable(e.to_string()))?
            .ok_or(LookupError::NotListed)?;

        Ok(ReputationVerdict {
            rationale: format!("cached from {}: {}", stored.provider, stored.rationale),
            provider: self.id.clone(),
            ..stored
        })
    }
}
