//! Key-value operational tunables, seeded by the initial migration.

use crate::{storage_err, Storage};
use codeprism_core::CodeprismError;
use rusqlite::{params, OptionalExtension};

pub const AUTO_REINDEX_THRESHOLD: &str = "auto_reindex_threshold";
pub const HYDE_TIMEOUT_MS: &str = "hyde_timeout_ms";
pub const FUSION_KEYWORD_WEIGHT: &str = "fusion_keyword_weight";
pub const FUSION_VECTOR_WEIGHT: &str = "fusion_vector_weight";
pub const FUSION_RRF_K: &str = "fusion_rrf_k";
pub const REPO_CLASSIFY_MIN_CONFIDENCE: &str = "repo_classify_min_confidence";
pub const GRAPH_EXPAND_SEEDS: &str = "graph_expand_seeds";
pub const GRAPH_EXPAND_MAX: &str = "graph_expand_max";

impl Storage {
    /// Read a tunable, falling back to `default` when the key is absent.
    pub fn tuning_f64(&self, key: &str, default: f64) -> Result<f64, CodeprismError> {
        let conn = self.conn()?;
        let value: Option<f64> = conn
            .query_row("SELECT value FROM tuning WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage_err)?;
        Ok(value.unwrap_or(default))
    }

    pub fn set_tuning(&self, key: &str, value: f64) -> Result<(), CodeprismError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tuning (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    /// All tunables, ordered by key.
    pub fn tuning_table(&self) -> Result<Vec<(String, f64)>, CodeprismError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM tuning ORDER BY key")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(storage_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage_err)
    }
}
