//! Hybrid-weight configuration and per-call search metrics, backed by
//! the `search_config` and `search_metrics` tables.

use chronicle_store::ConnectionPool;
use chronicle_types::{ChronicleError, SearchMetric};
use uuid::Uuid;

/// Weights used to fuse FTS and semantic scores in a hybrid search.
/// Read from `search_config`, falling back to the seeded defaults
/// (`0.6` semantic / `0.4` fts) if a row is missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    /// Weight applied to the normalized semantic (cosine) score.
    pub semantic: f64,
    /// Weight applied to the normalized FTS score.
    pub fts: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            fts: 0.4,
        }
    }
}

/// Reads tunables from `search_config`.
pub struct SearchConfigRepository {
    pool: ConnectionPool,
}

impl SearchConfigRepository {
    /// Build a repository over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Load the current hybrid fusion weights.
    pub async fn hybrid_weights(&self) -> Result<HybridWeights, ChronicleError> {
        self.pool
            .with_connection(None, |store| {
                let conn = store.conn();
                let semantic: Option<String> = conn
                    .query_row(
                        "SELECT value FROM search_config WHERE key = 'hybrid_weight_semantic'",
                        [],
                        |row| row.get(0),
                    )
                    .ok();
                let fts: Option<String> = conn
                    .query_row(
                        "SELECT value FROM search_config WHERE key = 'hybrid_weight_fts'",
                        [],
                        |row| row.get(0),
                    )
                    .ok();
                let defaults = HybridWeights::default();
                Ok(HybridWeights {
                    semantic: semantic.and_then(|v| v.parse().ok()).unwrap_or(defaults.semantic),
                    fts: fts.and_then(|v| v.parse().ok()).unwrap_or(defaults.fts),
                })
            })
            .await
    }

    /// Override the hybrid fusion weights.
    pub async fn set_hybrid_weights(&self, weights: HybridWeights) -> Result<(), ChronicleError> {
        if !weights.semantic.is_finite() || !weights.fts.is_finite() {
            return Err(ChronicleError::validation_field("weights", "must be finite"));
        }
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                conn.execute(
                    "INSERT INTO search_config (key, value) VALUES ('hybrid_weight_semantic', ?1) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![weights.semantic.to_string()],
                )?;
                conn.execute(
                    "INSERT INTO search_config (key, value) VALUES ('hybrid_weight_fts', ?1) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![weights.fts.to_string()],
                )?;
                Ok(())
            })
            .await
    }
}

/// Appends one row to `search_metrics` per `SearchEngine` call: every
/// `SearchEngine::search` call records a `SearchMetric` row.
pub struct SearchMetricRepository {
    pool: ConnectionPool,
}

impl SearchMetricRepository {
    /// Build a repository over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Record one completed search call.
    pub async fn record(
        &self,
        query_text: String,
        strategy: String,
        result_count: u32,
        duration_ms: u32,
        timestamp: i64,
    ) -> Result<SearchMetric, ChronicleError> {
        let metric = SearchMetric {
            id: Uuid::new_v4().to_string(),
            query_text,
            strategy,
            result_count,
            duration_ms,
            timestamp,
        };
        let row = metric.clone();
        self.pool
            .with_connection(None, move |store| {
                store.conn().execute(
                    "INSERT INTO search_metrics (id, query_text, strategy, result_count, duration_ms, timestamp) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![row.id, row.query_text, row.strategy, row.result_count, row.duration_ms, row.timestamp],
                )?;
                Ok(())
            })
            .await?;
        Ok(metric)
    }

    /// Recent metrics, most recent first, for health/observability tools.
    pub async fn recent(&self, limit: u32) -> Result<Vec<SearchMetric>, ChronicleError> {
        let limit = limit.max(1) as i64;
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn.prepare(
                    "SELECT id, query_text, strategy, result_count, duration_ms, timestamp \
                     FROM search_metrics ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit], |row| {
                    Ok(SearchMetric {
                        id: row.get(0)?,
                        query_text: row.get(1)?,
                        strategy: row.get(2)?,
                        result_count: row.get(3)?,
                        duration_ms: row.get(4)?,
                        timestamp: row.get(5)?,
                    })
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }
}
