//! Strategy selection and score fusion over the FTS and vector indexes.

use crate::fts::{FtsFilter, FtsIndex};
use crate::metrics::{SearchConfigRepository, SearchMetricRepository};
use crate::vector::{VectorFilter, VectorIndex};
use chronicle_types::{ChronicleError, ConversationId, MessageId};
use chronicle_store::ConnectionPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Which retrieval path a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Full-text only.
    Fts,
    /// Vector-similarity only.
    Semantic,
    /// Weighted fusion of both.
    Hybrid,
    /// Let `SearchEngine` pick based on the query shape and index
    /// availability.
    Auto,
}

impl SearchStrategy {
    /// Stable lowercase name, used as the `strategy` value recorded on
    /// `SearchMetric` rows.
    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Fts => "fts",
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Auto => "auto",
        }
    }
}

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Raw query text.
    pub query: String,
    /// Query embedding, required for `Semantic`/`Hybrid`.
    pub query_embedding: Option<Vec<f32>>,
    /// Restrict to one conversation.
    pub conversation_id: Option<ConversationId>,
    /// Requested strategy.
    pub strategy: SearchStrategy,
    /// Maximum results to return.
    pub limit: u32,
}

/// One scored message, win reasons kept for debugging/UI display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMessage {
    /// The matching message.
    pub message_id: MessageId,
    /// Final fused score, higher is better.
    pub score: f64,
    /// Raw FTS bm25 rank, if the FTS path contributed.
    pub fts_rank: Option<f64>,
    /// Raw cosine similarity, if the vector path contributed.
    pub similarity: Option<f32>,
}

/// The full result of one `SearchEngine::search` call.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The strategy actually executed (never `Auto`).
    pub strategy_used: SearchStrategy,
    /// Scored, ordered results.
    pub results: Vec<ScoredMessage>,
    /// Whether the requested strategy had to fall back to another.
    pub fallback_used: bool,
    /// Human-readable reason for the fallback, if any.
    pub fallback_reason: Option<String>,
    /// Wall-clock duration of the call.
    pub duration_ms: u32,
}

/// Fuses the FTS and vector indexes behind one strategy-aware entry
/// point, auto-selecting a strategy and falling back when the
/// requested one can't run, and recording a `SearchMetric` row for
/// every call.
pub struct SearchEngine {
    pool: ConnectionPool,
    fts: FtsIndex,
    vector: Arc<dyn VectorIndex>,
    config: SearchConfigRepository,
    metrics: SearchMetricRepository,
}

impl SearchEngine {
    /// Build an engine over the given pool and vector backend.
    pub fn new(pool: ConnectionPool, vector: Arc<dyn VectorIndex>) -> Self {
        Self {
            fts: FtsIndex::new(pool.clone()),
            config: SearchConfigRepository::new(pool.clone()),
            metrics: SearchMetricRepository::new(pool.clone()),
            vector,
            pool,
        }
    }

    /// Run a search, recording a `SearchMetric` row regardless of
    /// outcome (including the fallback path).
    pub async fn search(&self, request: SearchRequest, now_ms: i64) -> Result<SearchOutcome, ChronicleError> {
        if request.query.trim().is_empty() {
            return Err(ChronicleError::validation_field("query", "must not be blank"));
        }
        let start = Instant::now();
        let resolved = self.resolve_strategy(&request);

        let mut fallback_used = false;
        let mut fallback_reason = None;
        let mut strategy_used = resolved;

        let results = match resolved {
            SearchStrategy::Fts => self.run_fts(&request).await?,
            SearchStrategy::Semantic => {
                if request.query_embedding.is_none() {
                    fallback_used = true;
                    fallback_reason = Some("semantic search requested without a query embedding".to_string());
                    strategy_used = SearchStrategy::Fts;
                    self.run_fts(&request).await?
                } else if !self.vector.is_available() {
                    fallback_used = true;
                    fallback_reason = Some("vector index unavailable".to_string());
                    strategy_used = SearchStrategy::Fts;
                    self.run_fts(&request).await?
                } else {
                    self.run_semantic(&request).await?
                }
            }
            SearchStrategy::Hybrid => {
                if request.query_embedding.is_some() && self.vector.is_available() {
                    self.run_hybrid(&request).await?
                } else {
                    fallback_used = true;
                    fallback_reason = Some(if request.query_embedding.is_none() {
                        "hybrid search requested without a query embedding".to_string()
                    } else {
                        "vector index unavailable".to_string()
                    });
                    strategy_used = SearchStrategy::Fts;
                    self.run_fts(&request).await?
                }
            }
            SearchStrategy::Auto => unreachable!("resolve_strategy never returns Auto"),
        };

        let duration_ms = start.elapsed().as_millis() as u32;
        self.metrics
            .record(request.query.clone(), strategy_used.as_str().to_string(), results.len() as u32, duration_ms, now_ms)
            .await?;

        Ok(SearchOutcome {
            strategy_used,
            results,
            fallback_used,
            fallback_reason,
            duration_ms,
        })
    }

    fn resolve_strategy(&self, request: &SearchRequest) -> SearchStrategy {
        match request.strategy {
            SearchStrategy::Auto => {
                let token_count = request.query.split_whitespace().count();
                let only_punct_or_digits = request
                    .query
                    .chars()
                    .all(|c| c.is_ascii_punctuation() || c.is_ascii_digit() || c.is_whitespace());
                if token_count <= 2 || only_punct_or_digits {
                    SearchStrategy::Fts
                } else if self.vector.is_available() {
                    SearchStrategy::Hybrid
                } else {
                    SearchStrategy::Fts
                }
            }
            other => other,
        }
    }

    async fn run_fts(&self, request: &SearchRequest) -> Result<Vec<ScoredMessage>, ChronicleError> {
        let hits = self
            .fts
            .search(
                &request.query,
                FtsFilter {
                    conversation_id: request.conversation_id.clone(),
                    limit: request.limit,
                },
            )
            .await?;
        let raw_scores: Vec<f64> = hits.iter().map(|h| -h.rank).collect();
        let normalized = normalize(&raw_scores);
        let mut scored: Vec<ScoredMessage> = hits
            .into_iter()
            .zip(normalized)
            .map(|(hit, norm)| ScoredMessage {
                message_id: hit.message_id,
                score: norm,
                fts_rank: Some(hit.rank),
                similarity: None,
            })
            .collect();
        self.order_with_tiebreak(&mut scored).await?;
        Ok(scored)
    }

    async fn run_semantic(&self, request: &SearchRequest) -> Result<Vec<ScoredMessage>, ChronicleError> {
        let embedding = request.query_embedding.as_ref().expect("checked by caller");
        let hits = self
            .vector
            .search(
                embedding,
                request.limit.max(1) as usize,
                VectorFilter {
                    conversation_id: request.conversation_id.clone(),
                },
            )
            .await?;
        let mut scored: Vec<ScoredMessage> = hits
            .into_iter()
            .map(|hit| ScoredMessage {
                message_id: hit.message_id,
                score: hit.similarity as f64,
                fts_rank: None,
                similarity: Some(hit.similarity),
            })
            .collect();
        self.order_with_tiebreak(&mut scored).await?;
        Ok(scored)
    }

    async fn run_hybrid(&self, request: &SearchRequest) -> Result<Vec<ScoredMessage>, ChronicleError> {
        let weights = self.config.hybrid_weights().await?;
        let embedding = request.query_embedding.clone().expect("checked by caller");
        let fan_out = request.limit.saturating_mul(3).max(request.limit).max(20);

        let fts_filter = FtsFilter {
            conversation_id: request.conversation_id.clone(),
            limit: fan_out,
        };
        let vector_filter = VectorFilter {
            conversation_id: request.conversation_id.clone(),
        };
        let (fts_hits, vector_hits) = tokio::join!(
            self.fts.search(&request.query, fts_filter),
            self.vector.search(&embedding, fan_out as usize, vector_filter),
        );
        let fts_hits = fts_hits?;
        let vector_hits = vector_hits?;

        let fts_scores: Vec<f64> = fts_hits.iter().map(|h| -h.rank).collect();
        let fts_norm = normalize(&fts_scores);
        let sem_scores: Vec<f64> = vector_hits.iter().map(|h| h.similarity as f64).collect();
        let sem_norm = normalize(&sem_scores);

        let mut combined: HashMap<MessageId, ScoredMessage> = HashMap::new();
        for (hit, norm) in fts_hits.iter().zip(fts_norm.iter()) {
            combined.insert(
                hit.message_id.clone(),
                ScoredMessage {
                    message_id: hit.message_id.clone(),
                    score: weights.fts * norm,
                    fts_rank: Some(hit.rank),
                    similarity: None,
                },
            );
        }
        for (hit, norm) in vector_hits.iter().zip(sem_norm.iter()) {
            combined
                .entry(hit.message_id.clone())
                .and_modify(|existing| {
                    existing.score += weights.semantic * norm;
                    existing.similarity = Some(hit.similarity);
                })
                .or_insert(ScoredMessage {
                    message_id: hit.message_id.clone(),
                    score: weights.semantic * norm,
                    fts_rank: None,
                    similarity: Some(hit.similarity),
                });
        }

        let mut scored: Vec<ScoredMessage> = combined.into_values().collect();
        self.order_with_tiebreak(&mut scored).await?;
        scored.truncate(request.limit.max(1) as usize);
        Ok(scored)
    }

    /// Sort by score descending, then by message `created_at`
    /// descending, then by message id ascending.
    async fn order_with_tiebreak(&self, scored: &mut Vec<ScoredMessage>) -> Result<(), ChronicleError> {
        if scored.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = scored.iter().map(|s| s.message_id.as_str().to_string()).collect();
        let created_at = self.created_at_for(ids).await?;
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ca = created_at.get(a.message_id.as_str()).copied().unwrap_or(0);
                    let cb = created_at.get(b.message_id.as_str()).copied().unwrap_or(0);
                    cb.cmp(&ca)
                })
                .then_with(|| a.message_id.as_str().cmp(b.message_id.as_str()))
        });
        Ok(())
    }

    async fn created_at_for(&self, ids: Vec<String>) -> Result<HashMap<String, i64>, ChronicleError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!("SELECT id, created_at FROM messages WHERE id IN ({placeholders})");
                let mut stmt = conn.prepare(&sql)?;
                let params = rusqlite::params_from_iter(ids.iter());
                let rows = stmt.query_map(params, |row| {
                    let id: String = row.get(0)?;
                    let created_at: i64 = row.get(1)?;
                    Ok((id, created_at))
                })?;
                let mut out = HashMap::new();
                for row in rows {
                    let (id, created_at) = row?;
                    out.insert(id, created_at);
                }
                Ok(out)
            })
            .await
    }
}

fn normalize(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return scores.iter().map(|_| 1.0).collect();
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_handles_constant_scores() {
        assert_eq!(normalize(&[2.0, 2.0, 2.0]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn normalize_scales_to_unit_interval() {
        let out = normalize(&[0.0, 5.0, 10.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert!(normalize(&[]).is_empty());
    }
}
