//! Analytics repositories: thin CRUD plus
//! windowed time-range queries over the six analytics tables.
//!
//! These tables back the analytics/insight tools
//! (`get_conversation_analytics`, `analyze_productivity_patterns`,
//! `detect_knowledge_gaps`, `track_decision_effectiveness`,
//! `generate_analytics_report`) but hold no analysis logic themselves —
//! the scoring/detection lives in the tool layer and callers, these
//! repositories just persist results.

use chronicle_store::{from_rusqlite, ConnectionPool};
use chronicle_types::{
    ChronicleError, ConversationAnalytics, ConversationId, DecisionRecord, Insight, KnowledgeGap,
    ProductivityPattern, TopicEvolution,
};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Typed access to the `conversation_analytics` table.
pub struct ConversationAnalyticsRepository {
    pool: ConnectionPool,
}

impl ConversationAnalyticsRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<ConversationAnalytics> {
        Ok(ConversationAnalytics {
            id: row.get("id")?,
            conversation_id: ConversationId::new(row.get::<_, String>("conversation_id")?),
            engagement_score: row.get("engagement_score")?,
            depth_score: row.get("depth_score")?,
            message_count: row.get("message_count")?,
            computed_at: row.get("computed_at")?,
        })
    }

    /// Record a freshly computed analytics snapshot.
    pub async fn record(&self, mut snapshot: ConversationAnalytics) -> Result<ConversationAnalytics, ChronicleError> {
        if snapshot.id.is_empty() {
            snapshot.id = new_id();
        }
        let to_insert = snapshot.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO conversation_analytics (id, conversation_id, engagement_score, depth_score, message_count, computed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            to_insert.id,
                            to_insert.conversation_id.as_str(),
                            to_insert.engagement_score,
                            to_insert.depth_score,
                            to_insert.message_count,
                            to_insert.computed_at,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(snapshot)
    }

    /// Most recent snapshots for a conversation, newest first.
    pub async fn history_for(&self, conversation_id: &ConversationId, limit: u32) -> Result<Vec<ConversationAnalytics>, ChronicleError> {
        let conversation_id = conversation_id.clone();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, conversation_id, engagement_score, depth_score, message_count, computed_at
                         FROM conversation_analytics WHERE conversation_id = ?1 ORDER BY computed_at DESC LIMIT ?2",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map(params![conversation_id.as_str(), limit], Self::row_to).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }
}

/// Typed access to the `productivity_patterns` table.
pub struct ProductivityPatternRepository {
    pool: ConnectionPool,
}

impl ProductivityPatternRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<ProductivityPattern> {
        let metadata_text: String = row.get("metadata")?;
        Ok(ProductivityPattern {
            id: row.get("id")?,
            window_start: row.get("window_start")?,
            window_end: row.get("window_end")?,
            productivity_score: row.get("productivity_score")?,
            decision_count: row.get("decision_count")?,
            metadata: crate::util::json_from_text(&metadata_text),
        })
    }

    /// Record a scored productivity window.
    pub async fn record(&self, mut pattern: ProductivityPattern) -> Result<ProductivityPattern, ChronicleError> {
        if pattern.window_end <= pattern.window_start {
            return Err(ChronicleError::validation_field("window_end", "must be greater than window_start"));
        }
        if pattern.id.is_empty() {
            pattern.id = new_id();
        }
        let metadata_text = crate::util::json_to_text(&pattern.metadata);
        let to_insert = pattern.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO productivity_patterns (id, window_start, window_end, productivity_score, decision_count, metadata)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            to_insert.id,
                            to_insert.window_start,
                            to_insert.window_end,
                            to_insert.productivity_score,
                            to_insert.decision_count,
                            metadata_text,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(pattern)
    }

    /// Windows overlapping `[start, end)`, ordered chronologically.
    pub async fn find_overlapping(&self, start: i64, end: i64) -> Result<Vec<ProductivityPattern>, ChronicleError> {
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, window_start, window_end, productivity_score, decision_count, metadata
                         FROM productivity_patterns WHERE window_start < ?2 AND window_end > ?1 ORDER BY window_start",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map(params![start, end], Self::row_to).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }
}

/// Typed access to the `knowledge_gaps` table.
pub struct KnowledgeGapRepository {
    pool: ConnectionPool,
}

impl KnowledgeGapRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<KnowledgeGap> {
        let resolution_conversation_id: Option<String> = row.get("resolution_conversation_id")?;
        Ok(KnowledgeGap {
            id: row.get("id")?,
            topic: row.get("topic")?,
            frequency: row.get("frequency")?,
            first_observed_at: row.get("first_observed_at")?,
            last_observed_at: row.get("last_observed_at")?,
            resolved: row.get::<_, i64>("resolved")? != 0,
            resolution_date: row.get("resolution_date")?,
            resolution_conversation_id: resolution_conversation_id.map(ConversationId::new),
        })
    }

    /// Record a newly observed (or re-observed) recurring gap.
    pub async fn upsert(&self, mut gap: KnowledgeGap) -> Result<KnowledgeGap, ChronicleError> {
        if gap.resolved && (gap.resolution_date.is_none() || gap.resolution_conversation_id.is_none()) {
            return Err(ChronicleError::validation_field(
                "resolution_date",
                "resolved knowledge gaps require both resolution_date and resolution_conversation_id",
            ));
        }
        if gap.id.is_empty() {
            gap.id = new_id();
        }
        let to_insert = gap.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO knowledge_gaps
                            (id, topic, frequency, first_observed_at, last_observed_at, resolved, resolution_date, resolution_conversation_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            to_insert.id,
                            to_insert.topic,
                            to_insert.frequency,
                            to_insert.first_observed_at,
                            to_insert.last_observed_at,
                            to_insert.resolved as i64,
                            to_insert.resolution_date,
                            to_insert.resolution_conversation_id.as_ref().map(|c| c.as_str()),
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(gap)
    }

    /// Unresolved gaps, most frequent first.
    pub async fn find_unresolved(&self, limit: u32) -> Result<Vec<KnowledgeGap>, ChronicleError> {
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, topic, frequency, first_observed_at, last_observed_at, resolved, resolution_date, resolution_conversation_id
                         FROM knowledge_gaps WHERE resolved = 0 ORDER BY frequency DESC LIMIT ?1",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map(params![limit], Self::row_to).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }

    /// Mark a gap resolved.
    pub async fn resolve(&self, id: &str, resolution_date: i64, resolution_conversation_id: &ConversationId) -> Result<(), ChronicleError> {
        let id = id.to_string();
        let resolution_conversation_id = resolution_conversation_id.clone();
        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE knowledge_gaps SET resolved = 1, resolution_date = ?1, resolution_conversation_id = ?2 WHERE id = ?3",
                        params![resolution_date, resolution_conversation_id.as_str(), id],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        if affected == 0 {
            return Err(ChronicleError::NotFound(format!("knowledge gap {id} not found")));
        }
        Ok(())
    }
}

/// Typed access to the `decision_tracking` table.
pub struct DecisionTrackingRepository {
    pool: ConnectionPool,
}

impl DecisionTrackingRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<DecisionRecord> {
        let options_text: String = row.get("options_considered")?;
        Ok(DecisionRecord {
            id: row.get("id")?,
            conversation_id: ConversationId::new(row.get::<_, String>("conversation_id")?),
            description: row.get("description")?,
            problem_identified_at: row.get("problem_identified_at")?,
            decision_made_at: row.get("decision_made_at")?,
            options_considered: serde_json::from_str(&options_text).unwrap_or_default(),
            implemented_at: row.get("implemented_at")?,
            outcome_observed_at: row.get("outcome_observed_at")?,
            effectiveness_score: row.get("effectiveness_score")?,
        })
    }

    /// Begin tracking a decision (problem → decision; implementation and
    /// outcome follow via [`Self::mark_implemented`] / [`Self::mark_outcome_observed`]).
    pub async fn create(&self, mut record: DecisionRecord) -> Result<DecisionRecord, ChronicleError> {
        if record.decision_made_at < record.problem_identified_at {
            return Err(ChronicleError::validation_field("decision_made_at", "must not precede problem_identified_at"));
        }
        if record.id.is_empty() {
            record.id = new_id();
        }
        let options_text = serde_json::to_string(&record.options_considered).unwrap_or_else(|_| "[]".to_string());
        let to_insert = record.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO decision_tracking
                            (id, conversation_id, description, problem_identified_at, decision_made_at, options_considered)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            to_insert.id,
                            to_insert.conversation_id.as_str(),
                            to_insert.description,
                            to_insert.problem_identified_at,
                            to_insert.decision_made_at,
                            options_text,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(record)
    }

    /// Record that a decision was acted on.
    pub async fn mark_implemented(&self, id: &str, at_ms: i64) -> Result<(), ChronicleError> {
        let id = id.to_string();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute("UPDATE decision_tracking SET implemented_at = ?1 WHERE id = ?2", params![at_ms, id])
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(())
    }

    /// Record the observed outcome and its effectiveness score.
    pub async fn mark_outcome_observed(&self, id: &str, at_ms: i64, effectiveness_score: f64) -> Result<(), ChronicleError> {
        if !(0.0..=100.0).contains(&effectiveness_score) {
            return Err(ChronicleError::validation_field("effectiveness_score", "must be between 0 and 100"));
        }
        let id = id.to_string();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE decision_tracking SET outcome_observed_at = ?1, effectiveness_score = ?2 WHERE id = ?3",
                        params![at_ms, effectiveness_score, id],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(())
    }

    /// Decisions recorded for a conversation, most recent first.
    pub async fn list_for(&self, conversation_id: &ConversationId) -> Result<Vec<DecisionRecord>, ChronicleError> {
        let conversation_id = conversation_id.clone();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, conversation_id, description, problem_identified_at, decision_made_at,
                                options_considered, implemented_at, outcome_observed_at, effectiveness_score
                         FROM decision_tracking WHERE conversation_id = ?1 ORDER BY decision_made_at DESC",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map(params![conversation_id.as_str()], Self::row_to).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }
}

/// Typed access to the `insights` table.
pub struct InsightRepository {
    pool: ConnectionPool,
}

impl InsightRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<Insight> {
        let conversation_id: Option<String> = row.get("conversation_id")?;
        Ok(Insight {
            id: row.get("id")?,
            conversation_id: conversation_id.map(ConversationId::new),
            category: row.get("category")?,
            text: row.get("text")?,
            confidence: row.get("confidence")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Persist a proactively surfaced insight.
    pub async fn create(&self, mut insight: Insight) -> Result<Insight, ChronicleError> {
        if !(0.0..=1.0).contains(&insight.confidence) {
            return Err(ChronicleError::validation_field("confidence", "must be between 0 and 1"));
        }
        if insight.id.is_empty() {
            insight.id = new_id();
        }
        let to_insert = insight.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO insights (id, conversation_id, category, text, confidence, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            to_insert.id,
                            to_insert.conversation_id.as_ref().map(|c| c.as_str()),
                            to_insert.category,
                            to_insert.text,
                            to_insert.confidence,
                            to_insert.created_at,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(insight)
    }

    /// Insights for a conversation (or corpus-wide if `conversation_id`
    /// is `None`), most recent first.
    pub async fn list_for(&self, conversation_id: Option<&ConversationId>, limit: u32) -> Result<Vec<Insight>, ChronicleError> {
        let conversation_id = conversation_id.cloned();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                match conversation_id {
                    Some(cid) => {
                        let mut stmt = conn
                            .prepare(
                                "SELECT id, conversation_id, category, text, confidence, created_at
                                 FROM insights WHERE conversation_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                            )
                            .map_err(from_rusqlite)?;
                        let rows = stmt.query_map(params![cid.as_str(), limit], Self::row_to).map_err(from_rusqlite)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                    }
                    None => {
                        let mut stmt = conn
                            .prepare("SELECT id, conversation_id, category, text, confidence, created_at FROM insights ORDER BY created_at DESC LIMIT ?1")
                            .map_err(from_rusqlite)?;
                        let rows = stmt.query_map(params![limit], Self::row_to).map_err(from_rusqlite)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                    }
                }
            })
            .await
    }
}

/// Typed access to the `topic_evolution` table.
pub struct TopicEvolutionRepository {
    pool: ConnectionPool,
}

impl TopicEvolutionRepository {
    /// Build a repository over a shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn row_to(row: &Row<'_>) -> rusqlite::Result<TopicEvolution> {
        Ok(TopicEvolution {
            id: row.get("id")?,
            topic: row.get("topic")?,
            first_occurred_at: row.get("first_occurred_at")?,
            last_occurred_at: row.get("last_occurred_at")?,
            occurrence_count: row.get("occurrence_count")?,
            circularity: row.get("circularity")?,
        })
    }

    /// Record or refresh a topic's evolution entry, keyed by topic text.
    pub async fn upsert(&self, topic: &str, at_ms: i64, circularity: Option<f64>) -> Result<TopicEvolution, ChronicleError> {
        let topic = topic.to_string();
        let id = new_id();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let existing: Option<String> = conn
                    .query_row("SELECT id FROM topic_evolution WHERE topic = ?1", params![topic], |row| row.get(0))
                    .optional()
                    .map_err(from_rusqlite)?;
                match existing {
                    Some(existing_id) => {
                        conn.execute(
                            "UPDATE topic_evolution SET last_occurred_at = MAX(last_occurred_at, ?1), occurrence_count = occurrence_count + 1, circularity = ?2 WHERE id = ?3",
                            params![at_ms, circularity, existing_id],
                        )
                        .map_err(from_rusqlite)?;
                        conn.query_row(
                            "SELECT id, topic, first_occurred_at, last_occurred_at, occurrence_count, circularity FROM topic_evolution WHERE id = ?1",
                            params![existing_id],
                            Self::row_to,
                        )
                        .map_err(from_rusqlite)
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO topic_evolution (id, topic, first_occurred_at, last_occurred_at, occurrence_count, circularity)
                             VALUES (?1, ?2, ?3, ?3, 1, ?4)",
                            params![id, topic, at_ms, circularity],
                        )
                        .map_err(from_rusqlite)?;
                        conn.query_row(
                            "SELECT id, topic, first_occurred_at, last_occurred_at, occurrence_count, circularity FROM topic_evolution WHERE id = ?1",
                            params![id],
                            Self::row_to,
                        )
                        .map_err(from_rusqlite)
                    }
                }
            })
            .await
    }

    /// Topics with the highest circularity score, descending.
    pub async fn most_circular(&self, limit: u32) -> Result<Vec<TopicEvolution>, ChronicleError> {
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, topic, first_occurred_at, last_occurred_at, occurrence_count, circularity
                         FROM topic_evolution WHERE circularity IS NOT NULL ORDER BY circularity DESC LIMIT ?1",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt.query_map(params![limit], Self::row_to).map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversation_analytics_round_trips() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        pool.with_connection(None, |store| {
            store.conn().execute(
                "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES ('c1', 1, 1, NULL, '{}')",
                [],
            )
            .map_err(from_rusqlite)
        })
        .await
        .unwrap();

        let repo = ConversationAnalyticsRepository::new(pool);
        repo.record(ConversationAnalytics {
            id: String::new(),
            conversation_id: ConversationId::new("c1"),
            engagement_score: Some(70.0),
            depth_score: Some(55.0),
            message_count: 12,
            computed_at: 100,
        })
        .await
        .unwrap();

        let history = repo.history_for(&ConversationId::new("c1"), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].engagement_score, Some(70.0));
    }

    #[tokio::test]
    async fn productivity_window_end_before_start_is_rejected() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let repo = ProductivityPatternRepository::new(pool);
        let bad = ProductivityPattern {
            id: String::new(),
            window_start: 100,
            window_end: 50,
            productivity_score: None,
            decision_count: 0,
            metadata: serde_json::json!({}),
        };
        assert!(repo.record(bad).await.is_err());
    }

    #[tokio::test]
    async fn knowledge_gap_resolved_requires_both_fields() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let repo = KnowledgeGapRepository::new(pool);
        let bad = KnowledgeGap {
            id: String::new(),
            topic: "rust lifetimes".into(),
            frequency: 3,
            first_observed_at: 1,
            last_observed_at: 10,
            resolved: true,
            resolution_date: None,
            resolution_conversation_id: None,
        };
        assert!(repo.upsert(bad).await.is_err());
    }

    #[tokio::test]
    async fn topic_evolution_upsert_tracks_occurrence_count() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let repo = TopicEvolutionRepository::new(pool);
        repo.upsert("rust async", 1, None).await.unwrap();
        let second = repo.upsert("rust async", 10, Some(0.4)).await.unwrap();
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.last_occurred_at, 10);
    }

    #[tokio::test]
    async fn decision_tracking_rejects_decision_before_problem() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        pool.with_connection(None, |store| {
            store.conn().execute(
                "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES ('c1', 1, 1, NULL, '{}')",
                [],
            )
            .map_err(from_rusqlite)
        })
        .await
        .unwrap();
        let repo = DecisionTrackingRepository::new(pool);
        let bad = DecisionRecord {
            id: String::new(),
            conversation_id: ConversationId::new("c1"),
            description: "switch databases".into(),
            problem_identified_at: 100,
            decision_made_at: 50,
            options_considered: vec!["postgres".into(), "sqlite".into()],
            implemented_at: None,
            outcome_observed_at: None,
            effectiveness_score: None,
        };
        assert!(repo.create(bad).await.is_err());
    }
}
