//! `SummaryRepository`.

use crate::util::json_to_text;
use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{ChronicleError, ConversationId, ConversationSummary, MessageId, SummaryId, SummaryLevel};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Typed access to the `conversation_summaries` table.
pub struct SummaryRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl SummaryRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<ConversationSummary> {
        let id: String = row.get("id")?;
        let conversation_id: String = row.get("conversation_id")?;
        let level_text: String = row.get("level")?;
        let start: Option<String> = row.get("start_message_id")?;
        let end: Option<String> = row.get("end_message_id")?;
        Ok(ConversationSummary {
            id: SummaryId::new(id),
            conversation_id: ConversationId::new(conversation_id),
            level: SummaryLevel::parse(&level_text).unwrap_or(SummaryLevel::Brief),
            text: row.get("text")?,
            token_count: row.get("token_count")?,
            provider: row.get("provider")?,
            model: row.get("model")?,
            generated_at: row.get("generated_at")?,
            message_count: row.get("message_count")?,
            start_message_id: start.map(MessageId::new),
            end_message_id: end.map(MessageId::new),
        })
    }

    /// Insert a new summary. Superseded summaries for the same
    /// `(conversation_id, level)` are retained, not overwritten; readers
    /// pick the most recent by `generated_at` via [`Self::latest_for`].
    pub async fn upsert(&self, mut summary: ConversationSummary) -> Result<ConversationSummary, ChronicleError> {
        if summary.message_count > 1 && summary.start_message_id == summary.end_message_id {
            return Err(ChronicleError::validation_field(
                "end_message_id",
                "must differ from start_message_id when message_count > 1",
            ));
        }
        if summary.id.as_str().is_empty() {
            summary.id = SummaryId::generate();
        }

        let to_insert = summary.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO conversation_summaries
                            (id, conversation_id, level, text, token_count, provider, model, generated_at,
                             message_count, start_message_id, end_message_id)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            to_insert.id.as_str(),
                            to_insert.conversation_id.as_str(),
                            to_insert.level.as_str(),
                            to_insert.text,
                            to_insert.token_count,
                            to_insert.provider,
                            to_insert.model,
                            to_insert.generated_at,
                            to_insert.message_count,
                            to_insert.start_message_id.as_ref().map(|m| m.as_str()),
                            to_insert.end_message_id.as_ref().map(|m| m.as_str()),
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("summaries").await;
        Ok(summary)
    }

    /// Most recently generated summary for a conversation at a given
    /// level, if any exists.
    pub async fn latest_for(
        &self,
        conversation_id: &ConversationId,
        level: SummaryLevel,
    ) -> Result<Option<ConversationSummary>, ChronicleError> {
        let conversation_id = conversation_id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, conversation_id, level, text, token_count, provider, model, generated_at,
                                message_count, start_message_id, end_message_id
                         FROM conversation_summaries
                         WHERE conversation_id = ?1 AND level = ?2
                         ORDER BY generated_at DESC LIMIT 1",
                        params![conversation_id.as_str(), level.as_str()],
                        Self::row_to_summary,
                    )
                    .optional()
                    .map_err(from_rusqlite)
            })
            .await
    }

    /// Every summary recorded for a conversation, newest first.
    pub async fn list_for(&self, conversation_id: &ConversationId) -> Result<Vec<ConversationSummary>, ChronicleError> {
        let conversation_id = conversation_id.clone();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, conversation_id, level, text, token_count, provider, model, generated_at,
                                message_count, start_message_id, end_message_id
                         FROM conversation_summaries WHERE conversation_id = ?1 ORDER BY generated_at DESC",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map(params![conversation_id.as_str()], Self::row_to_summary)
                    .map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }

    /// Record or refresh a `summary_cache` row for an assembled-context
    /// cache key (used by `chronicle-context`).
    pub async fn put_summary_cache(
        &self,
        cache_key: &str,
        summary_ids: &[SummaryId],
        assembled_context: &str,
        token_count: u32,
        now: i64,
    ) -> Result<(), ChronicleError> {
        let cache_key = cache_key.to_string();
        let summary_ids_json = json_to_text(&serde_json::json!(summary_ids.iter().map(|s| s.as_str()).collect::<Vec<_>>()));
        let assembled_context = assembled_context.to_string();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO summary_cache (cache_key, summary_ids, assembled_context, token_count, created_at, accessed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                         ON CONFLICT(cache_key) DO UPDATE SET
                            summary_ids = excluded.summary_ids,
                            assembled_context = excluded.assembled_context,
                            token_count = excluded.token_count,
                            accessed_at = excluded.accessed_at",
                        params![cache_key, summary_ids_json, assembled_context, token_count, now],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        Ok(())
    }

    /// Fetch a cached assembled context, if present, touching its
    /// `accessed_at`.
    pub async fn get_summary_cache(&self, cache_key: &str, now: i64) -> Result<Option<String>, ChronicleError> {
        let key = cache_key.to_string();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let found: Option<String> = conn
                    .query_row(
                        "SELECT assembled_context FROM summary_cache WHERE cache_key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(from_rusqlite)?;
                if found.is_some() {
                    conn.execute(
                        "UPDATE summary_cache SET accessed_at = ?1 WHERE cache_key = ?2",
                        params![now, key],
                    )
                    .map_err(from_rusqlite)?;
                }
                Ok(found)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationRepository;
    use crate::message::blank_conversation;

    #[tokio::test]
    async fn upsert_then_latest_for_round_trips() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let convs = ConversationRepository::new(pool.clone(), cache.clone());
        let summaries = SummaryRepository::new(pool, cache);
        convs.create(blank_conversation("c1", 1)).await.unwrap();

        let summary = ConversationSummary {
            id: SummaryId::new(""),
            conversation_id: ConversationId::new("c1"),
            level: SummaryLevel::Brief,
            text: "a brief summary".into(),
            token_count: 12,
            provider: "builtin".into(),
            model: "builtin-summarize-v1".into(),
            generated_at: 100,
            message_count: 1,
            start_message_id: None,
            end_message_id: None,
        };
        summaries.upsert(summary).await.unwrap();

        let latest = summaries
            .latest_for(&ConversationId::new("c1"), SummaryLevel::Brief)
            .await
            .unwrap();
        assert!(latest.is_some());
        assert_eq!(latest.unwrap().text, "a brief summary");
    }

    #[tokio::test]
    async fn message_count_gt_one_requires_distinct_bounds() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let summaries = SummaryRepository::new(pool, cache);
        let same = MessageId::new("m1");
        let summary = ConversationSummary {
            id: SummaryId::new(""),
            conversation_id: ConversationId::new("c1"),
            level: SummaryLevel::Standard,
            text: "x".into(),
            token_count: 1,
            provider: "p".into(),
            model: "m".into(),
            generated_at: 1,
            message_count: 2,
            start_message_id: Some(same.clone()),
            end_message_id: Some(same),
        };
        assert!(summaries.upsert(summary).await.is_err());
    }
}
