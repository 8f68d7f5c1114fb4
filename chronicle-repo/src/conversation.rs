//! `ConversationRepository`.

use crate::util::{json_from_text, json_to_text, now_millis};
use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{validation, ChronicleError, Conversation, ConversationId, Paginated};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value as Json;
use std::sync::Arc;
use std::time::Instant;

/// Ordering for [`ConversationRepository::find_all`].
#[derive(Debug, Clone, Copy)]
pub enum OrderBy {
    /// Order by `created_at`.
    CreatedAt,
    /// Order by `updated_at`.
    UpdatedAt,
}

/// Ascending or descending.
#[derive(Debug, Clone, Copy)]
pub enum Direction {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// Typed access to the `conversations` table.
pub struct ConversationRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl ConversationRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        let id: String = row.get("id")?;
        let metadata_text: String = row.get("metadata")?;
        Ok(Conversation {
            id: ConversationId::new(id),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            title: row.get("title")?,
            metadata: json_from_text(&metadata_text),
            deleted_at: row.get("deleted_at")?,
        })
    }

    /// Insert a new conversation. Generates an id if the caller didn't
    /// supply one.
    pub async fn create(&self, mut conversation: Conversation) -> Result<Conversation, ChronicleError> {
        validation::validate_title(conversation.title.as_deref())?;
        validation::validate_metadata(&conversation.metadata)?;
        if conversation.id.as_str().is_empty() {
            conversation.id = ConversationId::generate();
        }
        if conversation.created_at > conversation.updated_at {
            return Err(ChronicleError::validation_field(
                "updated_at",
                "must be >= created_at",
            ));
        }

        let metadata_text = json_to_text(&conversation.metadata);
        let to_insert = conversation.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO conversations (id, created_at, updated_at, title, metadata, deleted_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                        params![
                            to_insert.id.as_str(),
                            to_insert.created_at,
                            to_insert.updated_at,
                            to_insert.title,
                            metadata_text,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("conversations").await;
        Ok(conversation)
    }

    /// Fetch a conversation by id.
    pub async fn find_by_id(&self, id: &ConversationId) -> Result<Conversation, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, created_at, updated_at, title, metadata, deleted_at FROM conversations WHERE id = ?1",
                        params![id.as_str()],
                        Self::row_to_conversation,
                    )
                    .optional()
                    .map_err(from_rusqlite)?
                    .ok_or_else(|| ChronicleError::NotFound(format!("conversation {id} not found")))
            })
            .await
    }

    /// List conversations within `[start, end]` inclusive of both bounds,
    /// newest first within the page, paginated.
    pub async fn find_by_date_range(
        &self,
        start: i64,
        end: i64,
        limit: u32,
        offset: u64,
    ) -> Result<Paginated<Conversation>, ChronicleError> {
        validation::validate_time_range(Some(start), Some(end))?;
        validation::validate_pagination(limit, 500)?;

        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let total: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM conversations WHERE created_at BETWEEN ?1 AND ?2 AND deleted_at IS NULL",
                        params![start, end],
                        |row| row.get(0),
                    )
                    .map_err(from_rusqlite)?;

                let mut stmt = conn
                    .prepare(
                        "SELECT id, created_at, updated_at, title, metadata, deleted_at
                         FROM conversations
                         WHERE created_at BETWEEN ?1 AND ?2 AND deleted_at IS NULL
                         ORDER BY created_at DESC
                         LIMIT ?3 OFFSET ?4",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map(params![start, end, limit, offset as i64], Self::row_to_conversation)
                    .map_err(from_rusqlite)?;
                let items = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)?;
                Ok(Paginated::new(items, total.max(0) as u64, limit, offset))
            })
            .await
    }

    /// List all conversations, paginated and ordered.
    pub async fn find_all(
        &self,
        limit: u32,
        offset: u64,
        order_by: OrderBy,
        dir: Direction,
    ) -> Result<Paginated<Conversation>, ChronicleError> {
        validation::validate_pagination(limit, 500)?;

        let order_col = match order_by {
            OrderBy::CreatedAt => "created_at",
            OrderBy::UpdatedAt => "updated_at",
        };
        let order_dir = match dir {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let sql = format!(
            "SELECT id, created_at, updated_at, title, metadata, deleted_at
             FROM conversations WHERE deleted_at IS NULL
             ORDER BY {order_col} {order_dir} LIMIT ?1 OFFSET ?2"
        );

        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let total: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM conversations WHERE deleted_at IS NULL",
                        [],
                        |row| row.get(0),
                    )
                    .map_err(from_rusqlite)?;
                let mut stmt = conn.prepare(&sql).map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map(params![limit, offset as i64], Self::row_to_conversation)
                    .map_err(from_rusqlite)?;
                let items = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)?;
                Ok(Paginated::new(items, total.max(0) as u64, limit, offset))
            })
            .await
    }

    /// Replace a conversation's metadata and bump `updated_at`.
    pub async fn update_metadata(&self, id: &ConversationId, metadata: Json) -> Result<(), ChronicleError> {
        validation::validate_metadata(&metadata)?;
        let id = id.clone();
        let metadata_text = json_to_text(&metadata);
        let now = now_millis();

        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE conversations SET metadata = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
                        params![metadata_text, now, id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        if affected == 0 {
            return Err(ChronicleError::NotFound(format!("conversation {id} not found")));
        }
        self.cache.invalidate("conversations").await;
        Ok(())
    }

    /// Delete a conversation. Soft delete marks `deleted_at` and retains
    /// all rows; a permanent delete cascades to messages and summaries
    /// via `ON DELETE CASCADE` and orphans entity mentions (the
    /// `entity_mentions` row referencing a deleted message is removed by
    /// its own cascade; the `Entity` itself survives if other mentions
    /// remain).
    pub async fn delete(&self, id: &ConversationId, permanent: bool) -> Result<(), ChronicleError> {
        let id = id.clone();
        let now = now_millis();

        let affected = self
            .pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                if permanent {
                    conn.execute("DELETE FROM conversations WHERE id = ?1", params![id.as_str()])
                        .map_err(from_rusqlite)
                } else {
                    conn.execute(
                        "UPDATE conversations SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                        params![now, id.as_str()],
                    )
                    .map_err(from_rusqlite)
                }
            })
            .await?;

        if affected == 0 {
            return Err(ChronicleError::NotFound(format!("conversation {id} not found")));
        }
        self.cache.invalidate("conversations").await;
        self.cache.invalidate("messages").await;
        Ok(())
    }

    /// Bump `updated_at` to at least `message_created_at`, called after a
    /// message is written so the invariant `updated_at >= child
    /// created_at` holds.
    pub async fn touch(&self, id: &ConversationId, message_created_at: i64) -> Result<(), ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE conversations SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
                        params![message_created_at, id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        self.cache.invalidate("conversations").await;
        Ok(())
    }

    /// Deadline-bounded variant of [`Self::find_by_id`], for callers that
    /// carry a request deadline through to the pool.
    pub async fn find_by_id_before(
        &self,
        id: &ConversationId,
        deadline: Instant,
    ) -> Result<Conversation, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(Some(deadline), move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, created_at, updated_at, title, metadata, deleted_at FROM conversations WHERE id = ?1",
                        params![id.as_str()],
                        Self::row_to_conversation,
                    )
                    .optional()
                    .map_err(from_rusqlite)?
                    .ok_or_else(|| ChronicleError::NotFound(format!("conversation {id} not found")))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> ConversationRepository {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        ConversationRepository::new(pool, Arc::new(QueryCache::new()))
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = repo();
        let conv = Conversation {
            id: ConversationId::new(""),
            created_at: 1000,
            updated_at: 1000,
            title: Some("hello".into()),
            metadata: json!({}),
            deleted_at: None,
        };
        let created = repo.create(conv).await.unwrap();
        let found = repo.find_by_id(&created.id).await.unwrap();
        assert_eq!(found.title.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn created_at_after_updated_at_is_rejected() {
        let repo = repo();
        let conv = Conversation {
            id: ConversationId::new(""),
            created_at: 2000,
            updated_at: 1000,
            title: None,
            metadata: json!({}),
            deleted_at: None,
        };
        assert!(repo.create(conv).await.is_err());
    }

    #[tokio::test]
    async fn soft_delete_keeps_row_but_hides_from_find_all() {
        let repo = repo();
        let conv = repo
            .create(Conversation {
                id: ConversationId::new(""),
                created_at: 1,
                updated_at: 1,
                title: None,
                metadata: json!({}),
                deleted_at: None,
            })
            .await
            .unwrap();
        repo.delete(&conv.id, false).await.unwrap();
        let page = repo.find_all(10, 0, OrderBy::CreatedAt, Direction::Asc).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn find_missing_conversation_is_not_found() {
        let repo = repo();
        let result = repo.find_by_id(&ConversationId::new("missing")).await;
        assert!(matches!(result, Err(ChronicleError::NotFound(_))));
    }
}
