//! `MessageRepository`.
//!
//! Inserts run inside the owning conversation's write path so the
//! `messages_fts` trigger maintenance and the `no_self_parent`
//! guard (a validation trigger) are enforced by the engine itself —
//! this repository only shapes the Rust-side contract around them.

use crate::util::{decode_embedding, encode_embedding, json_from_text, json_to_text};
use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{validation, ChronicleError, Conversation, ConversationId, Message, MessageId, MessageRole};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Pagination cursor for [`MessageRepository::find_by_conversation_id`].
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    /// Maximum rows to return.
    pub limit: u32,
    /// Return messages strictly before this id (by `(created_at, id)`
    /// order), exclusive.
    pub before_id: Option<MessageId>,
    /// Return messages strictly after this id, exclusive.
    pub after_id: Option<MessageId>,
}

/// Typed access to the `messages` table.
pub struct MessageRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl MessageRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        let id: String = row.get("id")?;
        let conversation_id: String = row.get("conversation_id")?;
        let role_text: String = row.get("role")?;
        let metadata_text: String = row.get("metadata")?;
        let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
        let parent: Option<String> = row.get("parent_message_id")?;

        Ok(Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new(conversation_id),
            role: MessageRole::parse(&role_text).unwrap_or(MessageRole::User),
            content: row.get("content")?,
            created_at: row.get("created_at")?,
            parent_message_id: parent.map(MessageId::new),
            metadata: json_from_text(&metadata_text),
            embedding: embedding_blob.map(|b| decode_embedding(&b)),
        })
    }

    /// Insert a message. Rejects an orphan (`conversation_id` doesn't
    /// exist — surfaced by the foreign-key constraint as `Validation`)
    /// or a message whose `parent_message_id` equals its own `id`
    /// (rejected by the `trg_messages_no_self_parent` trigger). On
    /// success, bumps the owning conversation's `updated_at`.
    pub async fn create(&self, mut message: Message) -> Result<Message, ChronicleError> {
        validation::validate_content(&message.content)?;
        validation::validate_metadata(&message.metadata)?;
        if message.id.as_str().is_empty() {
            message.id = MessageId::generate();
        }
        if let Some(parent) = &message.parent_message_id {
            if parent == &message.id {
                return Err(ChronicleError::validation_field(
                    "parent_message_id",
                    "a message cannot be its own parent",
                ));
            }
        }

        let metadata_text = json_to_text(&message.metadata);
        let embedding_blob = message.embedding.as_deref().map(encode_embedding);
        let to_insert = message.clone();

        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT INTO messages (id, conversation_id, role, content, created_at, parent_message_id, metadata, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            to_insert.id.as_str(),
                            to_insert.conversation_id.as_str(),
                            to_insert.role.as_str(),
                            to_insert.content,
                            to_insert.created_at,
                            to_insert.parent_message_id.as_ref().map(|p| p.as_str()),
                            metadata_text,
                            embedding_blob,
                        ],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        let conversation_id = message.conversation_id.clone();
        let created_at = message.created_at;
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE conversations SET updated_at = MAX(updated_at, ?1) WHERE id = ?2",
                        params![created_at, conversation_id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("messages").await;
        self.cache.invalidate("conversations").await;
        Ok(message)
    }

    /// Key-set paginated messages within a conversation, ordered
    /// ascending by `(created_at, id)`.
    pub async fn find_by_conversation_id(
        &self,
        conversation_id: &ConversationId,
        page: MessagePage,
    ) -> Result<Vec<Message>, ChronicleError> {
        validation::validate_pagination(page.limit.max(1), 1000)?;
        let conversation_id = conversation_id.clone();

        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();

                let cursor = |id: &MessageId| -> rusqlite::Result<(i64, String)> {
                    conn.query_row(
                        "SELECT created_at, id FROM messages WHERE id = ?1",
                        params![id.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                };

                let mut rows = if let Some(after) = &page.after_id {
                    let (c_at, c_id) = cursor(after).map_err(from_rusqlite)?;
                    let mut stmt = conn
                        .prepare(
                            "SELECT id, conversation_id, role, content, created_at, parent_message_id, metadata, embedding
                             FROM messages
                             WHERE conversation_id = ?1 AND (created_at, id) > (?2, ?3)
                             ORDER BY created_at ASC, id ASC LIMIT ?4",
                        )
                        .map_err(from_rusqlite)?;
                    let mapped = stmt
                        .query_map(params![conversation_id.as_str(), c_at, c_id, page.limit], Self::row_to_message)
                        .map_err(from_rusqlite)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)?
                } else if let Some(before) = &page.before_id {
                    let (c_at, c_id) = cursor(before).map_err(from_rusqlite)?;
                    let mut stmt = conn
                        .prepare(
                            "SELECT id, conversation_id, role, content, created_at, parent_message_id, metadata, embedding
                             FROM messages
                             WHERE conversation_id = ?1 AND (created_at, id) < (?2, ?3)
                             ORDER BY created_at DESC, id DESC LIMIT ?4",
                        )
                        .map_err(from_rusqlite)?;
                    let mapped = stmt
                        .query_map(params![conversation_id.as_str(), c_at, c_id, page.limit], Self::row_to_message)
                        .map_err(from_rusqlite)?;
                    let mut v = mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)?;
                    v.reverse();
                    v
                } else {
                    let mut stmt = conn
                        .prepare(
                            "SELECT id, conversation_id, role, content, created_at, parent_message_id, metadata, embedding
                             FROM messages
                             WHERE conversation_id = ?1
                             ORDER BY created_at ASC, id ASC LIMIT ?2",
                        )
                        .map_err(from_rusqlite)?;
                    let mapped = stmt
                        .query_map(params![conversation_id.as_str(), page.limit], Self::row_to_message)
                        .map_err(from_rusqlite)?;
                    mapped.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)?
                };

                rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.as_str().cmp(b.id.as_str())));
                Ok(rows)
            })
            .await
    }

    /// Number of messages in a conversation.
    pub async fn count(&self, conversation_id: &ConversationId) -> Result<u64, ChronicleError> {
        let conversation_id = conversation_id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                        params![conversation_id.as_str()],
                        |row| row.get::<_, i64>(0),
                    )
                    .map_err(from_rusqlite)
                    .map(|n| n.max(0) as u64)
            })
            .await
    }

    /// Delete all messages belonging to a conversation (used by cascade
    /// delete paths and by re-processing flows).
    pub async fn delete_by_conversation(&self, conversation_id: &ConversationId) -> Result<u64, ChronicleError> {
        let conversation_id = conversation_id.clone();
        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "DELETE FROM messages WHERE conversation_id = ?1",
                        params![conversation_id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        self.cache.invalidate("messages").await;
        Ok(affected as u64)
    }

    /// Fetch a single message by id.
    pub async fn find_by_id(&self, id: &MessageId) -> Result<Message, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, conversation_id, role, content, created_at, parent_message_id, metadata, embedding
                         FROM messages WHERE id = ?1",
                        params![id.as_str()],
                        Self::row_to_message,
                    )
                    .optional()
                    .map_err(from_rusqlite)?
                    .ok_or_else(|| ChronicleError::NotFound(format!("message {id} not found")))
            })
            .await
    }
}

/// Helper used by tests and `chronicle-tool`'s `save_message` handler to
/// build a fresh conversation quickly.
pub fn blank_conversation(id: impl Into<String>, at: i64) -> Conversation {
    Conversation {
        id: ConversationId::new(id.into()),
        created_at: at,
        updated_at: at,
        title: None,
        metadata: serde_json::json!({}),
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationRepository;

    fn repos() -> (ConversationRepository, MessageRepository) {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        (
            ConversationRepository::new(pool.clone(), cache.clone()),
            MessageRepository::new(pool, cache),
        )
    }

    #[tokio::test]
    async fn create_rejects_orphan_conversation() {
        let (_convs, messages) = repos();
        let msg = Message {
            id: MessageId::new(""),
            conversation_id: ConversationId::new("does-not-exist"),
            role: MessageRole::User,
            content: "hi".into(),
            created_at: 1,
            parent_message_id: None,
            metadata: serde_json::json!({}),
            embedding: None,
        };
        assert!(messages.create(msg).await.is_err());
    }

    #[tokio::test]
    async fn create_rejects_self_parent() {
        let (convs, messages) = repos();
        convs.create(blank_conversation("c1", 1)).await.unwrap();
        let id = MessageId::new("m1");
        let msg = Message {
            id: id.clone(),
            conversation_id: ConversationId::new("c1"),
            role: MessageRole::User,
            content: "hi".into(),
            created_at: 1,
            parent_message_id: Some(id),
            metadata: serde_json::json!({}),
            embedding: None,
        };
        assert!(messages.create(msg).await.is_err());
    }

    #[tokio::test]
    async fn save_then_find_by_conversation_returns_verbatim() {
        let (convs, messages) = repos();
        convs.create(blank_conversation("c1", 1)).await.unwrap();
        let msg = Message {
            id: MessageId::new(""),
            conversation_id: ConversationId::new("c1"),
            role: MessageRole::User,
            content: "How do I optimize SQLite with WAL?".into(),
            created_at: 5,
            parent_message_id: None,
            metadata: serde_json::json!({"k": "v"}),
            embedding: None,
        };
        let saved = messages.create(msg).await.unwrap();

        let page = messages
            .find_by_conversation_id(&ConversationId::new("c1"), MessagePage { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, saved.id);
        assert_eq!(page[0].content, saved.content);
        assert_eq!(page[0].metadata, saved.metadata);
    }

    #[tokio::test]
    async fn conversation_updated_at_tracks_message_created_at() {
        let (convs, messages) = repos();
        convs.create(blank_conversation("c1", 1)).await.unwrap();
        messages
            .create(Message {
                id: MessageId::new(""),
                conversation_id: ConversationId::new("c1"),
                role: MessageRole::User,
                content: "later".into(),
                created_at: 9999,
                parent_message_id: None,
                metadata: serde_json::json!({}),
                embedding: None,
            })
            .await
            .unwrap();
        let conv = convs.find_by_id(&ConversationId::new("c1")).await.unwrap();
        assert!(conv.updated_at >= 9999);
    }
}
