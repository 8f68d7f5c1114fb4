//! `EntityRepository`.

use crate::util::json_from_text;
use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{validation, ChronicleError, Entity, EntityId, EntityType};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Typed access to the `entities` table.
pub struct EntityRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl EntityRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
        let id: String = row.get("id")?;
        let type_text: String = row.get("type")?;
        let metadata_text: String = row.get("metadata")?;
        Ok(Entity {
            id: EntityId::new(id),
            name: row.get("name")?,
            normalized_name: row.get("normalized_name")?,
            entity_type: EntityType::parse(&type_text).unwrap_or(EntityType::Concept),
            confidence_score: row.get("confidence_score")?,
            mention_count: row.get("mention_count")?,
            first_seen_at: row.get("first_seen_at")?,
            last_mentioned_at: row.get("last_mentioned_at")?,
            metadata: json_from_text(&metadata_text),
        })
    }

    /// Insert an entity keyed by `(normalized_name, type)` if absent, or
    /// return the existing row's id, refreshing `last_mentioned_at` and
    /// `confidence_score` (kept at the max seen) in place.
    pub async fn upsert_by_normalized(
        &self,
        name: &str,
        normalized_name: &str,
        entity_type: EntityType,
        confidence: f64,
        at_ms: i64,
    ) -> Result<EntityId, ChronicleError> {
        validation::validate_unit_interval("confidence_score", confidence)?;

        let name = name.to_string();
        let normalized_name = normalized_name.to_string();
        let new_id = EntityId::generate();

        let id = self
            .pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                conn.execute(
                    "INSERT INTO entities (id, name, normalized_name, type, confidence_score, mention_count, first_seen_at, last_mentioned_at, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, '{}')
                     ON CONFLICT(normalized_name, type) DO UPDATE SET
                        confidence_score = MAX(entities.confidence_score, excluded.confidence_score),
                        last_mentioned_at = MAX(entities.last_mentioned_at, excluded.last_mentioned_at)",
                    params![new_id.as_str(), name, normalized_name, entity_type.as_str(), confidence, at_ms],
                )
                .map_err(from_rusqlite)?;

                conn.query_row(
                    "SELECT id FROM entities WHERE normalized_name = ?1 AND type = ?2",
                    params![normalized_name, entity_type.as_str()],
                    |row| row.get::<_, String>(0),
                )
                .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("entities").await;
        Ok(EntityId::new(id))
    }

    /// Fetch an entity by id.
    pub async fn find_by_id(&self, id: &EntityId) -> Result<Entity, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT id, name, normalized_name, type, confidence_score, mention_count, first_seen_at, last_mentioned_at, metadata
                         FROM entities WHERE id = ?1",
                        params![id.as_str()],
                        Self::row_to_entity,
                    )
                    .optional()
                    .map_err(from_rusqlite)?
                    .ok_or_else(|| ChronicleError::NotFound(format!("entity {id} not found")))
            })
            .await
    }

    /// Find an entity by its normalized name, optionally narrowed by
    /// type.
    pub async fn find_by_name(
        &self,
        normalized_name: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>, ChronicleError> {
        let normalized_name = normalized_name.to_string();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                match entity_type {
                    Some(t) => {
                        let mut stmt = conn
                            .prepare(
                                "SELECT id, name, normalized_name, type, confidence_score, mention_count, first_seen_at, last_mentioned_at, metadata
                                 FROM entities WHERE normalized_name = ?1 AND type = ?2",
                            )
                            .map_err(from_rusqlite)?;
                        let rows = stmt
                            .query_map(params![normalized_name, t.as_str()], Self::row_to_entity)
                            .map_err(from_rusqlite)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                    }
                    None => {
                        let mut stmt = conn
                            .prepare(
                                "SELECT id, name, normalized_name, type, confidence_score, mention_count, first_seen_at, last_mentioned_at, metadata
                                 FROM entities WHERE normalized_name = ?1",
                            )
                            .map_err(from_rusqlite)?;
                        let rows = stmt
                            .query_map(params![normalized_name], Self::row_to_entity)
                            .map_err(from_rusqlite)?;
                        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                    }
                }
            })
            .await
    }

    /// Bump `mention_count` and `last_mentioned_at`.
    pub async fn increment_mention(&self, id: &EntityId, at_ms: i64) -> Result<(), ChronicleError> {
        let id = id.clone();
        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "UPDATE entities SET mention_count = mention_count + 1, last_mentioned_at = MAX(last_mentioned_at, ?1) WHERE id = ?2",
                        params![at_ms, id.as_str()],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;
        if affected == 0 {
            return Err(ChronicleError::NotFound(format!("entity {id} not found")));
        }
        self.cache.invalidate("entities").await;
        Ok(())
    }

    /// Record an entity mention, keyed by `(entity_id, message_id,
    /// start_offset)` so re-processing the same message is a no-op
    /// rather than a duplicate row.
    pub async fn record_mention(
        &self,
        entity_id: &EntityId,
        message_id: &str,
        start_offset: u32,
        end_offset: u32,
        method: &str,
        confidence: f64,
    ) -> Result<bool, ChronicleError> {
        validation::validate_unit_interval("confidence", confidence)?;
        let entity_id = entity_id.clone();
        let message_id = message_id.to_string();
        let method = method.to_string();

        let inserted = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute(
                        "INSERT OR IGNORE INTO entity_mentions (entity_id, message_id, start_offset, end_offset, method, confidence)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![entity_id.as_str(), message_id, start_offset, end_offset, method, confidence],
                    )
                    .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("entities").await;
        Ok(inserted > 0)
    }

    /// Count of non-deleted mentions referencing an entity; used to
    /// decide whether to garbage-collect the entity after its last
    /// mention's owning message is deleted.
    pub async fn mention_count_for(&self, id: &EntityId) -> Result<u64, ChronicleError> {
        let id = id.clone();
        self.pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .query_row(
                        "SELECT COUNT(*) FROM entity_mentions WHERE entity_id = ?1",
                        params![id.as_str()],
                        |row| row.get::<_, i64>(0),
                    )
                    .map_err(from_rusqlite)
                    .map(|n| n.max(0) as u64)
            })
            .await
    }

    /// Delete an entity that no longer has any mentions.
    pub async fn garbage_collect(&self, id: &EntityId) -> Result<bool, ChronicleError> {
        if self.mention_count_for(id).await? > 0 {
            return Ok(false);
        }
        let id = id.clone();
        let affected = self
            .pool
            .with_connection(None, move |store| {
                store
                    .conn()
                    .execute("DELETE FROM entities WHERE id = ?1", params![id.as_str()])
                    .map_err(from_rusqlite)
            })
            .await?;
        self.cache.invalidate("entities").await;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_by_normalized_is_idempotent_on_conflict() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let repo = EntityRepository::new(pool, cache);

        let id1 = repo
            .upsert_by_normalized("Alice Chen", "alice chen", EntityType::Person, 0.7, 100)
            .await
            .unwrap();
        let id2 = repo
            .upsert_by_normalized("Alice Chen", "alice chen", EntityType::Person, 0.9, 200)
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let entity = repo.find_by_id(&id1).await.unwrap();
        assert_eq!(entity.confidence_score, 0.9);
        assert_eq!(entity.last_mentioned_at, 200);
    }

    #[tokio::test]
    async fn record_mention_is_idempotent_per_key() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let repo = EntityRepository::new(pool.clone(), cache.clone());
        let id = repo
            .upsert_by_normalized("Acme", "acme", EntityType::Organization, 0.8, 1)
            .await
            .unwrap();

        // entity_mentions references messages(id) via FK so insert a
        // conversation+message first.
        pool.with_connection(None, |store| {
            store.conn().execute_batch(
                "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES ('c1', 1, 1, NULL, '{}');
                 INSERT INTO messages(id, conversation_id, role, content, created_at, metadata) VALUES ('m1', 'c1', 'user', 'Acme deployed it', 1, '{}');",
            )
            .map_err(from_rusqlite)
        })
        .await
        .unwrap();

        let first = repo.record_mention(&id, "m1", 0, 4, "pattern", 0.9).await.unwrap();
        let second = repo.record_mention(&id, "m1", 0, 4, "pattern", 0.9).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(repo.mention_count_for(&id).await.unwrap(), 1);
    }
}
