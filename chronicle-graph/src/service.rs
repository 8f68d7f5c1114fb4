//! Knowledge-graph ingestion: wires the
//! extractor and detector in this crate to the `entities` and
//! `entity_relationships` repositories, idempotently, per message.

use crate::extractor::{self, ExtractorConfig};
use crate::relationships::{self, DetectorConfig};
use chronicle_repo::{EntityRepository, KnowledgeGraphRepository};
use chronicle_store::QueryCache;
use chronicle_types::{ChronicleError, Entity, EntityId, EntityRelationship, MessageId};
use std::sync::Arc;

/// What a single [`KnowledgeGraphService::ingest_message`] call
/// persisted or touched.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    /// Entities mentioned in the message, after upsert.
    pub entities: Vec<Entity>,
    /// Relationships detected and merged among those entities.
    pub relationships: Vec<EntityRelationship>,
}

/// Orchestrates extraction, persistence, and cache invalidation for
/// one message at a time. Safe to call more than once for the same
/// message: entity mentions are keyed by `(entity_id, message_id,
/// start_offset)`, so re-ingestion neither double-counts
/// `mention_count` nor creates duplicate relationship evidence.
pub struct KnowledgeGraphService {
    entities: Arc<EntityRepository>,
    graph: Arc<KnowledgeGraphRepository>,
    cache: Arc<QueryCache>,
    extractor_config: ExtractorConfig,
    detector_config: DetectorConfig,
}

impl KnowledgeGraphService {
    /// Build a service over the given repositories and cache.
    pub fn new(entities: Arc<EntityRepository>, graph: Arc<KnowledgeGraphRepository>, cache: Arc<QueryCache>) -> Self {
        Self {
            entities,
            graph,
            cache,
            extractor_config: ExtractorConfig::default(),
            detector_config: DetectorConfig::default(),
        }
    }

    /// Override the extraction/detection tunables (defaults match
    /// `ExtractorConfig`/`DetectorConfig`'s own `Default` impls).
    pub fn with_config(mut self, extractor_config: ExtractorConfig, detector_config: DetectorConfig) -> Self {
        self.extractor_config = extractor_config;
        self.detector_config = detector_config;
        self
    }

    /// Extract entities and relationships from `content` and persist
    /// them against `message_id`. Message write failures are the
    /// caller's concern; extraction failures here never roll back the
    /// message itself because this is called after the
    /// message row already exists.
    pub async fn ingest_message(&self, message_id: &MessageId, content: &str, at_ms: i64) -> Result<IngestOutcome, ChronicleError> {
        let candidates = extractor::extract(content, self.extractor_config);
        if candidates.is_empty() {
            return Ok(IngestOutcome::default());
        }

        let mut entity_ids: Vec<EntityId> = Vec::with_capacity(candidates.len());
        let mut entities = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let entity_id = self
                .entities
                .upsert_by_normalized(&candidate.text, &candidate.normalized, candidate.entity_type, candidate.confidence, at_ms)
                .await?;
            let newly_mentioned = self
                .entities
                .record_mention(
                    &entity_id,
                    message_id.as_str(),
                    candidate.start_offset,
                    candidate.end_offset,
                    "pattern",
                    candidate.confidence,
                )
                .await?;
            if newly_mentioned {
                self.entities.increment_mention(&entity_id, at_ms).await?;
            }
            entities.push(self.entities.find_by_id(&entity_id).await?);
            entity_ids.push(entity_id);
        }

        let detected = relationships::detect(content, &candidates, self.detector_config);
        let mut persisted_relationships = Vec::with_capacity(detected.len());
        for relationship in detected {
            let source = &entity_ids[relationship.source_index];
            let target = &entity_ids[relationship.target_index];
            if source == target {
                continue;
            }
            let persisted = self
                .graph
                .upsert_relationship(source, target, relationship.relationship_type, relationship.confidence, relationship.confidence, at_ms, message_id)
                .await?;
            persisted_relationships.push(persisted);
        }

        self.cache.invalidate("entities").await;
        self.cache.invalidate("graph").await;

        Ok(IngestOutcome {
            entities,
            relationships: persisted_relationships,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_repo::{EntityRepository, KnowledgeGraphRepository};
    use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};

    async fn test_service() -> (KnowledgeGraphService, MessageId) {
        let pool = ConnectionPool::open_in_memory(2).expect("open pool");
        let cache = Arc::new(QueryCache::new());
        let entities = Arc::new(EntityRepository::new(pool.clone(), cache.clone()));
        let graph = Arc::new(KnowledgeGraphRepository::new(pool.clone(), cache.clone()));
        let message_id = MessageId::generate();

        // entity_mentions references messages(id) via FK so insert a
        // conversation+message first.
        let message_id_str = message_id.as_str().to_string();
        pool.with_connection(None, move |store| {
            store
                .conn()
                .execute_batch(&format!(
                    "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES ('c1', 1, 1, NULL, '{{}}');
                     INSERT INTO messages(id, conversation_id, role, content, created_at, metadata) VALUES ('{message_id_str}', 'c1', 'user', 'seed', 1, '{{}}');",
                ))
                .map_err(from_rusqlite)
        })
        .await
        .expect("seed conversation+message");

        (KnowledgeGraphService::new(entities, graph, cache), message_id)
    }

    #[tokio::test]
    async fn ingesting_the_same_message_twice_does_not_double_count_mentions() {
        let (service, message_id) = test_service().await;
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";

        let first = service.ingest_message(&message_id, text, 1_000).await.expect("first ingest");
        let second = service.ingest_message(&message_id, text, 2_000).await.expect("second ingest");

        assert!(!first.entities.is_empty());
        for (a, b) in first.entities.iter().zip(second.entities.iter()) {
            assert_eq!(a.mention_count, b.mention_count);
        }
    }

    #[tokio::test]
    async fn ingestion_persists_a_works_for_relationship() {
        let (service, message_id) = test_service().await;
        let text = "Dr. Alice Chen at Acme Corp deployed the pricing API";
        let outcome = service.ingest_message(&message_id, text, 1_000).await.expect("ingest");
        assert!(!outcome.relationships.is_empty());
    }
}
