//! `KnowledgeGraphRepository`.
//!
//! The graph is represented purely as two tables queried by id —
//! `entities` and `entity_relationships` — never as an in-memory owning
//! pointer graph. Traversal is a depth-bounded breadth-first search
//! with an explicit visited set so a cycle (A→B→A) cannot be walked
//! more than once.

use chronicle_store::{from_rusqlite, ConnectionPool, QueryCache};
use chronicle_types::{validation, ChronicleError, EntityId, EntityRelationship, MessageId, RelationshipId, RelationshipType};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// One hop of a traversal path, paired with the relationship that
/// connected it to the previous entity.
#[derive(Debug, Clone)]
pub struct TraversalStep {
    /// The entity reached at this step.
    pub entity_id: EntityId,
    /// The relationship traversed to reach it (`None` for the root).
    pub via: Option<EntityRelationship>,
}

/// A single path discovered by [`KnowledgeGraphRepository::traverse`].
#[derive(Debug, Clone)]
pub struct GraphPath {
    /// Steps from the root (inclusive) to the path's end.
    pub steps: Vec<TraversalStep>,
}

impl GraphPath {
    /// Path length in edges (hops), i.e. `steps.len() - 1`.
    pub fn depth(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }
}

/// Typed access to the `entity_relationships` table plus graph queries.
pub struct KnowledgeGraphRepository {
    pool: ConnectionPool,
    cache: Arc<QueryCache>,
}

impl KnowledgeGraphRepository {
    /// Build a repository over a shared pool and cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<EntityRelationship> {
        let id: String = row.get("id")?;
        let source: String = row.get("source_entity_id")?;
        let target: String = row.get("target_entity_id")?;
        let type_text: String = row.get("relationship_type")?;
        let context_json: String = row.get("context_message_ids")?;
        let context_ids: Vec<String> = serde_json::from_str(&context_json).unwrap_or_default();

        Ok(EntityRelationship {
            id: RelationshipId::new(id),
            source_entity_id: EntityId::new(source),
            target_entity_id: EntityId::new(target),
            relationship_type: RelationshipType::parse(&type_text).unwrap_or(RelationshipType::RelatedTo),
            strength: row.get("strength")?,
            semantic_weight: row.get("semantic_weight")?,
            mention_count: row.get("mention_count")?,
            first_mentioned_at: row.get("first_mentioned_at")?,
            last_mentioned_at: row.get("last_mentioned_at")?,
            context_message_ids: context_ids.into_iter().map(MessageId::new).collect(),
        })
    }

    /// Upsert a relationship, merging by `(source, target, type)`: on
    /// conflict, `strength := MAX(existing, new)`, `mention_count`
    /// increments, `context_message_ids` gets `new_context_message_id`
    /// appended if not already present (idempotent re-ingestion of the
    /// same message never double-counts).
    pub async fn upsert_relationship(
        &self,
        source_entity_id: &EntityId,
        target_entity_id: &EntityId,
        relationship_type: RelationshipType,
        strength: f64,
        semantic_weight: f64,
        at_ms: i64,
        new_context_message_id: &MessageId,
    ) -> Result<EntityRelationship, ChronicleError> {
        validation::validate_unit_interval("strength", strength)?;
        validation::validate_unit_interval("semantic_weight", semantic_weight)?;
        if relationship_type.is_directional() && source_entity_id == target_entity_id {
            return Err(ChronicleError::validation_field(
                "target_entity_id",
                "must differ from source_entity_id for a directional relationship type",
            ));
        }

        let source = source_entity_id.clone();
        let target = target_entity_id.clone();
        let message_id = new_context_message_id.clone();
        let new_id = RelationshipId::generate();

        let result = self
            .pool
            .with_connection(None, move |store| {
                let conn = store.conn();

                let existing: Option<(String, String)> = conn
                    .query_row(
                        "SELECT id, context_message_ids FROM entity_relationships
                         WHERE source_entity_id = ?1 AND target_entity_id = ?2 AND relationship_type = ?3",
                        params![source.as_str(), target.as_str(), relationship_type.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(from_rusqlite)?;

                match existing {
                    None => {
                        let context = serde_json::json!([message_id.as_str()]).to_string();
                        conn.execute(
                            "INSERT INTO entity_relationships
                                (id, source_entity_id, target_entity_id, relationship_type, strength, semantic_weight,
                                 mention_count, first_mentioned_at, last_mentioned_at, context_message_ids)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, ?8)",
                            params![
                                new_id.as_str(), source.as_str(), target.as_str(), relationship_type.as_str(),
                                strength, semantic_weight, at_ms, context,
                            ],
                        )
                        .map_err(from_rusqlite)?;
                    }
                    Some((_, context_json)) => {
                        let mut ids: Vec<String> = serde_json::from_str(&context_json).unwrap_or_default();
                        let already_present = ids.iter().any(|id| id == message_id.as_str());
                        if !already_present {
                            ids.push(message_id.as_str().to_string());
                        }
                        let context = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string());
                        let mention_delta = if already_present { 0 } else { 1 };
                        conn.execute(
                            "UPDATE entity_relationships SET
                                strength = MAX(strength, ?1),
                                semantic_weight = (semantic_weight * mention_count + ?2) / (mention_count + ?3),
                                mention_count = mention_count + ?3,
                                last_mentioned_at = MAX(last_mentioned_at, ?4),
                                context_message_ids = ?5
                             WHERE source_entity_id = ?6 AND target_entity_id = ?7 AND relationship_type = ?8",
                            params![
                                strength, semantic_weight, mention_delta, at_ms, context,
                                source.as_str(), target.as_str(), relationship_type.as_str(),
                            ],
                        )
                        .map_err(from_rusqlite)?;
                    }
                }

                conn.query_row(
                    "SELECT id, source_entity_id, target_entity_id, relationship_type, strength, semantic_weight,
                            mention_count, first_mentioned_at, last_mentioned_at, context_message_ids
                     FROM entity_relationships
                     WHERE source_entity_id = ?1 AND target_entity_id = ?2 AND relationship_type = ?3",
                    params![source.as_str(), target.as_str(), relationship_type.as_str()],
                    Self::row_to_relationship,
                )
                .map_err(from_rusqlite)
            })
            .await?;

        self.cache.invalidate("relationships").await;
        Ok(result)
    }

    /// Relationships anchored at `entity_id` (in either direction) with
    /// `strength >= min_strength`, strongest first, capped at `limit`.
    pub async fn get_neighbors(
        &self,
        entity_id: &EntityId,
        min_strength: f64,
        limit: u32,
    ) -> Result<Vec<EntityRelationship>, ChronicleError> {
        let entity_id = entity_id.clone();
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn
                    .prepare(
                        "SELECT id, source_entity_id, target_entity_id, relationship_type, strength, semantic_weight,
                                mention_count, first_mentioned_at, last_mentioned_at, context_message_ids
                         FROM entity_relationships
                         WHERE (source_entity_id = ?1 OR target_entity_id = ?1) AND strength >= ?2
                         ORDER BY strength DESC LIMIT ?3",
                    )
                    .map_err(from_rusqlite)?;
                let rows = stmt
                    .query_map(params![entity_id.as_str(), min_strength, limit], Self::row_to_relationship)
                    .map_err(from_rusqlite)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
            })
            .await
    }

    /// Depth-bounded breadth-first traversal from `entity_id`. No
    /// returned path exceeds `max_depth` edges and no path revisits an
    /// entity (visited set scoped per path, not globally, so diamond
    /// shapes still produce multiple paths through a shared ancestor).
    /// Checks `deadline` between depth levels and returns `Cancelled` if
    /// it has elapsed.
    pub async fn traverse(
        &self,
        entity_id: &EntityId,
        max_depth: u32,
        min_strength: f64,
        deadline: Option<Instant>,
    ) -> Result<Vec<GraphPath>, ChronicleError> {
        let mut paths = vec![GraphPath {
            steps: vec![TraversalStep {
                entity_id: entity_id.clone(),
                via: None,
            }],
        }];
        let mut frontier = paths.clone();

        for _ in 0..max_depth {
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    return Err(ChronicleError::Cancelled);
                }
            }
            let mut next_frontier = Vec::new();
            for path in &frontier {
                let tail = path.steps.last().expect("path always has a root step");
                let visited: HashSet<&str> = path.steps.iter().map(|s| s.entity_id.as_str()).collect();
                let neighbors = self.get_neighbors(&tail.entity_id, min_strength, 64).await?;

                for rel in neighbors {
                    let other = if rel.source_entity_id == tail.entity_id {
                        rel.target_entity_id.clone()
                    } else {
                        rel.source_entity_id.clone()
                    };
                    if visited.contains(other.as_str()) {
                        continue;
                    }
                    let mut steps = path.steps.clone();
                    steps.push(TraversalStep {
                        entity_id: other,
                        via: Some(rel),
                    });
                    let extended = GraphPath { steps };
                    paths.push(extended.clone());
                    next_frontier.push(extended);
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        let _ = &mut paths;
        Ok(paths)
    }
}

// `VecDeque` is imported for documentation/extension purposes — the
// current traversal is level-synchronous (a `Vec` frontier swap), which
// is sufficient for the bounded depths this service expects; a
// `VecDeque`-based work queue is the natural next step if traversal
// needs to interleave across entities instead of processing one level
// fully before the next.
#[allow(dead_code)]
fn _uses_vecdeque(_: VecDeque<()>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRepository;

    async fn setup() -> (EntityRepository, KnowledgeGraphRepository, ConnectionPool) {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let cache = Arc::new(QueryCache::new());
        let entities = EntityRepository::new(pool.clone(), cache.clone());
        let graph = KnowledgeGraphRepository::new(pool.clone(), cache);
        (entities, graph, pool)
    }

    #[tokio::test]
    async fn upsert_relationship_merges_by_source_target_type() {
        let (entities, graph, _pool) = setup().await;
        let alice = entities.upsert_by_normalized("Alice", "alice", chronicle_types::EntityType::Person, 0.7, 1).await.unwrap();
        let acme = entities.upsert_by_normalized("Acme", "acme", chronicle_types::EntityType::Organization, 0.7, 1).await.unwrap();

        graph
            .upsert_relationship(&alice, &acme, RelationshipType::WorksFor, 0.6, 0.5, 10, &MessageId::new("m1"))
            .await
            .unwrap();
        let merged = graph
            .upsert_relationship(&alice, &acme, RelationshipType::WorksFor, 0.8, 0.9, 20, &MessageId::new("m2"))
            .await
            .unwrap();

        assert_eq!(merged.mention_count, 2);
        assert_eq!(merged.strength, 0.8);
        assert_eq!(merged.context_message_ids.len(), 2);
        assert_eq!(merged.context_message_ids[0].as_str(), "m1");
        assert_eq!(merged.context_message_ids[1].as_str(), "m2");
    }

    #[tokio::test]
    async fn reingesting_same_message_does_not_double_count() {
        let (entities, graph, _pool) = setup().await;
        let alice = entities.upsert_by_normalized("Alice", "alice", chronicle_types::EntityType::Person, 0.7, 1).await.unwrap();
        let acme = entities.upsert_by_normalized("Acme", "acme", chronicle_types::EntityType::Organization, 0.7, 1).await.unwrap();

        graph.upsert_relationship(&alice, &acme, RelationshipType::WorksFor, 0.6, 0.5, 10, &MessageId::new("m1")).await.unwrap();
        let again = graph.upsert_relationship(&alice, &acme, RelationshipType::WorksFor, 0.6, 0.5, 10, &MessageId::new("m1")).await.unwrap();
        assert_eq!(again.mention_count, 1);
    }

    #[tokio::test]
    async fn directional_relationship_rejects_self_loop() {
        let (entities, graph, _pool) = setup().await;
        let alice = entities.upsert_by_normalized("Alice", "alice", chronicle_types::EntityType::Person, 0.7, 1).await.unwrap();
        let result = graph
            .upsert_relationship(&alice, &alice, RelationshipType::WorksFor, 0.5, 0.5, 1, &MessageId::new("m1"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn traverse_respects_max_depth_and_visited_set() {
        let (entities, graph, _pool) = setup().await;
        let a = entities.upsert_by_normalized("A", "a", chronicle_types::EntityType::Concept, 0.9, 1).await.unwrap();
        let b = entities.upsert_by_normalized("B", "b", chronicle_types::EntityType::Concept, 0.9, 1).await.unwrap();
        let c = entities.upsert_by_normalized("C", "c", chronicle_types::EntityType::Concept, 0.9, 1).await.unwrap();

        graph.upsert_relationship(&a, &b, RelationshipType::RelatedTo, 0.9, 0.9, 1, &MessageId::new("m1")).await.unwrap();
        graph.upsert_relationship(&b, &c, RelationshipType::RelatedTo, 0.9, 0.9, 1, &MessageId::new("m2")).await.unwrap();
        graph.upsert_relationship(&c, &a, RelationshipType::RelatedTo, 0.9, 0.9, 1, &MessageId::new("m3")).await.unwrap();

        let paths = graph.traverse(&a, 2, 0.0, None).await.unwrap();
        assert!(paths.iter().all(|p| p.depth() <= 2));

        let has_cycle_revisit = paths.iter().any(|p| {
            let mut seen = HashSet::new();
            !p.steps.iter().all(|s| seen.insert(s.entity_id.as_str()))
        });
        assert!(!has_cycle_revisit, "no path should revisit an entity");
    }
}
