//! `get_entity_history`, `find_related_conversations`,
//! `get_knowledge_graph`, `auto_tag_conversation`.

use crate::context::AppContext;
use crate::dto::{normalize_name, parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_store::from_rusqlite;
use chronicle_types::{ChronicleError, ConversationId, Entity, EntityId, EntityType};
use rusqlite::params;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::time::{Duration, Instant};

async fn resolve_entity(ctx: &AppContext, entity_id: Option<String>, entity_name: Option<String>) -> Result<Entity, ChronicleError> {
    if let Some(id) = entity_id {
        return ctx.repos.entities.find_by_id(&EntityId::new(id)).await;
    }
    if let Some(name) = entity_name {
        let normalized = normalize_name(&name);
        let matches = ctx.repos.entities.find_by_name(&normalized, None).await?;
        return matches
            .into_iter()
            .next()
            .ok_or_else(|| ChronicleError::NotFound(format!("no entity named {name}")));
    }
    Err(ChronicleError::validation_field("entity_id", "either entity_id or entity_name is required"))
}

fn entity_json(entity: &Entity) -> Result<Json, ChronicleError> {
    to_json(entity)
}

/// Fetch an entity and its strongest relationships.
pub struct GetEntityHistory {
    ctx: AppContext,
}

impl GetEntityHistory {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetEntityHistoryInput {
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    entity_name: Option<String>,
    #[serde(default)]
    min_strength: Option<f64>,
    #[serde(default)]
    limit: Option<u32>,
}

impl ToolDyn for GetEntityHistory {
    fn name(&self) -> &str {
        "get_entity_history"
    }

    fn description(&self) -> &str {
        "Fetch an entity by id or name together with its strongest known relationships"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "entity_name": {"type": "string"},
                "min_strength": {"type": "number"},
                "limit": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetEntityHistoryInput = parse_input(input)?;
            let entity = resolve_entity(&ctx, req.entity_id, req.entity_name).await?;
            let neighbors = ctx
                .repos
                .graph
                .get_neighbors(&entity.id, req.min_strength.unwrap_or(0.0), req.limit.unwrap_or(50))
                .await?;
            Ok(json!({
                "entity": entity_json(&entity)?,
                "relationships": to_json(&neighbors)?,
            }))
        })
    }
}

/// Find conversations whose messages mention the same entity, other
/// than the conversation given.
pub struct FindRelatedConversations {
    ctx: AppContext,
}

impl FindRelatedConversations {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct FindRelatedConversationsInput {
    conversation_id: String,
    #[serde(default)]
    limit: Option<u32>,
}

impl ToolDyn for FindRelatedConversations {
    fn name(&self) -> &str {
        "find_related_conversations"
    }

    fn description(&self) -> &str {
        "Find other conversations that share mentions of the same entities as the given conversation"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: FindRelatedConversationsInput = parse_input(input)?;
            let conversation_id = req.conversation_id;
            let limit = req.limit.unwrap_or(10);

            let rows = ctx
                .pool
                .with_connection(None, move |store| {
                    let conn = store.conn();
                    let mut stmt = conn
                        .prepare(
                            "SELECT other.id AS conversation_id, COUNT(DISTINCT em2.entity_id) AS shared_entities
                             FROM entity_mentions em1
                             JOIN messages m1 ON m1.id = em1.message_id AND m1.conversation_id = ?1
                             JOIN entity_mentions em2 ON em2.entity_id = em1.entity_id
                             JOIN messages m2 ON m2.id = em2.message_id AND m2.conversation_id != ?1
                             JOIN conversations other ON other.id = m2.conversation_id AND other.deleted_at IS NULL
                             GROUP BY other.id
                             ORDER BY shared_entities DESC
                             LIMIT ?2",
                        )
                        .map_err(from_rusqlite)?;
                    let rows = stmt
                        .query_map(params![conversation_id, limit], |row| {
                            let id: String = row.get(0)?;
                            let shared: i64 = row.get(1)?;
                            Ok((id, shared))
                        })
                        .map_err(from_rusqlite)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                })
                .await?;

            let related: Vec<Json> = rows
                .into_iter()
                .map(|(id, shared)| json!({ "conversation_id": id, "shared_entities": shared }))
                .collect();
            Ok(json!({ "related_conversations": related }))
        })
    }
}

/// Breadth-first traversal of the knowledge graph from an entity.
pub struct GetKnowledgeGraph {
    ctx: AppContext,
}

impl GetKnowledgeGraph {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetKnowledgeGraphInput {
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    entity_name: Option<String>,
    #[serde(default)]
    max_depth: Option<u32>,
    #[serde(default)]
    min_strength: Option<f64>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

const DEFAULT_TRAVERSAL_TIMEOUT_MS: u64 = 2_000;

impl ToolDyn for GetKnowledgeGraph {
    fn name(&self) -> &str {
        "get_knowledge_graph"
    }

    fn description(&self) -> &str {
        "Breadth-first traversal of the knowledge graph outward from an entity, bounded by depth and a deadline"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "entity_name": {"type": "string"},
                "max_depth": {"type": "integer"},
                "min_strength": {"type": "number"},
                "timeout_ms": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetKnowledgeGraphInput = parse_input(input)?;
            let entity = resolve_entity(&ctx, req.entity_id, req.entity_name).await?;
            let deadline = Instant::now() + Duration::from_millis(req.timeout_ms.unwrap_or(DEFAULT_TRAVERSAL_TIMEOUT_MS));

            let paths = ctx
                .repos
                .graph
                .traverse(&entity.id, req.max_depth.unwrap_or(3), req.min_strength.unwrap_or(0.0), Some(deadline))
                .await?;

            let paths_json: Vec<Json> = paths
                .iter()
                .map(|path| {
                    let steps: Vec<Json> = path
                        .steps
                        .iter()
                        .map(|step| {
                            json!({
                                "entity_id": step.entity_id.as_str(),
                                "via": step.via.as_ref().map(|rel| json!({
                                    "relationship_id": rel.id.as_str(),
                                    "source_entity_id": rel.source_entity_id.as_str(),
                                    "target_entity_id": rel.target_entity_id.as_str(),
                                    "relationship_type": rel.relationship_type.as_str(),
                                    "strength": rel.strength,
                                })),
                            })
                        })
                        .collect();
                    json!({ "depth": path.depth(), "steps": steps })
                })
                .collect();

            Ok(json!({
                "root": entity_json(&entity)?,
                "paths": paths_json,
            }))
        })
    }
}

/// Tag a conversation's metadata with the normalized names of its
/// most-mentioned entities.
pub struct AutoTagConversation {
    ctx: AppContext,
}

impl AutoTagConversation {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct AutoTagConversationInput {
    conversation_id: String,
    #[serde(default)]
    max_tags: Option<u32>,
}

const DEFAULT_MAX_TAGS: u32 = 10;

impl ToolDyn for AutoTagConversation {
    fn name(&self) -> &str {
        "auto_tag_conversation"
    }

    fn description(&self) -> &str {
        "Derive tags for a conversation from its most frequently mentioned entities and merge them into its metadata"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "max_tags": {"type": "integer"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: AutoTagConversationInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);
            let max_tags = req.max_tags.unwrap_or(DEFAULT_MAX_TAGS);
            let conversation = ctx.repos.conversations.find_by_id(&cid).await?;

            let conversation_id_str = cid.as_str().to_string();
            let tags = ctx
                .pool
                .with_connection(None, move |store| {
                    let conn = store.conn();
                    let mut stmt = conn
                        .prepare(
                            "SELECT e.normalized_name, e.type, COUNT(*) AS hits
                             FROM entity_mentions em
                             JOIN messages m ON m.id = em.message_id
                             JOIN entities e ON e.id = em.entity_id
                             WHERE m.conversation_id = ?1
                             GROUP BY e.id
                             ORDER BY hits DESC
                             LIMIT ?2",
                        )
                        .map_err(from_rusqlite)?;
                    let rows = stmt
                        .query_map(params![conversation_id_str, max_tags], |row| {
                            let name: String = row.get(0)?;
                            let entity_type: String = row.get(1)?;
                            Ok(format!("{entity_type}:{name}"))
                        })
                        .map_err(from_rusqlite)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(from_rusqlite)
                })
                .await?;

            let mut metadata = conversation.metadata.clone();
            let object = metadata.as_object_mut().ok_or_else(|| ChronicleError::Internal("conversation metadata is not a JSON object".to_string()))?;
            object.insert("tags".to_string(), json!(tags));
            ctx.repos.conversations.update_metadata(&cid, metadata.clone()).await?;

            Ok(json!({ "conversation_id": cid.as_str(), "tags": tags }))
        })
    }
}

#[allow(dead_code)]
fn _assert_entity_type_in_scope(_: EntityType) {}
