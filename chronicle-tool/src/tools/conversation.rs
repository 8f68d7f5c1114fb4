//! `save_message`, `get_conversation`, `get_conversations`,
//! `delete_conversation`.

use crate::context::{now_millis, AppContext};
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_repo::message::blank_conversation;
use chronicle_repo::{Direction, MessagePage, OrderBy};
use chronicle_types::{ChronicleError, Conversation, ConversationId, Message, MessageId, MessageRole};
use serde::Deserialize;
use serde_json::{json, Value as Json};

/// Persist a message, creating its conversation first if
/// `conversation_id` is absent, then (if enabled) run knowledge-graph
/// ingestion on it.
pub struct SaveMessage {
    ctx: AppContext,
}

impl SaveMessage {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct SaveMessageInput {
    conversation_id: Option<String>,
    role: String,
    content: String,
    #[serde(default)]
    parent_message_id: Option<String>,
    #[serde(default)]
    metadata: Option<Json>,
    #[serde(default)]
    created_at: Option<i64>,
}

impl ToolDyn for SaveMessage {
    fn name(&self) -> &str {
        "save_message"
    }

    fn description(&self) -> &str {
        "Persist a message, creating its conversation if one isn't given, and ingest it into the knowledge graph"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "role": {"type": "string", "enum": ["user", "assistant", "system"]},
                "content": {"type": "string"},
                "parent_message_id": {"type": "string"},
                "metadata": {"type": "object"},
                "created_at": {"type": "integer"}
            },
            "required": ["role", "content"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SaveMessageInput = parse_input(input)?;
            let role = MessageRole::parse(&req.role)
                .ok_or_else(|| ChronicleError::validation_field("role", "must be one of user, assistant, system"))?;
            let now = now_millis();
            let created_at = req.created_at.unwrap_or(now);

            let conversation_id = match req.conversation_id {
                Some(id) => {
                    let cid = ConversationId::new(id);
                    ctx.repos.conversations.find_by_id(&cid).await?;
                    cid
                }
                None => {
                    let conversation = blank_conversation(ConversationId::generate().into_inner(), now);
                    ctx.repos.conversations.create(conversation).await?.id
                }
            };

            let message = Message {
                id: MessageId::generate(),
                conversation_id,
                role,
                content: req.content,
                created_at,
                parent_message_id: req.parent_message_id.map(MessageId::new),
                metadata: req.metadata.unwrap_or_else(|| json!({})),
                embedding: None,
            };
            let saved = ctx.repos.messages.create(message).await?;

            let mut data = json!({ "message": to_json(&saved)? });
            if ctx.features.enable_knowledge_graph {
                let outcome = ctx.graph.ingest_message(&saved.id, &saved.content, created_at).await?;
                data["entities_extracted"] = json!(outcome.entities.len());
                data["relationships_detected"] = json!(outcome.relationships.len());
            }
            Ok(data)
        })
    }
}

/// Fetch a conversation together with a page of its messages.
pub struct GetConversation {
    ctx: AppContext,
}

impl GetConversation {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetConversationInput {
    conversation_id: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    before_id: Option<String>,
    #[serde(default)]
    after_id: Option<String>,
}

impl ToolDyn for GetConversation {
    fn name(&self) -> &str {
        "get_conversation"
    }

    fn description(&self) -> &str {
        "Fetch a conversation and a page of its messages"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "limit": {"type": "integer"},
                "before_id": {"type": "string"},
                "after_id": {"type": "string"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetConversationInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);
            let conversation = ctx.repos.conversations.find_by_id(&cid).await?;
            let page = MessagePage {
                limit: req.limit.unwrap_or(100),
                before_id: req.before_id.map(MessageId::new),
                after_id: req.after_id.map(MessageId::new),
            };
            let messages = ctx.repos.messages.find_by_conversation_id(&cid, page).await?;
            Ok(json!({
                "conversation": to_json(&conversation)?,
                "messages": to_json(&messages)?,
            }))
        })
    }
}

/// List conversations, optionally bounded to a date range.
pub struct GetConversations {
    ctx: AppContext,
}

impl GetConversations {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetConversationsInput {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    order_by: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    end: Option<i64>,
}

impl ToolDyn for GetConversations {
    fn name(&self) -> &str {
        "get_conversations"
    }

    fn description(&self) -> &str {
        "List conversations, paginated and ordered, optionally bounded to a creation-date range"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer"},
                "offset": {"type": "integer"},
                "order_by": {"type": "string", "enum": ["created_at", "updated_at"]},
                "direction": {"type": "string", "enum": ["asc", "desc"]},
                "start": {"type": "integer"},
                "end": {"type": "integer"}
            }
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetConversationsInput = parse_input(input)?;
            let limit = req.limit.unwrap_or(20);
            let offset = req.offset.unwrap_or(0);
            let order_by = match req.order_by.as_deref() {
                Some("created_at") => OrderBy::CreatedAt,
                _ => OrderBy::UpdatedAt,
            };
            let direction = match req.direction.as_deref() {
                Some("asc") => Direction::Asc,
                _ => Direction::Desc,
            };

            let page = match (req.start, req.end) {
                (Some(start), Some(end)) => ctx.repos.conversations.find_by_date_range(start, end, limit, offset).await?,
                _ => ctx.repos.conversations.find_all(limit, offset, order_by, direction).await?,
            };
            to_json(&page)
        })
    }
}

/// Soft- or hard-delete a conversation.
pub struct DeleteConversation {
    ctx: AppContext,
}

impl DeleteConversation {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct DeleteConversationInput {
    conversation_id: String,
    #[serde(default)]
    permanent: bool,
}

impl ToolDyn for DeleteConversation {
    fn name(&self) -> &str {
        "delete_conversation"
    }

    fn description(&self) -> &str {
        "Delete a conversation, either soft (marks deleted) or permanent (cascades to its messages and summaries)"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "permanent": {"type": "boolean"}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: DeleteConversationInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);
            ctx.repos.conversations.delete(&cid, req.permanent).await?;
            Ok(json!({ "deleted": true, "permanent": req.permanent }))
        })
    }
}

#[allow(dead_code)]
fn _assert_model_in_scope(_: &Conversation) {}
