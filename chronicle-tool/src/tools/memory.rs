//! `get_context_summary`, `get_progressive_detail`,
//! `suggest_relevant_context`.

use crate::context::AppContext;
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_context::{AssembleRequest, AssemblyStrategy};
use chronicle_repo::MessagePage;
use chronicle_types::{ChronicleError, ConversationId, SummaryLevel};
use serde::Deserialize;
use serde_json::{json, Value as Json};

/// Fetch the most recently generated summary of a conversation at a
/// given level of detail.
pub struct GetContextSummary {
    ctx: AppContext,
}

impl GetContextSummary {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetContextSummaryInput {
    conversation_id: String,
    #[serde(default)]
    level: Option<String>,
}

fn parse_level(level: Option<&str>) -> SummaryLevel {
    match level {
        Some("brief") => SummaryLevel::Brief,
        Some("detailed") => SummaryLevel::Detailed,
        Some("full") => SummaryLevel::Full,
        _ => SummaryLevel::Standard,
    }
}

impl ToolDyn for GetContextSummary {
    fn name(&self) -> &str {
        "get_context_summary"
    }

    fn description(&self) -> &str {
        "Fetch the most recently generated summary of a conversation at a given level of detail"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "level": {"type": "string", "enum": ["brief", "standard", "detailed", "full"]}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetContextSummaryInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);
            let level = parse_level(req.level.as_deref());
            let summary = ctx.repos.summaries.latest_for(&cid, level).await?;
            match summary {
                Some(summary) => Ok(json!({ "summary": to_json(&summary)? })),
                None => Err(ChronicleError::NotFound(format!("no {level:?} summary for conversation {cid}"))),
            }
        })
    }
}

/// Either a stored summary at the requested level, or (for `"full"`)
/// the raw message transcript.
pub struct GetProgressiveDetail {
    ctx: AppContext,
}

impl GetProgressiveDetail {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct GetProgressiveDetailInput {
    conversation_id: String,
    #[serde(default)]
    level: Option<String>,
}

impl ToolDyn for GetProgressiveDetail {
    fn name(&self) -> &str {
        "get_progressive_detail"
    }

    fn description(&self) -> &str {
        "Fetch a conversation at increasing levels of detail, from a brief summary up to the full raw transcript"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "conversation_id": {"type": "string"},
                "level": {"type": "string", "enum": ["brief", "standard", "detailed", "full"]}
            },
            "required": ["conversation_id"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: GetProgressiveDetailInput = parse_input(input)?;
            let cid = ConversationId::new(req.conversation_id);

            if req.level.as_deref() == Some("full") {
                let page = MessagePage {
                    limit: 500,
                    before_id: None,
                    after_id: None,
                };
                let messages = ctx.repos.messages.find_by_conversation_id(&cid, page).await?;
                return Ok(json!({ "level": "full", "messages": to_json(&messages)? }));
            }

            let level = parse_level(req.level.as_deref());
            let summary = ctx.repos.summaries.latest_for(&cid, level).await?;
            match summary {
                Some(summary) => Ok(json!({ "level": level.as_str(), "summary": to_json(&summary)? })),
                None => Err(ChronicleError::NotFound(format!("no {level:?} summary for conversation {cid}"))),
            }
        })
    }
}

/// Assemble a token-budgeted context window relevant to a query.
pub struct SuggestRelevantContext {
    ctx: AppContext,
}

impl SuggestRelevantContext {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct SuggestRelevantContextInput {
    query: String,
    conversation_ids: Vec<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    min_relevance: Option<f64>,
    #[serde(default)]
    focus_entities: Vec<String>,
    #[serde(default)]
    time_window: Option<(i64, i64)>,
}

fn parse_strategy(strategy: Option<&str>) -> AssemblyStrategy {
    match strategy {
        Some("temporal") => AssemblyStrategy::Temporal,
        Some("topical") => AssemblyStrategy::Topical,
        Some("entity_centric") => AssemblyStrategy::EntityCentric,
        _ => AssemblyStrategy::Hybrid,
    }
}

impl ToolDyn for SuggestRelevantContext {
    fn name(&self) -> &str {
        "suggest_relevant_context"
    }

    fn description(&self) -> &str {
        "Assemble a token-budgeted context window relevant to a query across one or more conversations"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "conversation_ids": {"type": "array", "items": {"type": "string"}},
                "max_tokens": {"type": "integer"},
                "strategy": {"type": "string", "enum": ["temporal", "topical", "entity_centric", "hybrid"]},
                "min_relevance": {"type": "number"},
                "focus_entities": {"type": "array", "items": {"type": "string"}},
                "time_window": {"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 2}
            },
            "required": ["query", "conversation_ids"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SuggestRelevantContextInput = parse_input(input)?;
            let request = AssembleRequest {
                query: req.query,
                max_tokens: req.max_tokens.unwrap_or(2000),
                strategy: parse_strategy(req.strategy.as_deref()),
                conversation_ids: req.conversation_ids.into_iter().map(ConversationId::new).collect(),
                min_relevance: req.min_relevance.unwrap_or(0.0),
                include_recent: true,
                focus_entities: req.focus_entities,
                time_window: req.time_window,
            };
            let assembled = ctx.assembler.assemble(request).await?;
            Ok(json!({
                "text": assembled.text,
                "token_count": assembled.token_count,
                "token_breakdown": {
                    "messages": assembled.token_breakdown.messages,
                    "summaries": assembled.token_breakdown.summaries,
                    "metadata": assembled.token_breakdown.metadata,
                    "buffer": assembled.token_breakdown.buffer,
                },
                "strategy": assembled.strategy.as_str(),
                "candidates_considered": assembled.candidates_considered,
                "included_items": assembled.included_items.iter().map(|item| json!({
                    "kind": item.kind,
                    "id": item.id,
                    "conversation_id": item.conversation_id.as_str(),
                    "token_count": item.token_count,
                    "score": item.score,
                })).collect::<Vec<_>>(),
            }))
        })
    }
}
