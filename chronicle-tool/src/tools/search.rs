//! `search_messages`, `semantic_search`, `hybrid_search`,
//! `get_relevant_snippets`.

use crate::context::{now_millis, AppContext};
use crate::dto::{parse_input, to_json};
use crate::registry::{BoxFuture, ToolDyn};
use chronicle_search::{SearchRequest, SearchStrategy};
use chronicle_types::{ChronicleError, ConversationId};
use serde::Deserialize;
use serde_json::{json, Value as Json};

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    query_embedding: Option<Vec<f32>>,
}

async fn run_search(ctx: &AppContext, req: SearchInput, strategy: SearchStrategy) -> Result<Json, ChronicleError> {
    let request = SearchRequest {
        query: req.query,
        query_embedding: req.query_embedding,
        conversation_id: req.conversation_id.map(ConversationId::new),
        strategy,
        limit: req.limit.unwrap_or(20),
    };
    let outcome = ctx.search.search(request, now_millis()).await?;

    let mut hits = Vec::with_capacity(outcome.results.len());
    for scored in &outcome.results {
        let message = ctx.repos.messages.find_by_id(&scored.message_id).await?;
        hits.push(json!({
            "message": to_json(&message)?,
            "score": scored.score,
            "fts_rank": scored.fts_rank,
            "similarity": scored.similarity,
        }));
    }

    Ok(json!({
        "strategy_used": outcome.strategy_used.as_str(),
        "fallback_used": outcome.fallback_used,
        "fallback_reason": outcome.fallback_reason,
        "duration_ms": outcome.duration_ms,
        "results": hits,
    }))
}

fn search_schema() -> Json {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string"},
            "conversation_id": {"type": "string"},
            "limit": {"type": "integer"},
            "query_embedding": {"type": "array", "items": {"type": "number"}}
        },
        "required": ["query"]
    })
}

/// Full-text search over message content.
pub struct SearchMessages {
    ctx: AppContext,
}

impl SearchMessages {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

impl ToolDyn for SearchMessages {
    fn name(&self) -> &str {
        "search_messages"
    }

    fn description(&self) -> &str {
        "Full-text search over message content"
    }

    fn input_schema(&self) -> Json {
        search_schema()
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SearchInput = parse_input(input)?;
            run_search(&ctx, req, SearchStrategy::Fts).await
        })
    }
}

/// Embedding-similarity search over message content.
pub struct SemanticSearch {
    ctx: AppContext,
}

impl SemanticSearch {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

impl ToolDyn for SemanticSearch {
    fn name(&self) -> &str {
        "semantic_search"
    }

    fn description(&self) -> &str {
        "Embedding-similarity search over message content, falling back to full-text search if no vector index is available"
    }

    fn input_schema(&self) -> Json {
        search_schema()
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SearchInput = parse_input(input)?;
            run_search(&ctx, req, SearchStrategy::Semantic).await
        })
    }
}

/// Full-text and semantic search fused with the configured hybrid weights.
pub struct HybridSearch {
    ctx: AppContext,
}

impl HybridSearch {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

impl ToolDyn for HybridSearch {
    fn name(&self) -> &str {
        "hybrid_search"
    }

    fn description(&self) -> &str {
        "Fuse full-text and semantic search results, falling back to full-text search alone if no vector index is available"
    }

    fn input_schema(&self) -> Json {
        search_schema()
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SearchInput = parse_input(input)?;
            run_search(&ctx, req, SearchStrategy::Hybrid).await
        })
    }
}

/// Full-text search that returns short content snippets rather than
/// whole messages, for quick relevance scanning.
pub struct GetRelevantSnippets {
    ctx: AppContext,
}

impl GetRelevantSnippets {
    /// Build the tool over the given context.
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[derive(Deserialize)]
struct SnippetsInput {
    query: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    snippet_len: Option<usize>,
}

const DEFAULT_SNIPPET_LEN: usize = 240;

impl ToolDyn for GetRelevantSnippets {
    fn name(&self) -> &str {
        "get_relevant_snippets"
    }

    fn description(&self) -> &str {
        "Full-text search returning truncated content snippets instead of whole messages"
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "conversation_id": {"type": "string"},
                "limit": {"type": "integer"},
                "snippet_len": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    fn call(&self, input: Json) -> BoxFuture<'_, Json> {
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let req: SnippetsInput = parse_input(input)?;
            let snippet_len = req.snippet_len.unwrap_or(DEFAULT_SNIPPET_LEN);
            let request = SearchRequest {
                query: req.query,
                query_embedding: None,
                conversation_id: req.conversation_id.map(ConversationId::new),
                strategy: SearchStrategy::Fts,
                limit: req.limit.unwrap_or(20),
            };
            let outcome = ctx.search.search(request, now_millis()).await?;

            let mut snippets = Vec::with_capacity(outcome.results.len());
            for scored in &outcome.results {
                let message = ctx.repos.messages.find_by_id(&scored.message_id).await?;
                let snippet: String = message.content.chars().take(snippet_len).collect();
                snippets.push(json!({
                    "message_id": message.id.as_str(),
                    "conversation_id": message.conversation_id.as_str(),
                    "snippet": snippet,
                    "score": scored.score,
                }));
            }
            Ok(json!({ "snippets": snippets }))
        })
    }
}
