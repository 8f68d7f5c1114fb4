//! Tool-layer wiring for the conversation-memory service: the
//! object-safe [`ToolDyn`]/[`ToolRegistry`] abstraction, the JSON
//! result envelope, the shared [`AppContext`] every handler runs
//! over, and the 23 handlers themselves grouped under [`tools`].

pub mod context;
pub mod dto;
pub mod envelope;
pub mod registry;
pub mod tools;

pub use context::{now_millis, AppContext, FeatureFlags};
pub use dto::{normalize_name, parse_input, to_json};
pub use envelope::ToolEnvelope;
pub use registry::{BoxFuture, ToolDyn, ToolRegistry, ToolStatsSnapshot};

use std::sync::Arc;

/// Build a registry with every conversation-memory tool registered
/// under its stable name. `HealthCheck` is deliberately not
/// among them — it is [`ToolRegistry::health_check`], since it needs a
/// reference to the registry that would own it as a tool.
pub fn build_registry(ctx: AppContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(tools::conversation::SaveMessage::new(ctx.clone())));
    registry.register(Arc::new(tools::conversation::GetConversation::new(ctx.clone())));
    registry.register(Arc::new(tools::conversation::GetConversations::new(ctx.clone())));
    registry.register(Arc::new(tools::conversation::DeleteConversation::new(ctx.clone())));

    registry.register(Arc::new(tools::search::SearchMessages::new(ctx.clone())));
    registry.register(Arc::new(tools::search::SemanticSearch::new(ctx.clone())));
    registry.register(Arc::new(tools::search::HybridSearch::new(ctx.clone())));
    registry.register(Arc::new(tools::search::GetRelevantSnippets::new(ctx.clone())));

    registry.register(Arc::new(tools::memory::GetContextSummary::new(ctx.clone())));
    registry.register(Arc::new(tools::memory::GetProgressiveDetail::new(ctx.clone())));
    registry.register(Arc::new(tools::memory::SuggestRelevantContext::new(ctx.clone())));

    registry.register(Arc::new(tools::graph::GetEntityHistory::new(ctx.clone())));
    registry.register(Arc::new(tools::graph::FindRelatedConversations::new(ctx.clone())));
    registry.register(Arc::new(tools::graph::GetKnowledgeGraph::new(ctx.clone())));
    registry.register(Arc::new(tools::graph::AutoTagConversation::new(ctx.clone())));

    registry.register(Arc::new(tools::provider::ConfigureLlmProvider::new(ctx.clone())));

    registry.register(Arc::new(tools::insights::GetProactiveInsights::new(ctx.clone())));
    registry.register(Arc::new(tools::insights::CheckForConflicts::new(ctx.clone())));

    registry.register(Arc::new(tools::analytics::GetConversationAnalytics::new(ctx.clone())));
    registry.register(Arc::new(tools::analytics::AnalyzeProductivityPatterns::new(ctx.clone())));
    registry.register(Arc::new(tools::analytics::DetectKnowledgeGaps::new(ctx.clone())));
    registry.register(Arc::new(tools::analytics::TrackDecisionEffectiveness::new(ctx.clone())));
    registry.register(Arc::new(tools::analytics::GenerateAnalyticsReport::new(ctx)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_context::ContextAssembler;
    use chronicle_graph::KnowledgeGraphService;
    use chronicle_repo::Repositories;
    use chronicle_search::{InMemoryVectorIndex, SearchEngine};
    use chronicle_store::{ConnectionPool, QueryCache};

    fn test_context() -> AppContext {
        let pool = ConnectionPool::open_in_memory(2).expect("open pool");
        let cache = Arc::new(QueryCache::new());
        let repos = Repositories::new(pool.clone(), cache.clone());
        let vector = Arc::new(InMemoryVectorIndex::new(pool.clone()));
        let search = Arc::new(SearchEngine::new(pool.clone(), vector));
        let assembler = Arc::new(ContextAssembler::new(repos.messages.clone(), repos.summaries.clone()));
        let graph = Arc::new(KnowledgeGraphService::new(repos.entities.clone(), repos.graph.clone(), cache.clone()));

        AppContext {
            repos,
            search,
            assembler,
            graph,
            cache,
            pool,
            features: FeatureFlags::default(),
        }
    }

    #[test]
    fn every_specified_tool_is_registered() {
        let registry = build_registry(test_context());
        let expected = [
            "save_message",
            "search_messages",
            "get_conversation",
            "get_conversations",
            "delete_conversation",
            "semantic_search",
            "hybrid_search",
            "get_context_summary",
            "get_relevant_snippets",
            "configure_llm_provider",
            "get_progressive_detail",
            "get_entity_history",
            "find_related_conversations",
            "get_knowledge_graph",
            "get_proactive_insights",
            "check_for_conflicts",
            "suggest_relevant_context",
            "auto_tag_conversation",
            "get_conversation_analytics",
            "analyze_productivity_patterns",
            "detect_knowledge_gaps",
            "track_decision_effectiveness",
            "generate_analytics_report",
        ];
        assert_eq!(registry.len(), expected.len());
        for name in expected {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
    }

    #[tokio::test]
    async fn save_message_then_search_round_trips() {
        let ctx = test_context();
        let registry = build_registry(ctx);

        let save = registry
            .execute(
                "save_message",
                serde_json::json!({"role": "user", "content": "WAL mode makes SQLite concurrency much better"}),
            )
            .await;
        assert_eq!(save.body["success"], true);

        let search = registry.execute("search_messages", serde_json::json!({"query": "WAL SQLite"})).await;
        assert_eq!(search.body["success"], true);
        assert!(search.body["data"]["results"].as_array().map(|a| !a.is_empty()).unwrap_or(false));
    }
}
