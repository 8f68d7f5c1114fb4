//! Typed repository layer over the storage
//! substrate in `chronicle-store`. Each repository owns one table
//! family, accepts and returns `chronicle-types` domain objects, and
//! goes through a shared [`chronicle_store::ConnectionPool`] so callers
//! never touch `rusqlite` directly.

pub mod analytics;
pub mod conversation;
pub mod entity;
pub mod graph;
pub mod message;
pub mod provider;
pub mod summary;
mod util;

pub use analytics::{
    ConversationAnalyticsRepository, DecisionTrackingRepository, InsightRepository,
    KnowledgeGapRepository, ProductivityPatternRepository, TopicEvolutionRepository,
};
pub use conversation::{ConversationRepository, Direction, OrderBy};
pub use entity::EntityRepository;
pub use graph::{GraphPath, KnowledgeGraphRepository, TraversalStep};
pub use message::{blank_conversation, MessagePage, MessageRepository};
pub use provider::ProviderConfigRepository;
pub use summary::SummaryRepository;
pub use util::{decode_embedding, encode_embedding};

use chronicle_store::{ConnectionPool, QueryCache};
use std::sync::Arc;

/// Every repository bundled together, constructed once from a shared
/// pool and cache and handed to callers (the tool registry, the
/// context assembler, the knowledge-graph service) as a single unit.
#[derive(Clone)]
pub struct Repositories {
    /// Conversations.
    pub conversations: Arc<ConversationRepository>,
    /// Messages.
    pub messages: Arc<MessageRepository>,
    /// Conversation summaries and the assembled-context cache.
    pub summaries: Arc<SummaryRepository>,
    /// Knowledge-graph entities.
    pub entities: Arc<EntityRepository>,
    /// Knowledge-graph relationships and traversal.
    pub graph: Arc<KnowledgeGraphRepository>,
    /// LLM/embedding provider configuration.
    pub providers: Arc<ProviderConfigRepository>,
    /// Per-conversation engagement/depth snapshots.
    pub conversation_analytics: Arc<ConversationAnalyticsRepository>,
    /// Time-windowed productivity scoring.
    pub productivity_patterns: Arc<ProductivityPatternRepository>,
    /// Recurring unresolved topics.
    pub knowledge_gaps: Arc<KnowledgeGapRepository>,
    /// Decision lifecycle tracking.
    pub decisions: Arc<DecisionTrackingRepository>,
    /// Proactively surfaced insights.
    pub insights: Arc<InsightRepository>,
    /// Topic prevalence and circularity over time.
    pub topic_evolution: Arc<TopicEvolutionRepository>,
}

impl Repositories {
    /// Build every repository over one shared pool and query cache.
    pub fn new(pool: ConnectionPool, cache: Arc<QueryCache>) -> Self {
        Self {
            conversations: Arc::new(ConversationRepository::new(pool.clone(), cache.clone())),
            messages: Arc::new(MessageRepository::new(pool.clone(), cache.clone())),
            summaries: Arc::new(SummaryRepository::new(pool.clone(), cache.clone())),
            entities: Arc::new(EntityRepository::new(pool.clone(), cache.clone())),
            graph: Arc::new(KnowledgeGraphRepository::new(pool.clone(), cache.clone())),
            providers: Arc::new(ProviderConfigRepository::new(pool.clone(), cache)),
            conversation_analytics: Arc::new(ConversationAnalyticsRepository::new(pool.clone())),
            productivity_patterns: Arc::new(ProductivityPatternRepository::new(pool.clone())),
            knowledge_gaps: Arc::new(KnowledgeGapRepository::new(pool.clone())),
            decisions: Arc::new(DecisionTrackingRepository::new(pool.clone())),
            insights: Arc::new(InsightRepository::new(pool.clone())),
            topic_evolution: Arc::new(TopicEvolutionRepository::new(pool)),
        }
    }
}
