//! The collaborators every tool handler is built over. The only
//! process-wide state is the `ToolRegistry`, `ConnectionPool`,
//! `QueryCache`, and the migration-registered schema version — all
//! constructed once by an explicit composition root and passed down
//! by reference, never as ambient singletons.

use chronicle_context::ContextAssembler;
use chronicle_graph::KnowledgeGraphService;
use chronicle_repo::Repositories;
use chronicle_search::SearchEngine;
use chronicle_store::{ConnectionPool, QueryCache};
use std::sync::Arc;

/// Feature toggles read from configuration at startup. Tools consult
/// these instead of hardcoding behavior, so a deployment can run
/// FTS-only or skip knowledge-graph ingestion without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    /// Whether `save_message` also runs entity extraction and
    /// relationship detection.
    pub enable_knowledge_graph: bool,
    /// Whether the vector index is consulted by `semantic_search`/
    /// `hybrid_search`. When `false`, those tools always fall back to
    /// full-text search.
    pub enable_vector_index: bool,
    /// Whether analytics tools are enabled at all.
    pub enable_analytics: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_knowledge_graph: true,
            enable_vector_index: true,
            enable_analytics: true,
        }
    }
}

/// Everything a tool handler needs: repositories, the search/context/
/// graph services built over them, the shared cache and pool, and
/// feature flags. Cloning an `AppContext` clones only `Arc`s and the
/// pool's internal handle, never the underlying connections.
#[derive(Clone)]
pub struct AppContext {
    /// Typed repository layer.
    pub repos: Repositories,
    /// Full-text/vector/hybrid search.
    pub search: Arc<SearchEngine>,
    /// Token-budgeted context assembly.
    pub assembler: Arc<ContextAssembler>,
    /// Entity/relationship ingestion.
    pub graph: Arc<KnowledgeGraphService>,
    /// Process-local query-result cache.
    pub cache: Arc<QueryCache>,
    /// The bounded connection pool every repository is built over.
    pub pool: ConnectionPool,
    /// Feature toggles.
    pub features: FeatureFlags,
}

/// Milliseconds since the Unix epoch, the timestamp unit used
/// throughout the data model.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
