//! Process configuration: read at startup from environment variables,
//! with documented defaults, as a plain struct plus a `Default` impl
//! rather than a macro-generated config layer.

/// Feature toggles read from the `enable*` environment variables.
#[derive(Debug, Clone, Copy)]
pub struct FeatureFlags {
    /// `enableConnectionPool` — reserved for deployments that want a
    /// single shared connection instead of a pool; the pool is always
    /// used today, so this only gates the periodic maintenance task.
    pub enable_connection_pool: bool,
    /// `enableQueryOptimization` — gates the query-result cache.
    pub enable_query_optimization: bool,
    /// `enableVectorIndex` — gates semantic/hybrid search.
    pub enable_vector_index: bool,
    /// `enableKnowledgeGraph` — gates entity/relationship ingestion on
    /// `save_message`.
    pub enable_knowledge_graph: bool,
    /// `enableAnalytics` — gates the analytics tool family.
    pub enable_analytics: bool,
    /// `enableMaintenanceTask` (supplemented, not in spec.md) — opt-in
    /// periodic `checkpoint`/`analyze`/`vacuum` from the composition
    /// root.
    pub enable_maintenance_task: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_connection_pool: true,
            enable_query_optimization: true,
            enable_vector_index: true,
            enable_knowledge_graph: true,
            enable_analytics: true,
            enable_maintenance_task: false,
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PERSISTENCE_DB_PATH`, default `./conversations.db`.
    pub db_path: String,
    /// Feature toggles.
    pub features: FeatureFlags,
    /// `maxConnections`, default 10.
    pub max_connections: usize,
    /// `minConnections`, default 2.
    pub min_connections: usize,
    /// `cacheSizeKB`, default 2000.
    pub cache_size_kb: u32,
    /// `queryCacheTTLms`, default 300000 (5 minutes).
    pub query_cache_ttl_ms: u64,
    /// `toolTimeoutMs`, default 30000.
    pub tool_timeout_ms: u64,
    /// Log level for `tracing-subscriber`, defaults to `info`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "./conversations.db".to_string(),
            features: FeatureFlags::default(),
            max_connections: 10,
            min_connections: 2,
            cache_size_kb: 2000,
            query_cache_ttl_ms: 300_000,
            tool_timeout_ms: 30_000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Read every value from its environment variable, falling back to
    /// the default when unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env_string("PERSISTENCE_DB_PATH", defaults.db_path),
            features: FeatureFlags {
                enable_connection_pool: env_bool("ENABLE_CONNECTION_POOL", defaults.features.enable_connection_pool),
                enable_query_optimization: env_bool(
                    "ENABLE_QUERY_OPTIMIZATION",
                    defaults.features.enable_query_optimization,
                ),
                enable_vector_index: env_bool("ENABLE_VECTOR_INDEX", defaults.features.enable_vector_index),
                enable_knowledge_graph: env_bool("ENABLE_KNOWLEDGE_GRAPH", defaults.features.enable_knowledge_graph),
                enable_analytics: env_bool("ENABLE_ANALYTICS", defaults.features.enable_analytics),
                enable_maintenance_task: env_bool(
                    "ENABLE_MAINTENANCE_TASK",
                    defaults.features.enable_maintenance_task,
                ),
            },
            max_connections: env_usize("MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_usize("MIN_CONNECTIONS", defaults.min_connections),
            cache_size_kb: env_u32("CACHE_SIZE_KB", defaults.cache_size_kb),
            query_cache_ttl_ms: env_u64("QUERY_CACHE_TTL_MS", defaults.query_cache_ttl_ms),
            tool_timeout_ms: env_u64("TOOL_TIMEOUT_MS", defaults.tool_timeout_ms),
            log_level: env_string("LOG_LEVEL", defaults.log_level),
        }
    }

    /// Apply CLI overrides (`--db-path`, `--log-level`) on top of
    /// whatever `from_env` produced, letting the binary run
    /// config-free for local testing.
    pub fn with_overrides(mut self, db_path: Option<String>, log_level: Option<String>) -> Self {
        if let Some(db_path) = db_path {
            self.db_path = db_path;
        }
        if let Some(log_level) = log_level {
            self.log_level = log_level;
        }
        self
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.db_path, "./conversations.db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.cache_size_kb, 2000);
        assert_eq!(config.query_cache_ttl_ms, 300_000);
        assert!(config.features.enable_vector_index);
        assert!(config.features.enable_knowledge_graph);
        assert!(!config.features.enable_maintenance_task);
    }

    #[test]
    fn overrides_replace_only_named_fields() {
        let config = Config::default().with_overrides(Some("/tmp/custom.db".to_string()), None);
        assert_eq!(config.db_path, "/tmp/custom.db");
        assert_eq!(config.log_level, "info");
    }
}
