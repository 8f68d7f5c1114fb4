//! Composition root and CLI for the `chronicle` conversation-memory
//! MCP server.
//!
//! Builds the process-wide singletons — ToolRegistry, ConnectionPool,
//! QueryCache, and the migration-registered schema version — exactly
//! once, here, and passes them down by reference — mirroring how
//! `neuron`'s facade wires its feature-gated collaborators, scaled down
//! to one fixed composition since `chronicle` has no optional backends
//! to feature-gate.

mod config;

use anyhow::{Context, Result};
use chronicle_context::ContextAssembler;
use chronicle_graph::KnowledgeGraphService;
use chronicle_mcp::McpServer;
use chronicle_repo::Repositories;
use chronicle_search::{DisabledVectorIndex, InMemoryVectorIndex, SearchEngine, VectorIndex};
use chronicle_store::{ConnectionPool, QueryCache, Store, StoreConfig};
use chronicle_tool::{build_registry, AppContext, FeatureFlags as ToolFeatureFlags};
use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A persistent conversation-memory service that speaks MCP over
/// stdio.
#[derive(Parser, Debug)]
#[command(name = "chronicle", version, about, long_about = None)]
struct Cli {
    /// Run startup, report store/tool health, and exit — 0 if healthy,
    /// 1 otherwise. Does not start the stdio server.
    #[arg(long)]
    health_check: bool,

    /// Override `PERSISTENCE_DB_PATH`.
    #[arg(long)]
    db_path: Option<String>,

    /// Override the tracing log level (`error`, `warn`, `info`,
    /// `debug`, `trace`).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env().with_overrides(cli.db_path.clone(), cli.log_level.clone());

    init_logging(&config.log_level);

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    rt.block_on(async_main(config, cli.health_check))
}

async fn async_main(config: Config, health_check: bool) -> ExitCode {
    let ctx = match build_context(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::from(1);
        }
    };

    let registry = build_registry(ctx.clone());

    if health_check {
        let report = registry.health_check(&ctx.pool).await;
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return if report["healthy"].as_bool().unwrap_or(false) {
            ExitCode::from(0)
        } else {
            ExitCode::from(1)
        };
    }

    if config.features.enable_maintenance_task {
        tokio::spawn(run_maintenance_task(ctx.pool.clone()));
    }

    let server = McpServer::new(registry, "chronicle", env!("CARGO_PKG_VERSION"));
    match server.serve_stdio().await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            tracing::error!(error = %e, "mcp server terminated with an error");
            ExitCode::from(2)
        }
    }
}

/// Build every collaborator `chronicle-tool` needs, once, from
/// `config`. This is the binary's only place that knows every crate in
/// the workspace exists.
fn build_context(config: &Config) -> Result<AppContext> {
    let db_path = PathBuf::from(&config.db_path);
    let store_config = StoreConfig {
        cache_size_kb: config.cache_size_kb,
        ..StoreConfig::default()
    };

    let pool = ConnectionPool::open(&db_path, &store_config, config.min_connections, config.max_connections)
        .with_context(|| format!("opening store at {}", db_path.display()))?;

    let cache = Arc::new(QueryCache::with_limits(10_000, std::time::Duration::from_millis(config.query_cache_ttl_ms)));
    let repos = Repositories::new(pool.clone(), cache.clone());

    let vector: Arc<dyn VectorIndex> = if config.features.enable_vector_index {
        Arc::new(InMemoryVectorIndex::new(pool.clone()))
    } else {
        Arc::new(DisabledVectorIndex)
    };
    let search = Arc::new(SearchEngine::new(pool.clone(), vector));
    let assembler = Arc::new(ContextAssembler::new(repos.messages.clone(), repos.summaries.clone()));
    let graph = Arc::new(KnowledgeGraphService::new(repos.entities.clone(), repos.graph.clone(), cache.clone()));

    Ok(AppContext {
        repos,
        search,
        assembler,
        graph,
        cache,
        pool,
        features: ToolFeatureFlags {
            enable_knowledge_graph: config.features.enable_knowledge_graph,
            enable_vector_index: config.features.enable_vector_index,
            enable_analytics: config.features.enable_analytics,
        },
    })
}

/// Periodic `checkpoint`/`analyze`/`vacuum` pass, opt-in via
/// `enableMaintenanceTask` since nothing else in the store triggers
/// these on its own. Runs for the lifetime of the process;
/// a failed pass is logged and the loop continues rather than tearing
/// down the server over a maintenance hiccup.
async fn run_maintenance_task(pool: ConnectionPool) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    interval.tick().await; // first tick fires immediately; skip it
    loop {
        interval.tick().await;
        let outcome = pool
            .with_connection(None, |store| {
                store.checkpoint()?;
                store.analyze()?;
                store.vacuum()?;
                Ok(())
            })
            .await;
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "periodic maintenance pass failed");
        } else {
            tracing::debug!("periodic maintenance pass completed");
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// `Store::open_in_memory` wrapped so `fn main`'s `--health-check`
/// smoke test has no disk footprint; kept out of `build_context` since
/// production startup always goes through [`ConnectionPool::open`].
#[cfg(test)]
fn in_memory_context() -> AppContext {
    let pool = ConnectionPool::open_in_memory(2).expect("open in-memory pool");
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
        features: ToolFeatureFlags::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_health_check_flag() {
        let cli = Cli::parse_from(["chronicle", "--health-check"]);
        assert!(cli.health_check);
        assert!(cli.db_path.is_none());
    }

    #[test]
    fn cli_parses_db_path_and_log_level_overrides() {
        let cli = Cli::parse_from(["chronicle", "--db-path", "/tmp/x.db", "--log-level", "debug"]);
        assert_eq!(cli.db_path.as_deref(), Some("/tmp/x.db"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn default_mode_runs_neither_flag() {
        let cli = Cli::parse_from(["chronicle"]);
        assert!(!cli.health_check);
    }

    #[tokio::test]
    async fn health_check_reports_healthy_on_fresh_in_memory_store() {
        let ctx = in_memory_context();
        let registry = build_registry(ctx.clone());
        let report = registry.health_check(&ctx.pool).await;
        assert_eq!(report["healthy"], true);
        assert_eq!(report["store_reachable"], true);
    }

    #[test]
    fn build_context_fails_fast_when_parent_is_not_a_directory() {
        // `fs::create_dir_all` fails deterministically (regardless of
        // the running user's privileges) when a path component that
        // must be a directory is instead an existing regular file.
        let dir = tempfile::tempdir().unwrap();
        let blocking_file = dir.path().join("not_a_directory");
        std::fs::write(&blocking_file, b"").unwrap();
        let db_path = blocking_file.join("sub").join("chronicle.db");

        let config = Config {
            db_path: db_path.to_string_lossy().into_owned(),
            ..Config::default()
        };
        assert!(build_context(&config).is_err());
    }

    #[test]
    fn build_context_succeeds_against_a_real_on_disk_path() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("chronicle.db");
        let config = Config {
            db_path: db_path.to_string_lossy().into_owned(),
            max_connections: 2,
            min_connections: 1,
            ..Config::default()
        };
        let ctx = build_context(&config).expect("build context against a writable path");
        assert!(db_path.exists());
        drop(ctx);
    }
}
