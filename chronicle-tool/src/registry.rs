//! Object-safe tool abstraction and dynamic registry.
//!
//! Every tool is stored behind `Arc<dyn ToolDyn>` so the registry holds
//! a name-keyed, heterogeneously-typed collection with no inheritance
//! hierarchy — variants are enumerated by name, not by type.

use crate::envelope::ToolEnvelope;
use chronicle_store::{from_rusqlite, ConnectionPool};
use chronicle_types::ChronicleError;
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The future type every [`ToolDyn::call`] returns: boxed and pinned
/// because the natural `async fn` signature on a trait object is not
/// dyn-compatible, the same tradeoff `chronicle_search::VectorIndex`
/// makes.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChronicleError>> + Send + 'a>>;

/// Object-safe tool implementation.
pub trait ToolDyn: Send + Sync {
    /// The tool's unique, stable name.
    fn name(&self) -> &str;

    /// Human-readable description, surfaced to MCP clients via
    /// `list_tools`.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> Json;

    /// Validate `input` and run. Implementations call into
    /// `chronicle_types::validation` (directly or via a repository)
    /// before any write reaches the store, so a malformed request
    /// surfaces as `ChronicleError::Validation` rather than a panic.
    fn call(&self, input: Json) -> BoxFuture<'_, Json>;
}

/// Call counters for one tool, updated atomically so concurrent
/// executions never race.
#[derive(Default)]
struct ToolStats {
    calls: AtomicU64,
    errors: AtomicU64,
    total_time_ms: AtomicU64,
}

impl ToolStats {
    fn record(&self, elapsed_ms: u64, failed: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.total_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ToolStatsSnapshot {
        ToolStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            total_time_ms: self.total_time_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of one tool's call counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolStatsSnapshot {
    /// Total calls made.
    pub calls: u64,
    /// Calls that returned an error.
    pub errors: u64,
    /// Cumulative wall-clock time spent in this tool, in milliseconds.
    pub total_time_ms: u64,
}

struct Registered {
    tool: Arc<dyn ToolDyn>,
    stats: ToolStats,
}

/// Name-keyed collection of tools.
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool, compiling nothing eagerly — `input_schema` is
    /// read fresh on every `list_tools` call. Overwrites any existing
    /// tool under the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolDyn>) {
        let name = tool.name().to_string();
        self.tools.insert(
            name,
            Registered {
                tool,
                stats: ToolStats::default(),
            },
        );
    }

    /// Look up a tool by name without executing it.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolDyn>> {
        self.tools.get(name).map(|r| &r.tool)
    }

    /// Iterate over every registered tool.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ToolDyn>> {
        self.tools.values().map(|r| &r.tool)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, run, and time a tool call, translating the outcome into
    /// the `{success, data|error, message, details?}` envelope.
    pub async fn execute(&self, name: &str, input: Json) -> ToolEnvelope {
        let Some(registered) = self.tools.get(name) else {
            return ToolEnvelope::from_error(&ChronicleError::ToolNotFound(name.to_string()));
        };

        let start = Instant::now();
        let result = registered.tool.call(input).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        registered.stats.record(elapsed_ms, result.is_err());

        match result {
            Ok(data) => ToolEnvelope::success(data),
            Err(err) => {
                if err.is_sanitized_to_client() {
                    tracing::error!(tool = name, error = %err, "tool execution failed");
                }
                ToolEnvelope::from_error(&err)
            }
        }
    }

    /// Structural health: a direct store ping plus, for every
    /// registered tool, whether it has a clean error record so far.
    /// Never invokes a tool's business logic (several tools write), so
    /// this is safe to call on every `--health-check` startup.
    pub async fn health_check(&self, pool: &ConnectionPool) -> Json {
        let store_reachable = pool
            .with_connection(None, |store| {
                store
                    .conn()
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(from_rusqlite)
            })
            .await
            .is_ok();

        let mut tools = serde_json::Map::new();
        let mut all_ok = store_reachable;
        for (name, registered) in &self.tools {
            let snapshot = registered.stats.snapshot();
            let ok = snapshot.calls == 0 || snapshot.errors < snapshot.calls;
            all_ok = all_ok && ok;
            tools.insert(
                name.clone(),
                json!({
                    "ok": ok,
                    "calls": snapshot.calls,
                    "errors": snapshot.errors,
                    "total_time_ms": snapshot.total_time_ms,
                }),
            );
        }

        json!({
            "healthy": all_ok,
            "store_reachable": store_reachable,
            "tools": tools,
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    impl ToolDyn for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input back"
        }
        fn input_schema(&self) -> Json {
            json!({"type": "object"})
        }
        fn call(&self, input: Json) -> BoxFuture<'_, Json> {
            Box::pin(async move { Ok(json!({"echoed": input})) })
        }
    }

    struct FailTool;

    impl ToolDyn for FailTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn input_schema(&self) -> Json {
            json!({"type": "object"})
        }
        fn call(&self, _input: Json) -> BoxFuture<'_, Json> {
            Box::pin(async { Err(ChronicleError::ToolExecution("always fails".into())) })
        }
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        assert!(reg.is_empty());
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_tool_not_found() {
        let reg = ToolRegistry::new();
        let envelope = reg.execute("nope", json!({})).await;
        assert!(envelope.is_error);
        assert_eq!(envelope.body["error"], "ToolNotFound");
    }

    #[tokio::test]
    async fn execute_success_wraps_data() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let envelope = reg.execute("echo", json!({"a": 1})).await;
        assert!(!envelope.is_error);
        assert_eq!(envelope.body["success"], true);
        assert_eq!(envelope.body["data"]["echoed"]["a"], 1);
    }

    #[tokio::test]
    async fn execute_failure_updates_stats() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailTool));
        let _ = reg.execute("fail", json!({})).await;
        let _ = reg.execute("fail", json!({})).await;
        let health = reg.health_check(&ConnectionPool::open_in_memory(1).unwrap()).await;
        assert_eq!(health["tools"]["fail"]["calls"], 2);
        assert_eq!(health["tools"]["fail"]["errors"], 2);
    }
}
