//! MCP server that exposes a [`ToolRegistry`] via the MCP protocol.
//!
//! [`McpServer`] wraps a [`ToolRegistry`] and serves its tools over
//! stdio using the MCP protocol. The wire framing itself — request
//! parsing, JSON-RPC dispatch, the transport byte stream — is `rmcp`'s
//! job, out of scope for this service; this module only bridges
//! `rmcp`'s `ServerHandler` trait onto [`ToolRegistry::execute`].

use std::borrow::Cow;
use std::sync::Arc;

use chronicle_tool::ToolRegistry;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    ProtocolVersion, ServerCapabilities, ServerInfo, Tool as McpTool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::io::stdio;
use rmcp::{ErrorData, ServerHandler, ServiceExt};

use crate::error::McpError;

/// MCP server that exposes every tool registered in a [`ToolRegistry`].
///
/// Call [`serve_stdio`](McpServer::serve_stdio) to start serving via
/// stdin/stdout. This blocks until the client disconnects.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    name: String,
    version: String,
}

impl McpServer {
    /// Wrap `registry`, identifying this server as `name`/`version` in
    /// the MCP `initialize` handshake.
    pub fn new(registry: ToolRegistry, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(registry),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Serve over stdio until the client disconnects or the transport
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Connection`] if the transport fails to
    /// start or the service's `waiting()` future errors.
    pub async fn serve_stdio(self) -> Result<(), McpError> {
        let transport = stdio();
        let handler = McpServerHandler {
            registry: self.registry,
            name: self.name,
            version: self.version,
        };
        let service = handler
            .serve(transport)
            .await
            .map_err(|e| McpError::Connection(e.to_string()))?;
        service.waiting().await.map_err(|e| McpError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// Internal handler implementing [`ServerHandler`] for the MCP
/// protocol.
struct McpServerHandler {
    registry: Arc<ToolRegistry>,
    name: String,
    version: String,
}

impl ServerHandler for McpServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: Some(Cow::Borrowed(
                "A persistent conversation-memory service. Save messages with \
                 save_message, then recall them with search_messages, \
                 semantic_search, hybrid_search, or get_context_summary.",
            )),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools: Vec<McpTool> = self
            .registry
            .iter()
            .map(|tool| {
                let schema_obj = tool.input_schema().as_object().cloned().unwrap_or_default();
                McpTool {
                    name: Cow::Owned(tool.name().to_string()),
                    title: None,
                    description: Some(Cow::Owned(tool.description().to_string())),
                    input_schema: Arc::new(schema_obj),
                    output_schema: None,
                    annotations: None,
                    execution: None,
                    icons: None,
                    meta: None,
                }
            })
            .collect();

        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let tool_name = &*request.name;
        let input = match request.arguments {
            Some(map) => serde_json::Value::Object(map),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        // `execute` looks up the tool itself and maps an unknown name
        // onto the `ToolNotFound` envelope, so there is no
        // separate not-found branch here — the envelope's `isError`
        // carries that information to the client either way.
        let envelope = self.registry.execute(tool_name, input).await;
        let content = vec![Content::text(envelope.to_text())];
        if envelope.is_error {
            Ok(CallToolResult::error(content))
        } else {
            Ok(CallToolResult::success(content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_server_constructs_with_name_and_version() {
        let registry = ToolRegistry::new();
        let server = McpServer::new(registry, "chronicle", "0.1.0");
        assert_eq!(server.name, "chronicle");
        assert_eq!(server.version, "0.1.0");
    }

    #[test]
    fn server_handler_get_info_reports_identity() {
        let handler = McpServerHandler {
            registry: Arc::new(ToolRegistry::new()),
            name: "chronicle".into(),
            version: "1.2.3".into(),
        };
        let info = handler.get_info();
        assert_eq!(info.server_info.name, "chronicle");
        assert_eq!(info.server_info.version, "1.2.3");
        assert!(info.instructions.is_some());
    }

    #[tokio::test]
    async fn list_tools_reflects_registry_contents() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        let handler = McpServerHandler {
            registry: Arc::new(registry),
            name: "chronicle".into(),
            version: "0.1.0".into(),
        };
        let tools: Vec<_> = handler.registry.iter().collect();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn call_tool_unknown_name_yields_error_envelope() {
        let handler = McpServerHandler {
            registry: Arc::new(ToolRegistry::new()),
            name: "chronicle".into(),
            version: "0.1.0".into(),
        };
        let envelope = handler.registry.execute("nonexistent_tool", serde_json::json!({})).await;
        assert!(envelope.is_error);
        assert_eq!(envelope.body["error"], "ToolNotFound");
    }
}
