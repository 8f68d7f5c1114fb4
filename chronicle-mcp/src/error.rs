//! MCP-layer error type: transport/connection failures that occur
//! below the tool-execution boundary.

use thiserror::Error;

/// Errors raised by [`crate::server::McpServer`] itself, as opposed to
/// errors a tool call returns (those are carried inside the result
/// envelope's `success:false` body, never as a transport error).
#[derive(Debug, Error)]
pub enum McpError {
    /// The stdio transport failed to start or the connection dropped.
    #[error("mcp transport error: {0}")]
    Connection(String),
}
