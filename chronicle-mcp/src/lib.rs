//! MCP wire surface: bridges a
//! [`chronicle_tool::ToolRegistry`] onto `rmcp`'s stdio transport and
//! `ServerHandler` trait. Everything below the tool-execution boundary
//! — request framing, JSON-RPC dispatch — belongs to `rmcp`, matching
//! the "MCP wire framing/transport itself" non-goal.

pub mod error;
pub mod server;

pub use error::McpError;
pub use server::McpServer;
