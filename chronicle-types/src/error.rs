//! The error taxonomy shared by every layer of the service.
//!
//! One enum, one place errors become client-visible strings. Repositories
//! and services return `Result<T, ChronicleError>`; the tool registry
//! translates a `ChronicleError` into the protocol envelope without the
//! caller needing to know about JSON-RPC codes.

use std::collections::BTreeMap;
use thiserror::Error;

/// Exhaustive(ish) error kinds surfaced anywhere in the service.
///
/// `#[non_exhaustive]` so new kinds can be added without a breaking change.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ChronicleError {
    /// Input failed validation. `details` names the offending field(s).
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable summary.
        message: String,
        /// Field name to problem description.
        details: BTreeMap<String, String>,
    },

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested write conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store could not be opened or a connection could not be made.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The connection pool's wait deadline elapsed before a connection
    /// became available.
    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    /// The connection pool has been shut down.
    #[error("pool shut down")]
    PoolShutdown,

    /// The on-disk schema version is newer than this binary understands.
    #[error("schema too new: on-disk version {on_disk}, latest known {latest}")]
    SchemaTooNew {
        /// Version recorded in `persistence_state`.
        on_disk: i64,
        /// Latest version this binary's `MigrationRunner` knows about.
        latest: i64,
    },

    /// No tool registered under the requested name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A tool's `Run` returned an error.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// The caller's deadline elapsed or the request was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// An operation exceeded its allotted time without being explicitly
    /// cancelled (e.g. an external provider call).
    #[error("timeout: {0}")]
    Timeout(String),

    /// An external collaborator (embedder, summarizer) is unavailable.
    #[error("external provider unavailable: {0}")]
    ExternalProviderUnavailable(String),

    /// Unexpected internal failure. Full detail is logged; only this
    /// sanitized message crosses the tool boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChronicleError {
    /// Construct a `Validation` error for a single offending field.
    pub fn validation_field(field: impl Into<String>, problem: impl Into<String>) -> Self {
        let field = field.into();
        let problem = problem.into();
        let mut details = BTreeMap::new();
        details.insert(field.clone(), problem.clone());
        Self::Validation {
            message: format!("{field}: {problem}"),
            details,
        }
    }

    /// Construct a `Validation` error spanning multiple fields.
    pub fn validation_many(details: BTreeMap<String, String>) -> Self {
        let message = details
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { message, details }
    }

    /// The error kind's name, stable across versions, used by the tool
    /// envelope's `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Validation",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::PoolExhausted(_) => "PoolExhausted",
            Self::PoolShutdown => "PoolShutdown",
            Self::SchemaTooNew { .. } => "SchemaTooNew",
            Self::ToolNotFound(_) => "ToolNotFound",
            Self::ToolExecution(_) => "ToolExecution",
            Self::Cancelled => "Cancelled",
            Self::Timeout(_) => "Timeout",
            Self::ExternalProviderUnavailable(_) => "ExternalProviderUnavailable",
            Self::Internal(_) => "Internal",
        }
    }

    /// The JSON-RPC / tool-layer numeric code.
    ///
    /// Codes below -32000 (parse/invalid-request/method-not-found/invalid-
    /// params/internal) belong to the JSON-RPC transport layer itself and
    /// are assigned by `chronicle-mcp`, not here; this covers the
    /// tool-layer range -32000..=-32005 plus a sentinel for kinds that
    /// don't map onto a specific JSON-RPC code (they surface only inside
    /// the tool result envelope's `success:false` body).
    pub fn code(&self) -> i32 {
        match self {
            Self::ToolNotFound(_) => -32000,
            Self::ToolExecution(_) | Self::Internal(_) => -32001,
            Self::NotFound(_) => -32002,
            Self::StoreUnavailable(_) | Self::Conflict(_) => -32003,
            Self::Validation { .. } => -32602,
            Self::PoolExhausted(_)
            | Self::PoolShutdown
            | Self::SchemaTooNew { .. }
            | Self::Cancelled
            | Self::Timeout(_)
            | Self::ExternalProviderUnavailable(_) => -32001,
        }
    }

    /// Whether retrying the same operation might succeed.
    ///
    /// Used by `SearchEngine`/`ContextAssembler` fallback logic:
    /// `Cancelled` is never retried; `ExternalProviderUnavailable` and
    /// `PoolExhausted` are transient and worth a fallback path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted(_) | Self::ExternalProviderUnavailable(_) | Self::Timeout(_)
        )
    }

    /// Whether this kind should log full detail server-side but return a
    /// sanitized message to the client (`Internal` and
    /// `StoreUnavailable`).
    pub fn is_sanitized_to_client(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_field_builds_details_map() {
        let err = ChronicleError::validation_field("query", "must not be empty");
        match &err {
            ChronicleError::Validation { details, .. } => {
                assert_eq!(details.get("query").unwrap(), "must not be empty");
            }
            _ => panic!("expected Validation"),
        }
    }

    #[test]
    fn cancelled_is_never_retryable() {
        assert!(!ChronicleError::Cancelled.is_retryable());
    }

    #[test]
    fn external_provider_unavailable_is_retryable() {
        assert!(ChronicleError::ExternalProviderUnavailable("embedder down".into()).is_retryable());
    }

    #[test]
    fn internal_and_store_unavailable_are_sanitized() {
        assert!(ChronicleError::Internal("boom".into()).is_sanitized_to_client());
        assert!(ChronicleError::StoreUnavailable("disk full".into()).is_sanitized_to_client());
        assert!(!ChronicleError::NotFound("x".into()).is_sanitized_to_client());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ChronicleError::Cancelled.kind(), "Cancelled");
        assert_eq!(ChronicleError::PoolShutdown.kind(), "PoolShutdown");
    }
}
