//! Conversions between a tool's raw JSON input/output and typed Rust
//! values shared by every handler in [`crate::tools`].

use chronicle_types::ChronicleError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

/// Deserialize a tool's raw JSON input into its typed request struct.
/// A shape mismatch becomes `ChronicleError::Validation` rather than a
/// panic.
pub fn parse_input<T: DeserializeOwned>(input: Json) -> Result<T, ChronicleError> {
    serde_json::from_value(input).map_err(|e| ChronicleError::validation_field("input", e.to_string()))
}

/// Serialize a domain value for inclusion in a tool's `data` payload.
/// Only fails if a type's `Serialize` impl itself fails, which none of
/// `chronicle_types::model`'s derives do; kept fallible so a handler
/// never needs `unwrap`.
pub fn to_json<T: Serialize>(value: &T) -> Result<Json, ChronicleError> {
    serde_json::to_value(value).map_err(|e| ChronicleError::Internal(e.to_string()))
}

/// Lowercase, whitespace-collapse a name the way `Entity::normalized_name`
/// is derived, so lookups by display name match what
/// extraction stored.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
