//! The `{success, data|error, message, details?}` result envelope.

use chronicle_types::ChronicleError;
use serde_json::{json, Value as Json};

/// One tool call's outcome, ready to be rendered as the MCP content
/// part's `text`.
#[derive(Debug, Clone)]
pub struct ToolEnvelope {
    /// Mirrors the MCP content envelope's `isError` flag.
    pub is_error: bool,
    /// The `{success, data|error, message, details?}` body.
    pub body: Json,
}

impl ToolEnvelope {
    /// A successful call.
    pub fn success(data: Json) -> Self {
        Self {
            is_error: false,
            body: json!({ "success": true, "data": data }),
        }
    }

    /// A failed call, sanitizing `Internal`/`StoreUnavailable` messages
    /// before they cross the tool boundary and
    /// attaching field-level `details` for `Validation` errors.
    pub fn from_error(err: &ChronicleError) -> Self {
        let message = if err.is_sanitized_to_client() {
            "an internal error occurred".to_string()
        } else {
            err.to_string()
        };
        let mut body = json!({
            "success": false,
            "error": err.kind(),
            "message": message,
        });
        if let ChronicleError::Validation { details, .. } = err {
            body["details"] = json!(details);
        }
        Self { is_error: true, body }
    }

    /// The content part's `text`: a stringified JSON object.
    pub fn to_text(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| "{\"success\":false}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_wraps_data_under_data_key() {
        let envelope = ToolEnvelope::success(json!({"x": 1}));
        assert!(!envelope.is_error);
        assert_eq!(envelope.body["success"], true);
        assert_eq!(envelope.body["data"]["x"], 1);
    }

    #[test]
    fn validation_error_carries_field_details() {
        let err = ChronicleError::validation_field("query", "must not be empty");
        let envelope = ToolEnvelope::from_error(&err);
        assert!(envelope.is_error);
        assert_eq!(envelope.body["error"], "Validation");
        assert_eq!(envelope.body["details"]["query"], "must not be empty");
    }

    #[test]
    fn internal_error_message_is_sanitized() {
        let err = ChronicleError::Internal("disk path /etc/secret leaked".to_string());
        let envelope = ToolEnvelope::from_error(&err);
        assert_eq!(envelope.body["message"], "an internal error occurred");
    }
}
