//! Typed ID wrappers for every entity the store persists.
//!
//! All IDs are opaque strings (UUID-shaped by convention, never parsed
//! except for non-emptiness and a length bound — see [`crate::validation`]).
//! Typed wrappers prevent mixing up a `ConversationId` with a `MessageId`
//! at the call site; the wire format is a plain string either way.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(ConversationId, "Unique identifier for a conversation.");
typed_id!(MessageId, "Unique identifier for a message.");
typed_id!(SummaryId, "Unique identifier for a conversation summary.");
typed_id!(EntityId, "Unique identifier for a knowledge-graph entity.");
typed_id!(
    RelationshipId,
    "Unique identifier for a knowledge-graph relationship."
);
typed_id!(ProviderId, "Unique identifier for an LLM provider config.");
typed_id!(SearchMetricId, "Unique identifier for a recorded search metric.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_ids() {
        let a = ConversationId::generate();
        let b = ConversationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner_string() {
        let id = MessageId::new("abc-123");
        assert_eq!(id.to_string(), "abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EntityId::new("e1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"e1\"");
    }
}
