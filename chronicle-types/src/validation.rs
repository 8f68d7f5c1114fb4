//! Shared validation helpers.
//!
//! Repositories call these before any write touches the store, so a
//! rejected write never reaches SQL. Every function returns
//! [`ChronicleError::Validation`] (or a multi-field variant) on failure;
//! nothing here panics on bad input.

use crate::error::ChronicleError;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Maximum byte length accepted for message/summary body text.
pub const MAX_CONTENT_LEN: usize = 1_000_000;

/// Maximum byte length accepted for a conversation title.
pub const MAX_TITLE_LEN: usize = 500;

/// Maximum byte length accepted for a free-text search query.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Validate a non-empty, reasonably short id string (typed ID wrappers
/// delegate here before a lookup or foreign-key write).
pub fn validate_id(field: &str, value: &str) -> Result<(), ChronicleError> {
    if value.is_empty() {
        return Err(ChronicleError::validation_field(field, "must not be empty"));
    }
    if value.len() > 256 {
        return Err(ChronicleError::validation_field(
            field,
            "must be 256 bytes or fewer",
        ));
    }
    Ok(())
}

/// Validate message/summary body text: non-empty, within
/// [`MAX_CONTENT_LEN`].
pub fn validate_content(content: &str) -> Result<(), ChronicleError> {
    if content.is_empty() {
        return Err(ChronicleError::validation_field("content", "must not be empty"));
    }
    if content.len() > MAX_CONTENT_LEN {
        return Err(ChronicleError::validation_field(
            "content",
            format!("must be {MAX_CONTENT_LEN} bytes or fewer"),
        ));
    }
    Ok(())
}

/// Validate an optional conversation title.
pub fn validate_title(title: Option<&str>) -> Result<(), ChronicleError> {
    match title {
        None => Ok(()),
        Some(t) if t.len() > MAX_TITLE_LEN => Err(ChronicleError::validation_field(
            "title",
            format!("must be {MAX_TITLE_LEN} bytes or fewer"),
        )),
        Some(_) => Ok(()),
    }
}

/// Validate a free-text search query string.
pub fn validate_query(query: &str) -> Result<(), ChronicleError> {
    if query.trim().is_empty() {
        return Err(ChronicleError::validation_field("query", "must not be empty"));
    }
    if query.len() > MAX_QUERY_LEN {
        return Err(ChronicleError::validation_field(
            "query",
            format!("must be {MAX_QUERY_LEN} bytes or fewer"),
        ));
    }
    Ok(())
}

/// Validate that caller-supplied metadata is a JSON object (never a
/// scalar or array — every metadata column is typed `object` in the
/// schema's documentation).
pub fn validate_metadata(metadata: &Json) -> Result<(), ChronicleError> {
    if !metadata.is_object() {
        return Err(ChronicleError::validation_field(
            "metadata",
            "must be a JSON object",
        ));
    }
    Ok(())
}

/// Validate a `[min, max]` pagination window: `limit` must be positive
/// and no larger than `max_limit`; `offset` is unconstrained beyond being
/// non-negative (guaranteed by its `u64` type at the call site).
pub fn validate_pagination(limit: u32, max_limit: u32) -> Result<(), ChronicleError> {
    if limit == 0 {
        return Err(ChronicleError::validation_field("limit", "must be positive"));
    }
    if limit > max_limit {
        return Err(ChronicleError::validation_field(
            "limit",
            format!("must not exceed {max_limit}"),
        ));
    }
    Ok(())
}

/// Validate a confidence/strength/weight score lies in `[0, 1]`.
pub fn validate_unit_interval(field: &str, value: f64) -> Result<(), ChronicleError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ChronicleError::validation_field(field, "must be in [0, 1]"));
    }
    Ok(())
}

/// Validate a time range: `start <= end` when both are present.
pub fn validate_time_range(start: Option<i64>, end: Option<i64>) -> Result<(), ChronicleError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ChronicleError::validation_field(
                "time_range",
                "start must not be after end",
            ));
        }
    }
    Ok(())
}

/// Validate a token budget used by context assembly: positive and below
/// a sanity ceiling that guards against accidental overflow downstream.
pub fn validate_token_budget(budget: u32) -> Result<(), ChronicleError> {
    if budget == 0 {
        return Err(ChronicleError::validation_field("token_budget", "must be positive"));
    }
    if budget > 2_000_000 {
        return Err(ChronicleError::validation_field(
            "token_budget",
            "must not exceed 2,000,000",
        ));
    }
    Ok(())
}

/// Accumulate field errors across a multi-field validation pass, then
/// turn them into a single [`ChronicleError::Validation`] if any were
/// recorded. Repositories use this to report every offending field at
/// once instead of failing fast on the first.
#[derive(Debug, Default)]
pub struct ValidationAccumulator {
    details: BTreeMap<String, String>,
}

impl ValidationAccumulator {
    /// Start an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a single-field check, discarding it if `Ok`.
    pub fn push(&mut self, field: &str, result: Result<(), ChronicleError>) {
        if let Err(ChronicleError::Validation { details, .. }) = result {
            for (k, v) in details {
                self.details.entry(k).or_insert(v);
            }
        } else if let Err(other) = result {
            self.details.insert(field.to_owned(), other.to_string());
        }
    }

    /// Finish accumulating: `Ok(())` if nothing was recorded, otherwise a
    /// combined `Validation` error.
    pub fn finish(self) -> Result<(), ChronicleError> {
        if self.details.is_empty() {
            Ok(())
        } else {
            Err(ChronicleError::validation_many(self.details))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_content_is_rejected() {
        assert!(validate_content("").is_err());
    }

    #[test]
    fn oversized_content_is_rejected() {
        let huge = "a".repeat(MAX_CONTENT_LEN + 1);
        assert!(validate_content(&huge).is_err());
    }

    #[test]
    fn metadata_must_be_object() {
        assert!(validate_metadata(&json!({"a": 1})).is_ok());
        assert!(validate_metadata(&json!([1, 2])).is_err());
        assert!(validate_metadata(&json!("nope")).is_err());
    }

    #[test]
    fn pagination_limit_bounds() {
        assert!(validate_pagination(0, 100).is_err());
        assert!(validate_pagination(101, 100).is_err());
        assert!(validate_pagination(50, 100).is_ok());
    }

    #[test]
    fn time_range_requires_start_before_end() {
        assert!(validate_time_range(Some(10), Some(5)).is_err());
        assert!(validate_time_range(Some(5), Some(10)).is_ok());
        assert!(validate_time_range(None, None).is_ok());
    }

    #[test]
    fn accumulator_collects_multiple_fields() {
        let mut acc = ValidationAccumulator::new();
        acc.push("content", validate_content(""));
        acc.push("limit", validate_pagination(0, 100));
        let err = acc.finish().unwrap_err();
        match err {
            ChronicleError::Validation { details, .. } => {
                assert!(details.contains_key("content"));
                assert!(details.contains_key("limit"));
            }
            _ => panic!("expected Validation"),
        }
    }
}
