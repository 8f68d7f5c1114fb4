//! Conversions from `rusqlite`'s error type into the shared taxonomy.

use chronicle_types::ChronicleError;

/// Map a `rusqlite` error onto the shared error taxonomy.
///
/// `RAISE(ABORT, ...)` from a validation trigger surfaces as
/// `rusqlite::Error::SqliteFailure` with the message embedded; those are
/// reported as `Validation` since they always originate from a
/// constraint the caller's input violated. Everything else that isn't a
/// recognizable constraint violation is `Internal` (full detail is
/// logged by the caller before this conversion discards it from the
/// client-visible message).
pub fn from_rusqlite(err: rusqlite::Error) -> ChronicleError {
    match &err {
        rusqlite::Error::QueryReturnedNoRows => ChronicleError::NotFound(err.to_string()),
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("UNIQUE constraint failed") => {
            ChronicleError::Conflict(msg.clone())
        }
        rusqlite::Error::SqliteFailure(_, Some(msg))
            if msg.contains("FOREIGN KEY constraint failed") =>
        {
            ChronicleError::validation_field("reference", msg.clone())
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("CHECK constraint failed") => {
            ChronicleError::validation_field("constraint", msg.clone())
        }
        rusqlite::Error::SqliteFailure(_, Some(msg)) => ChronicleError::validation_field("input", msg.clone()),
        other => ChronicleError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rows_maps_to_not_found() {
        let err = from_rusqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, ChronicleError::NotFound(_)));
    }
}
