//! Full-text search over message content via the `messages_fts` FTS5
//! shadow table maintained by `chronicle-store`'s migrations.

use chronicle_store::ConnectionPool;
use chronicle_types::{ChronicleError, ConversationId, MessageId};
use std::time::Instant;

/// One full-text hit. `rank` is an FTS5 bm25 score: smaller is a better
/// match.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsHit {
    /// The matching message.
    pub message_id: MessageId,
    /// bm25 rank, smaller-is-better.
    pub rank: f64,
}

/// Narrowing applied to an FTS query.
#[derive(Debug, Clone)]
pub struct FtsFilter {
    /// Restrict to a single conversation.
    pub conversation_id: Option<ConversationId>,
    /// Maximum hits to return.
    pub limit: u32,
}

impl Default for FtsFilter {
    fn default() -> Self {
        Self {
            conversation_id: None,
            limit: 20,
        }
    }
}

/// Full-text index handle. Thin wrapper around `messages_fts`; all state
/// lives in SQLite, this struct only holds the pool it queries through.
pub struct FtsIndex {
    pool: ConnectionPool,
}

impl FtsIndex {
    /// Build an index over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run a full-text query, returning hits ordered best-first.
    ///
    /// Accepts three query forms: a `"quoted phrase"` is passed through
    /// to FTS5 verbatim (exact-phrase), a single bare token gets a
    /// trailing `*` (prefix), and multiple bare tokens are OR'd together
    /// (fuzzy, any-token-matches).
    pub async fn search(&self, query: &str, filter: FtsFilter) -> Result<Vec<FtsHit>, ChronicleError> {
        let match_expr = build_match_expr(query);
        if match_expr.is_empty() {
            return Err(ChronicleError::validation_field("query", "must contain at least one searchable token"));
        }
        let conversation_id = filter.conversation_id.map(|c| c.into_inner());
        let limit = filter.limit.max(1) as i64;
        self.pool
            .with_connection(None, move |store| {
                let conn = store.conn();
                let mut stmt = conn.prepare(
                    "SELECT m.id, messages_fts.rank AS rank \
                     FROM messages_fts \
                     JOIN messages m ON m.id = messages_fts.message_id \
                     WHERE messages_fts MATCH ?1 \
                       AND (?2 IS NULL OR m.conversation_id = ?2) \
                     ORDER BY messages_fts.rank \
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![match_expr, conversation_id, limit],
                    |row| {
                        let id: String = row.get(0)?;
                        let rank: f64 = row.get(1)?;
                        Ok(FtsHit {
                            message_id: MessageId::from(id),
                            rank,
                        })
                    },
                )?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
    }

    /// Merge FTS5 b-tree segments. Mirrors `messages_fts('optimize')`;
    /// cheap to call periodically, not required for correctness.
    pub async fn optimize(&self) -> Result<(), ChronicleError> {
        self.pool
            .with_connection(None, |store| {
                store.conn().execute(
                    "INSERT INTO messages_fts(messages_fts) VALUES ('optimize')",
                    [],
                )?;
                Ok(())
            })
            .await
    }
}

fn build_match_expr(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.len() > 1 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed.to_string();
    }
    let tokens: Vec<String> = trimmed
        .split_whitespace()
        .map(sanitize_token)
        .filter(|t| !t.is_empty())
        .collect();
    match tokens.len() {
        0 => String::new(),
        1 => format!("{}*", tokens[0]),
        _ => tokens.join(" OR "),
    }
}

fn sanitize_token(token: &str) -> String {
    token.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

#[allow(unused)]
fn _elapsed_since(start: Instant) -> u32 {
    start.elapsed().as_millis() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_becomes_prefix_query() {
        assert_eq!(build_match_expr("alice"), "alice*");
    }

    #[test]
    fn multi_token_becomes_or_query() {
        assert_eq!(build_match_expr("alice bob"), "alice OR bob");
    }

    #[test]
    fn quoted_phrase_passes_through() {
        assert_eq!(build_match_expr("\"deployed the api\""), "\"deployed the api\"");
    }

    #[test]
    fn punctuation_is_stripped_from_tokens() {
        assert_eq!(build_match_expr("alice, bob!"), "alice OR bob");
    }

    #[test]
    fn blank_query_yields_empty_expr() {
        assert_eq!(build_match_expr("   "), "");
    }
}
