//! Pluggable nearest-neighbor search over message embeddings.
//!
//! `VectorIndex`'s natural `async fn` surface returns a non-`Send`-
//! object-safe future, so methods return a boxed, pinned future
//! instead to stay dyn-compatible, and callers
//! hold `Arc<dyn VectorIndex>`. The only implementation shipped here is
//! a brute-force scan; it is a dependency-free fallback deliberately
//! kept independent of any particular vector database, so swapping in
//! an ANN-backed index later is a matter of implementing this trait.

use chronicle_repo::{decode_embedding, encode_embedding};
use chronicle_store::ConnectionPool;
use chronicle_types::{ChronicleError, ConversationId, MessageId};
use std::future::Future;
use std::pin::Pin;

/// One nearest-neighbor hit. `similarity` is cosine similarity in
/// `[-1.0, 1.0]`, higher is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// The matching message.
    pub message_id: MessageId,
    /// Cosine similarity against the query vector.
    pub similarity: f32,
}

/// Narrowing applied to a vector query.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Restrict to a single conversation.
    pub conversation_id: Option<ConversationId>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChronicleError>> + Send + 'a>>;

/// Object-safe nearest-neighbor backend.
pub trait VectorIndex: Send + Sync {
    /// Record or replace the embedding for a message.
    fn upsert<'a>(&'a self, message_id: &'a MessageId, vector: &'a [f32]) -> BoxFuture<'a, ()>;

    /// Return the `k` nearest messages to `vector`, best (most similar)
    /// first.
    fn search<'a>(&'a self, vector: &'a [f32], k: usize, filter: VectorFilter) -> BoxFuture<'a, Vec<VectorHit>>;

    /// Whether this backend currently has anything to search. A
    /// `SearchEngine` falls back to FTS-only when this is `false`.
    fn is_available(&self) -> bool;
}

/// Cosine similarity, mirroring the standard `(a . b) / (||a|| ||b||)`
/// formula: empty or zero vectors yield `0.0` rather than dividing by
/// zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Brute-force `VectorIndex` over the `embedding` column already stored
/// on each message row. No separate index structure is maintained;
/// `upsert` writes straight through to `messages.embedding` and
/// `search` scans every row with a non-null embedding.
pub struct InMemoryVectorIndex {
    pool: ConnectionPool,
}

impl InMemoryVectorIndex {
    /// Build an index over the given pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert<'a>(&'a self, message_id: &'a MessageId, vector: &'a [f32]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = message_id.as_str().to_string();
            let blob = encode_embedding(vector);
            self.pool
                .with_connection(None, move |store| {
                    store
                        .conn()
                        .execute("UPDATE messages SET embedding = ?1 WHERE id = ?2", rusqlite::params![blob, id])?;
                    Ok(())
                })
                .await
        })
    }

    fn search<'a>(&'a self, vector: &'a [f32], k: usize, filter: VectorFilter) -> BoxFuture<'a, Vec<VectorHit>> {
        Box::pin(async move {
            let query: Vec<f32> = vector.to_vec();
            let conversation_id = filter.conversation_id.map(|c| c.into_inner());
            let k = k.max(1);
            self.pool
                .with_connection(None, move |store| {
                    let conn = store.conn();
                    let mut stmt = conn.prepare(
                        "SELECT id, embedding FROM messages \
                         WHERE embedding IS NOT NULL \
                           AND (?1 IS NULL OR conversation_id = ?1)",
                    )?;
                    let rows = stmt.query_map(rusqlite::params![conversation_id], |row| {
                        let id: String = row.get(0)?;
                        let blob: Vec<u8> = row.get(1)?;
                        Ok((id, blob))
                    })?;
                    let mut scored: Vec<VectorHit> = Vec::new();
                    for row in rows {
                        let (id, blob) = row?;
                        let embedding = decode_embedding(&blob);
                        let similarity = cosine_similarity(&query, &embedding);
                        scored.push(VectorHit {
                            message_id: MessageId::from(id),
                            similarity,
                        });
                    }
                    scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
                    scored.truncate(k);
                    Ok(scored)
                })
                .await
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// A `VectorIndex` that always reports unavailable and never stores
/// anything. Used by the composition root when `enableVectorIndex` is
/// `false`, so `SearchEngine` takes the same "runs in FTS-only mode"
/// path it would take for a real but disconnected embedder.
#[derive(Debug, Default)]
pub struct DisabledVectorIndex;

impl VectorIndex for DisabledVectorIndex {
    fn upsert<'a>(&'a self, _message_id: &'a MessageId, _vector: &'a [f32]) -> BoxFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn search<'a>(&'a self, _vector: &'a [f32], _k: usize, _filter: VectorFilter) -> BoxFuture<'a, Vec<VectorHit>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn zero_vector_does_not_panic() {
        let a = vec![0.0_f32, 0.0];
        let b = vec![1.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn empty_vectors_yield_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn disabled_vector_index_is_never_available() {
        let index = DisabledVectorIndex;
        assert!(!index.is_available());
        index.upsert(&MessageId::new("m1"), &[1.0, 2.0]).await.unwrap();
        let hits = index.search(&[1.0, 2.0], 5, VectorFilter::default()).await.unwrap();
        assert!(hits.is_empty());
    }
}
