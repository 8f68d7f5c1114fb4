//! Shared corpus-generation helpers for the `chronicle-bench` suite
//!. Each `benches/*.rs` file owns one hot path in the
//! component table; this module only avoids duplicating the synthetic
//! conversation/message fixtures every one of them needs.

use chronicle_repo::{blank_conversation, Repositories};
use chronicle_store::{ConnectionPool, QueryCache};
use chronicle_types::{ConversationId, Message, MessageId, MessageRole};
use std::sync::Arc;

/// Build an in-memory-backed [`Repositories`] bundle over a fresh
/// pool, the same composition every benchmark needs before it can seed
/// a corpus. Returns the pool alongside the repositories since several
/// benchmarks (FTS, vector, search-engine fusion) need to build their
/// own collaborator directly over it.
pub fn repositories(pool_size: usize) -> (ConnectionPool, Repositories) {
    let pool = ConnectionPool::open_in_memory(pool_size).expect("open in-memory pool");
    let cache = Arc::new(QueryCache::new());
    let repos = Repositories::new(pool.clone(), cache);
    (pool, repos)
}

/// Seed one conversation with `n` plausible-looking messages, returning
/// the conversation id. Content varies by index so FTS/vector
/// benchmarks don't measure a degenerate all-identical corpus.
pub async fn seed_conversation(repos: &Repositories, n: usize) -> ConversationId {
    let conversation_id = ConversationId::generate();
    repos
        .conversations
        .create(blank_conversation(conversation_id.as_str(), 0))
        .await
        .expect("create conversation");

    for i in 0..n {
        let role = if i % 3 == 0 {
            MessageRole::User
        } else if i % 3 == 1 {
            MessageRole::Assistant
        } else {
            MessageRole::System
        };
        let content = format!(
            "Message {i}: discussing the Q{q} roadmap with Alice Chen at Acme Corp, \
             covering database indexing, WAL checkpoints, and the new embedding pipeline.",
            q = (i % 4) + 1
        );
        repos
            .messages
            .create(Message {
                id: MessageId::generate(),
                conversation_id: conversation_id.clone(),
                role,
                content,
                created_at: i as i64,
                parent_message_id: None,
                metadata: serde_json::json!({}),
                embedding: None,
            })
            .await
            .expect("create message");
    }

    conversation_id
}

/// A fixed-dimension synthetic embedding, varied by `seed` so cosine
/// similarity benchmarks see a realistic spread rather than identical
/// vectors.
pub fn synthetic_embedding(seed: usize, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|i| ((seed * 31 + i * 7) % 101) as f32 / 101.0)
        .collect()
}
