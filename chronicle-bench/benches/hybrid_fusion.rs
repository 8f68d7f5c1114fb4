//! Hybrid fusion scoring.

use chronicle_bench::{repositories, seed_conversation, synthetic_embedding};
use chronicle_repo::MessagePage;
use chronicle_search::{InMemoryVectorIndex, SearchEngine, SearchRequest, SearchStrategy, VectorIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

const EMBEDDING_DIM: usize = 64;

fn bench_hybrid_fusion(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hybrid_fusion");

    for corpus_size in [100usize, 1_000] {
        let (engine, query_embedding) = rt.block_on(async {
            let (pool, repos) = repositories(4);
            let conversation_id = seed_conversation(&repos, corpus_size).await;
            let vector = Arc::new(InMemoryVectorIndex::new(pool.clone()));

            let messages = repos
                .messages
                .find_by_conversation_id(
                    &conversation_id,
                    MessagePage { limit: corpus_size as u32, before_id: None, after_id: None },
                )
                .await
                .unwrap();
            for (i, message) in messages.iter().enumerate() {
                vector.upsert(&message.id, &synthetic_embedding(i, EMBEDDING_DIM)).await;
            }

            let engine = SearchEngine::new(pool, vector);
            (engine, synthetic_embedding(7, EMBEDDING_DIM))
        });

        group.bench_with_input(BenchmarkId::new("messages", corpus_size), &corpus_size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let outcome = engine
                    .search(
                        SearchRequest {
                            query: "roadmap WAL".to_string(),
                            query_embedding: Some(query_embedding.clone()),
                            conversation_id: None,
                            strategy: SearchStrategy::Hybrid,
                            limit: 20,
                        },
                        0,
                    )
                    .await
                    .unwrap();
                black_box(outcome);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hybrid_fusion);
criterion_main!(benches);
