//! Full-text query latency at a few corpus sizes->[{messageId, rank}]`").

use chronicle_bench::{repositories, seed_conversation};
use chronicle_search::{FtsFilter, FtsIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

fn bench_fts_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fts_search");

    for corpus_size in [100usize, 1_000, 5_000] {
        let (fts, conversation_id) = rt.block_on(async {
            let (pool, repos) = repositories(4);
            let conversation_id = seed_conversation(&repos, corpus_size).await;
            let fts = FtsIndex::new(pool);
            (fts, conversation_id)
        });

        group.bench_with_input(BenchmarkId::new("messages", corpus_size), &corpus_size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let hits = fts
                    .search(
                        "roadmap WAL",
                        FtsFilter {
                            conversation_id: Some(conversation_id.clone()),
                            limit: 20,
                        },
                    )
                    .await
                    .unwrap();
                black_box(hits);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fts_search);
criterion_main!(benches);
