//! Context assembly at a few token budgets.

use chronicle_bench::{repositories, seed_conversation};
use chronicle_context::{AssembleRequest, AssemblyStrategy, ContextAssembler};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

fn bench_context_assembly(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("context_assembly");

    let (assembler, conversation_id) = rt.block_on(async {
        let (_pool, repos) = repositories(4);
        let conversation_id = seed_conversation(&repos, 200).await;
        let assembler = ContextAssembler::new(repos.messages.clone(), repos.summaries.clone());
        (assembler, conversation_id)
    });

    for max_tokens in [500u32, 2_000, 8_000] {
        group.bench_with_input(BenchmarkId::new("max_tokens", max_tokens), &max_tokens, |b, &max_tokens| {
            b.to_async(&rt).iter(|| async {
                let assembled = assembler
                    .assemble(AssembleRequest {
                        query: "roadmap Q3".to_string(),
                        max_tokens,
                        strategy: AssemblyStrategy::Hybrid,
                        conversation_ids: vec![conversation_id.clone()],
                        min_relevance: 0.0,
                        include_recent: true,
                        focus_entities: vec!["Acme Corp".to_string()],
                        time_window: None,
                    })
                    .await
                    .unwrap();
                black_box(assembled);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_context_assembly);
criterion_main!(benches);
