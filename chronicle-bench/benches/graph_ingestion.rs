//! Knowledge-graph ingestion throughput.

use chronicle_bench::repositories;
use chronicle_graph::KnowledgeGraphService;
use chronicle_store::QueryCache;
use chronicle_types::MessageId;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

const SAMPLE_MESSAGE: &str =
    "Dr. Alice Chen at Acme Corp deployed the pricing API v2.3 after the team \
     clearly decided to move away from the legacy billing service.";

fn bench_graph_ingestion(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("graph_ingest_message", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let (_pool, repos) = repositories(4);
                KnowledgeGraphService::new(repos.entities.clone(), repos.graph.clone(), Arc::new(QueryCache::new()))
            },
            |service| async move {
                let outcome = service
                    .ingest_message(&MessageId::generate(), SAMPLE_MESSAGE, 0)
                    .await
                    .unwrap();
                black_box(outcome);
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_graph_ingestion);
criterion_main!(benches);
