//! Connection acquisition under contention.

use chronicle_store::ConnectionPool;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn bench_pool_acquisition(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pool_acquisition");

    for pool_size in [1usize, 4, 16] {
        let pool = Arc::new(ConnectionPool::open_in_memory(pool_size).unwrap());
        group.bench_with_input(BenchmarkId::new("concurrent_readers", pool_size), &pool_size, |b, &concurrency| {
            b.to_async(&rt).iter(|| {
                let pool = pool.clone();
                async move {
                    let mut handles = Vec::with_capacity(concurrency);
                    for _ in 0..concurrency {
                        let pool = pool.clone();
                        handles.push(tokio::spawn(async move {
                            pool.with_connection(None, |store| {
                                store
                                    .conn()
                                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                                    .map_err(chronicle_store::from_rusqlite)
                            })
                            .await
                        }));
                    }
                    for h in handles {
                        black_box(h.await.unwrap().unwrap());
                    }
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pool_acquisition);
criterion_main!(benches);
