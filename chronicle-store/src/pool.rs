//! Bounded connection pool.
//!
//! Bridges async callers onto synchronous work: each checked-out
//! [`Store`] runs its closure inside `tokio::task::spawn_blocking`, and
//! the connection is always returned to the idle queue on every exit
//! path, including cancellation of the awaiting future (the checkout
//! guard's `Drop` releases the semaphore permit even if the caller's
//! future is dropped mid-wait).

use crate::store::{Store, StoreConfig};
use chronicle_types::ChronicleError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Point-in-time snapshot of pool occupancy, exposed for health checks
/// and metrics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Total connections the pool was configured with.
    pub total: usize,
    /// Connections currently checked out.
    pub active: usize,
    /// Connections sitting idle, ready for checkout.
    pub idle: usize,
    /// Callers currently waiting for a connection.
    pub pending_requests: usize,
}

struct Inner {
    idle: Mutex<VecDeque<Store>>,
    semaphore: Semaphore,
    total: usize,
    pending: AtomicUsize,
    shut_down: AtomicBool,
}

/// A bounded `[min, max]` pool of [`Store`] connections with a FIFO wait
/// queue governed by a per-request deadline.
///
/// `min` is reserved for documentation/metrics parity with the
/// bounded `[min,max]` pool shape; all `max` connections are opened
/// eagerly at construction so checkout never blocks on file I/O, only
/// on availability.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl ConnectionPool {
    /// Open `max` connections against `path` and build the pool.
    /// `min` is recorded but does not change how many connections are
    /// opened; it documents the floor the pool will never shrink below
    /// during future eviction policies.
    pub fn open(path: &std::path::Path, config: &StoreConfig, min: usize, max: usize) -> Result<Self, ChronicleError> {
        let max = max.max(1);
        let _ = min;
        let mut idle = VecDeque::with_capacity(max);
        for _ in 0..max {
            idle.push_back(Store::open(path, config)?);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(idle),
                semaphore: Semaphore::new(max),
                total: max,
                pending: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// A pool over an ephemeral in-memory store, useful for tests that
    /// exercise pool plumbing without touching disk.
    pub fn open_in_memory(max: usize) -> Result<Self, ChronicleError> {
        let max = max.max(1);
        let mut idle = VecDeque::with_capacity(max);
        for _ in 0..max {
            idle.push_back(Store::open_in_memory()?);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(idle),
                semaphore: Semaphore::new(max),
                total: max,
                pending: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Current occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle.lock().unwrap().len();
        PoolStats {
            total: self.inner.total,
            active: self.inner.total.saturating_sub(idle),
            idle,
            pending_requests: self.inner.pending.load(Ordering::Relaxed),
        }
    }

    /// Reject all future checkouts with `PoolShutdown`. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
    }

    async fn acquire(&self, deadline: Option<Instant>) -> Result<(), ChronicleError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(ChronicleError::PoolShutdown);
        }

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let wait = async {
            // Semaphore permits are released back on Drop; we don't hold
            // the returned guard, we just use successful acquisition as
            // a one-shot signal and track occupancy via the idle deque.
            self.inner.semaphore.acquire().await.expect("semaphore never closed").forget();
        };
        let acquired = match deadline {
            None => {
                wait.await;
                true
            }
            Some(dl) => match dl.checked_duration_since(Instant::now()) {
                None => false,
                Some(remaining) => tokio::time::timeout(remaining, wait).await.is_ok(),
            },
        };
        self.inner.pending.fetch_sub(1, Ordering::SeqCst);

        if self.inner.shut_down.load(Ordering::SeqCst) {
            if acquired {
                self.inner.semaphore.add_permits(1);
            }
            return Err(ChronicleError::PoolShutdown);
        }
        if !acquired {
            return Err(ChronicleError::PoolExhausted(
                "deadline elapsed before a connection became available".to_string(),
            ));
        }
        Ok(())
    }

    fn checkout(&self) -> Store {
        self.inner
            .idle
            .lock()
            .unwrap()
            .pop_front()
            .expect("semaphore guarantees a store is idle")
    }

    fn checkin(&self, store: Store) {
        self.inner.idle.lock().unwrap().push_back(store);
        self.inner.semaphore.add_permits(1);
    }

    /// Acquire a connection (waiting up to `deadline`, or indefinitely if
    /// `None`), run `f` against it on a blocking thread, and release the
    /// connection on every exit path — including the caller's future
    /// being dropped while awaiting the blocking task, which the guard
    /// handles since its `Drop` runs inside that task regardless of
    /// whether anyone is still around to read the result.
    pub async fn with_connection<F, T>(&self, deadline: Option<Instant>, f: F) -> Result<T, ChronicleError>
    where
        F: FnOnce(&Store) -> Result<T, ChronicleError> + Send + 'static,
        T: Send + 'static,
    {
        self.acquire(deadline).await?;
        let guard = CheckedOut::new(self.checkout(), self.clone());
        let result = tokio::task::spawn_blocking(move || run_checked_out(guard, |store| f(store)))
            .await;

        match result {
            Ok(out) => out,
            Err(join_err) => {
                // The blocking task panicked; the guard discarded the
                // store instead of returning it, so the pool permanently
                // loses one slot rather than risk handing a connection
                // left mid-statement to another caller.
                Err(ChronicleError::Internal(format!(
                    "connection pool worker panicked: {join_err}"
                )))
            }
        }
    }

    /// Acquire a connection and run `f` inside a transaction on it.
    pub async fn with_transaction<F, T>(&self, deadline: Option<Instant>, f: F) -> Result<T, ChronicleError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, ChronicleError> + Send + 'static,
        T: Send + 'static,
    {
        self.acquire(deadline).await?;
        let guard = CheckedOut::new(self.checkout(), self.clone());
        let result = tokio::task::spawn_blocking(move || run_checked_out(guard, |store| store.tx(f))).await;

        match result {
            Ok(out) => out,
            Err(join_err) => Err(ChronicleError::Internal(format!(
                "connection pool worker panicked: {join_err}"
            ))),
        }
    }
}

/// RAII wrapper around a checked-out [`Store`] that returns it to
/// `idle` and releases its semaphore permit when dropped. Unlike
/// returning the store as part of a successful `JoinHandle` result,
/// this runs from inside the blocking task itself, so the connection
/// comes back even if the caller's future was dropped mid-await and
/// nothing ever reads the task's output.
struct CheckedOut {
    store: Option<Store>,
    pool: ConnectionPool,
}

impl CheckedOut {
    fn new(store: Store, pool: ConnectionPool) -> Self {
        Self { store: Some(store), pool }
    }

    /// Consume the guard without returning the connection to the pool —
    /// used after the wrapped closure panics, so a connection possibly
    /// left mid-statement is never handed to another caller.
    fn discard(mut self) {
        self.store = None;
    }
}

impl Drop for CheckedOut {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            self.pool.checkin(store);
        }
    }
}

/// Run `f` against the guarded store, returning the connection to the
/// pool on a normal return and discarding it (never returning it) if
/// `f` panics, before resuming the unwind so the caller still observes
/// the panic through the `JoinHandle`.
fn run_checked_out<T>(mut guard: CheckedOut, f: impl FnOnce(&mut Store) -> Result<T, ChronicleError>) -> Result<T, ChronicleError> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        f(guard.store.as_mut().expect("store present while checked out"))
    }));
    match outcome {
        Ok(out) => {
            drop(guard);
            out
        }
        Err(payload) => {
            guard.discard();
            std::panic::resume_unwind(payload)
        }
    }
}

/// Convenience: build a deadline `duration` from now. `None` means wait
/// indefinitely.
pub fn deadline_in(duration: Option<Duration>) -> Option<Instant> {
    duration.map(|d| Instant::now() + d)
}

/// The filesystem location a pool was opened against, kept around by
/// callers that need to report it (e.g. health checks); not stored on
/// `ConnectionPool` itself since a pool may be in-memory.
pub fn describe_path(path: &std::path::Path) -> PathBuf {
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_connection_runs_and_returns_result() {
        let pool = ConnectionPool::open_in_memory(2).unwrap();
        let value = pool
            .with_connection(None, |store| {
                store
                    .conn()
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(crate::error::from_rusqlite)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out_with_pool_exhausted() {
        let pool = ConnectionPool::open_in_memory(1).unwrap();
        let pool2 = pool.clone();

        let hold = tokio::spawn(async move {
            pool2
                .with_connection(None, |_store| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let deadline = Some(Instant::now() + Duration::from_millis(20));
        let result = pool.with_connection(deadline, |_store| Ok(())).await;
        assert!(matches!(result, Err(ChronicleError::PoolExhausted(_))));

        hold.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_rejects_future_checkouts() {
        let pool = ConnectionPool::open_in_memory(1).unwrap();
        pool.shutdown();
        let result = pool.with_connection(None, |_store| Ok(())).await;
        assert!(matches!(result, Err(ChronicleError::PoolShutdown)));
    }

    #[tokio::test]
    async fn connection_is_returned_after_use() {
        let pool = ConnectionPool::open_in_memory(1).unwrap();
        pool.with_connection(None, |_store| Ok(())).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn connection_returns_even_if_caller_drops_before_blocking_task_finishes() {
        let pool = ConnectionPool::open_in_memory(1).unwrap();
        let pool2 = pool.clone();

        let fut = pool2.with_connection(None, |_store| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        });
        // Drop `fut` (the cancellation case) before the blocking task has
        // had a chance to finish.
        let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;

        // The blocking task keeps running to completion even though
        // nothing is awaiting it anymore; give it time to finish and the
        // guard to return the connection.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = pool.stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }
}
