//! Worker pools.
//!
//! A pool runs caller-submitted units of work under a hard concurrency
//! ceiling. Admission blocks the submitter once the ceiling is reached:
//! the puller feeding the pool is throttled instead of buffering records
//! unboundedly. Drain and shutdown are not the pool's concern; the
//! execution environment tracks completion of everything it submits.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A type-erased unit of work accepted by a pool.
pub type WorkUnit = BoxFuture<'static, ()>;

/// Bounded-concurrency execution primitive.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Runs `unit`.
    ///
    /// Returns once the unit has been admitted: immediately after starting
    /// it on a worker, or after running it to completion for inline pools.
    /// Blocks while the pool is at its concurrency ceiling.
    async fn submit(&self, unit: WorkUnit);

    /// The concurrency ceiling.
    fn concurrency(&self) -> usize;

    /// True when units run inline on the submitting task.
    fn runs_inline(&self) -> bool {
        false
    }
}

/// Runs every unit inline on the submitter, one at a time.
///
/// This is the default scheduling policy: no pool machinery, concurrency
/// effectively one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPool;

#[async_trait]
impl WorkerPool for DirectPool {
    async fn submit(&self, unit: WorkUnit) {
        unit.await;
    }

    fn concurrency(&self) -> usize {
        1
    }

    fn runs_inline(&self) -> bool {
        true
    }
}

/// A pool running at most `size` units concurrently.
///
/// Admission is guarded by a counting semaphore rather than a queue, so a
/// submitter at capacity waits for a slot instead of enqueueing.
#[derive(Debug)]
pub struct BoundedPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl BoundedPool {
    /// Creates a pool with the given concurrency ceiling (minimum one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the number of currently free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl WorkerPool for BoundedPool {
    async fn submit(&self, unit: WorkUnit) {
        match self.permits.clone().acquire_owned().await {
            Ok(permit) => {
                tokio::spawn(async move {
                    unit.await;
                    drop(permit);
                });
            }
            // The semaphore is never closed; fall back to inline execution.
            Err(_) => unit.await,
        }
    }

    fn concurrency(&self) -> usize {
        self.size
    }
}
