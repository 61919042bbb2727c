// Path: crates/blob/src/pool.rs

//! Fixed-capacity worker pool bounding concurrent remote requests.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// How many concurrent requests to the remote object store are permitted.
pub const PARALLELISM: usize = 64;

/// A counted set of workers. Callers take a permit before issuing a remote
/// request and give it back by dropping it; every exit path returns the
/// permit.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// A pool with `capacity` workers.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// The fixed number of workers in the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free worker. The permit is released on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed")
    }
}
