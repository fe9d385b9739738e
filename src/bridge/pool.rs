use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::SqlBridgeError;

/// Default number of concurrently open connections (one worker thread each).
pub const DEFAULT_CAPACITY: usize = 64;

/// Bounds the number of worker threads alive at once.
///
/// A slot is held for the whole life of a worker thread, including a connect attempt that
/// timed out but is still blocked in the driver.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held by a worker.
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit, SqlBridgeError> {
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| SqlBridgeError::connection("worker pool is shut down"))
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_return_on_drop() {
        let pool = WorkerPool::new(2);
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(first);
        assert_eq!(pool.available(), 1);
    }
}
