use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::rpc::panic_message;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool closed")]
    Closed,
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("worker cancelled")]
    Cancelled,
}

/// Runs blocking handlers on the blocking thread pool, at most `size` at a
/// time.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await;
        match joined {
            Ok(v) => Ok(v),
            Err(e) if e.is_panic() => Err(PoolError::Panicked(panic_message(e.into_panic().as_ref()))),
            Err(_) => Err(PoolError::Cancelled),
        }
    }
}
