//! Bounded-concurrency dispatch for suffix execution (C12): the HTTP
//! accept loop must never block on a layer evaluation, so compute-bound
//! work is handed to `tokio::task::spawn_blocking` behind a counting
//! semaphore. When the semaphore is exhausted the caller gets an
//! immediate error instead of a queued future — the route handler turns
//! that into HTTP 503.

use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("worker pool saturated: {max_concurrent} suffix executions already in flight")]
    Saturated { max_concurrent: usize },

    #[error("worker task panicked")]
    Join(#[from] tokio::task::JoinError),
}

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl WorkerPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent)), max_concurrent }
    }

    /// Runs `work` on a blocking-capable worker if a permit is free;
    /// otherwise returns `Saturated` without ever spawning a task.
    pub async fn try_run<F, T>(&self, work: F) -> Result<T, WorkerPoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| WorkerPoolError::Saturated { max_concurrent: self.max_concurrent })?;

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await?;
        Ok(result)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
