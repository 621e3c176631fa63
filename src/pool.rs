//! Bounded worker pool with a timed wait.
//!
//! Jobs run on a dedicated rayon pool; the caller blocks on a channel for at
//! most the given timeout. A job that outlives its caller keeps its worker
//! busy until it finishes and its result is discarded, so the number of
//! abandoned jobs in flight never exceeds the pool size.

use anyhow::Result;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on workers regardless of configuration.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("job did not finish before its deadline")]
    TimedOut,
    #[error("job panicked before reporting a result")]
    Panicked,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with `workers` threads, clamped to `1..=MAX_WORKERS`.
    pub fn new(name: &str, workers: usize) -> Result<Self> {
        let workers = workers.clamp(1, MAX_WORKERS);
        let prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .panic_handler(|_| tracing::warn!("Worker job panicked"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on the pool and wait up to `timeout` for its result.
    pub fn run_with_timeout<T, F>(&self, timeout: Duration, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.pool.spawn(move || {
            // The receiver is gone if the caller already gave up.
            let _ = tx.send(job());
        });

        match rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::Panicked),
        }
    }

    /// Fire-and-forget dispatch.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
