//! Bounded worker pool for per-subscriber send tasks
//!
//! ```text
//!   submit() ──try_send──▶ [ queue (capacity) ] ──▶ core workers (always running)
//!      │
//!      └── queue full ──▶ burst worker (while workers < max) ──▶ drains queue, exits
//!      │
//!      └── queue full, workers == max ──▶ rejected, counted, logged
//! ```
//!
//! Core workers are spawned on construction, so the pool must be created
//! inside a Tokio runtime. Dropping every handle closes the queue and lets the
//! core workers exit once it is drained.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::config::PoolConfig;
use crate::metrics;

/// A unit of work accepted by the pool
pub type SendJob = BoxFuture<'static, ()>;

/// Errors raised when admitting work
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Queue full and no burst worker available
    #[error("Worker pool saturated (queue capacity {queue_capacity}, max workers {max_workers})")]
    Saturated {
        queue_capacity: usize,
        max_workers: usize,
    },

    /// Pool has been shut down
    #[error("Worker pool is closed")]
    Closed,

    /// Sizing is inconsistent
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Pool statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs admitted to the queue or a burst worker
    pub submitted: AtomicU64,

    /// Jobs that ran to completion (including panicked jobs)
    pub completed: AtomicU64,

    /// Jobs refused because the pool was saturated
    pub rejected: AtomicU64,

    /// Burst workers started
    pub burst_spawned: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub burst_spawned: u64,
}

impl PoolStats {
    /// Get snapshot of current stats
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            burst_spawned: self.burst_spawned.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    rx: Mutex<mpsc::Receiver<SendJob>>,
    core_workers: usize,
    max_workers: usize,
    queue_capacity: usize,
    name_prefix: String,
    workers: AtomicUsize,
    next_worker_id: AtomicUsize,
    in_flight: AtomicUsize,
    idle: Notify,
    stats: PoolStats,
}

impl Shared {
    fn worker_name(&self) -> String {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.name_prefix, id + 1)
    }

    async fn run(&self, job: SendJob, worker: &str) {
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!(worker, "Send task panicked");
        }
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn release(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded worker pool
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<SendJob>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool and spawn its core workers
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.core_workers == 0 || config.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "core_workers and queue_capacity must be greater than 0".to_string(),
            ));
        }
        if config.max_workers < config.core_workers {
            return Err(PoolError::InvalidConfig(
                "max_workers must be at least core_workers".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let shared = Arc::new(Shared {
            rx: Mutex::new(rx),
            core_workers: config.core_workers,
            max_workers: config.max_workers,
            queue_capacity: config.queue_capacity,
            name_prefix: config.worker_name_prefix.clone(),
            workers: AtomicUsize::new(config.core_workers),
            next_worker_id: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            stats: PoolStats::default(),
        });

        for _ in 0..config.core_workers {
            let shared = Arc::clone(&shared);
            let name = shared.worker_name();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = shared.rx.lock().await;
                        rx.recv().await
                    };

                    match job {
                        Some(job) => shared.run(job, &name).await,
                        None => break,
                    }
                }
                tracing::debug!(worker = %name, "Core worker stopped");
            });
        }

        tracing::debug!(
            core = config.core_workers,
            max = config.max_workers,
            capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self { tx, shared })
    }

    /// Submit a job without waiting
    ///
    /// Returns [`PoolError::Saturated`] when the queue is full and the pool is
    /// already at its burst maximum; the rejection is counted and logged.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shared = &self.shared;
        shared.in_flight.fetch_add(1, Ordering::SeqCst);

        match self.tx.try_send(job.boxed()) {
            Ok(()) => {
                shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::set_pool_queue_depth(self.queue_depth());
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                if self.reserve_burst_worker() {
                    shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
                    shared.stats.burst_spawned.fetch_add(1, Ordering::Relaxed);
                    self.spawn_burst_worker(job);
                    return Ok(());
                }

                shared.release();
                shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::record_pool_rejection();
                tracing::warn!(
                    queue_capacity = shared.queue_capacity,
                    max_workers = shared.max_workers,
                    "Worker pool saturated, send task rejected"
                );
                Err(PoolError::Saturated {
                    queue_capacity: shared.queue_capacity,
                    max_workers: shared.max_workers,
                })
            }
            Err(TrySendError::Closed(_)) => {
                shared.release();
                Err(PoolError::Closed)
            }
        }
    }

    fn reserve_burst_worker(&self) -> bool {
        let max = self.shared.max_workers;
        self.shared
            .workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn spawn_burst_worker(&self, first: SendJob) {
        let shared = Arc::clone(&self.shared);
        let name = shared.worker_name();

        tokio::spawn(async move {
            tracing::debug!(worker = %name, "Burst worker started");
            shared.run(first, &name).await;

            // Help drain the backlog, but never wait on an empty queue
            loop {
                let next = match shared.rx.try_lock() {
                    Ok(mut rx) => rx.try_recv().ok(),
                    Err(_) => None,
                };
                match next {
                    Some(job) => shared.run(job, &name).await,
                    None => break,
                }
            }

            shared.workers.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(worker = %name, "Burst worker stopped");
        });
    }

    /// Jobs waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Workers currently alive (core plus burst)
    pub fn worker_count(&self) -> usize {
        self.shared.workers.load(Ordering::SeqCst)
    }

    /// Configured core worker count
    pub fn core_workers(&self) -> usize {
        self.shared.core_workers
    }

    /// Pool statistics
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Wait until every admitted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn config(core: usize, max: usize, capacity: usize) -> PoolConfig {
        PoolConfig {
            core_workers: core,
            max_workers: max,
            queue_capacity: capacity,
            worker_name_prefix: "test-".to_string(),
        }
    }

    #[tokio::test]
    async fn test_runs_all_jobs() {
        let pool = WorkerPool::new(&PoolConfig::default()).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(pool.stats().completed, 20);
        assert_eq!(pool.stats().rejected, 0);
    }

    #[tokio::test]
    async fn test_burst_then_reject() {
        // current_thread runtime: spawned workers do not run until we yield
        let pool = WorkerPool::new(&config(1, 2, 1)).unwrap();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));

        let blocked = |gate: Arc<tokio::sync::Semaphore>| async move {
            let _permit = gate.acquire().await;
        };

        // Fills the queue
        pool.submit(blocked(Arc::clone(&gate))).unwrap();
        // Queue full: burst worker takes it
        pool.submit(blocked(Arc::clone(&gate))).unwrap();
        assert_eq!(pool.worker_count(), 2);
        // Queue full and at max workers
        let err = pool.submit(blocked(Arc::clone(&gate))).unwrap_err();
        assert!(matches!(err, PoolError::Saturated { .. }));

        gate.add_permits(10);
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();

        let stats = pool.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.burst_spawned, 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(&config(1, 1, 4)).unwrap();
        let counter = Arc::new(AtomicU32::new(0));

        pool.submit(async { panic!("boom") }).unwrap();
        let c = Arc::clone(&counter);
        pool.submit(async move {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_wait_idle_when_empty() {
        let pool = WorkerPool::new(&config(1, 1, 1)).unwrap();
        tokio::time::timeout(Duration::from_millis(100), pool.wait_idle())
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            WorkerPool::new(&config(0, 1, 1)),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorkerPool::new(&config(3, 2, 1)),
            Err(PoolError::InvalidConfig(_))
        ));
    }
}
