//! Fixed-size pool of workers draining a shared task queue.
//!
//! Workers are symmetric: each pops an item, runs the task to completion
//! and loops. On `Shutdown` a worker puts the sentinel back for its peers
//! and exits, so the pool drains without any central coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use crate::runtime::pipeline::{TaskOutcome, TaskRunner};
use crate::runtime::queue::TaskQueue;
use crate::runtime::task::{QueueItem, Task};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("worker {worker} stopped abnormally: {message}")]
    WorkerLost { worker: usize, message: String },
}

/// Totals across every worker, taken after the pool has drained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Tasks handled by each worker, indexed by worker id.
    pub per_worker: Vec<u64>,
    pub busy_time: Duration,
}

impl PoolStats {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }
}

#[derive(Default)]
struct SharedPoolStats {
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    busy_ms: AtomicU64,
}

impl SharedPoolStats {
    fn record(&self, outcome: &TaskOutcome, elapsed: Duration) {
        let counter = match outcome {
            TaskOutcome::Published { .. } => &self.succeeded,
            TaskOutcome::Skipped { .. } => &self.skipped,
            TaskOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.busy_ms.fetch_add(elapsed.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<u64>>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Spawns `size` workers. `total` is only used for progress lines.
    pub fn start(
        size: usize,
        queue: Arc<dyn TaskQueue>,
        runner: Arc<dyn TaskRunner>,
        total: usize,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::NoWorkers);
        }

        let stats = Arc::new(SharedPoolStats::default());
        let handles = (0..size)
            .map(|worker| {
                let worker_loop = Worker {
                    id: worker,
                    queue: queue.clone(),
                    runner: runner.clone(),
                    stats: stats.clone(),
                    total,
                };
                tokio::spawn(worker_loop.run())
            })
            .collect();

        info!(workers = size, "worker pool started");
        Ok(Self { handles, stats })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits until every worker has seen the sentinel and exited.
    pub async fn join(self) -> Result<PoolStats, PoolError> {
        let workers = self.handles.len();
        let mut per_worker = Vec::with_capacity(workers);
        for (worker, handle) in self.handles.into_iter().enumerate() {
            let processed = handle.await.map_err(|e| PoolError::WorkerLost {
                worker,
                message: e.to_string(),
            })?;
            per_worker.push(processed);
        }

        Ok(PoolStats {
            workers,
            succeeded: self.stats.succeeded.load(Ordering::SeqCst),
            skipped: self.stats.skipped.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            per_worker,
            busy_time: Duration::from_millis(self.stats.busy_ms.load(Ordering::SeqCst)),
        })
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    stats: Arc<SharedPoolStats>,
    total: usize,
}

impl Worker {
    /// Returns how many tasks this worker handled.
    async fn run(self) -> u64 {
        let mut processed = 0;
        debug!(worker = self.id, "worker started");

        loop {
            let item = match self.queue.pop().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    warn!(worker = self.id, "task queue closed before shutdown sentinel");
                    break;
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "failed to read task queue");
                    break;
                }
            };

            match item {
                QueueItem::Shutdown => {
                    if let Err(e) = self.queue.push(QueueItem::Shutdown).await {
                        warn!(worker = self.id, error = %e, "could not pass shutdown on");
                    }
                    break;
                }
                QueueItem::Task(task) => {
                    info!("Processing task {}/{}", task.id, self.total);
                    let started = Instant::now();
                    let outcome = self.run_isolated(task).await;
                    self.stats.record(&outcome, started.elapsed());
                    processed += 1;
                }
            }
        }

        debug!(worker = self.id, processed, "worker stopped");
        processed
    }

    /// Runs the task on its own tokio task so that even a panic stays
    /// confined to it.
    async fn run_isolated(&self, task: Task) -> TaskOutcome {
        let runner = self.runner.clone();
        let spawned = task.clone();
        match tokio::spawn(async move { runner.run(&spawned).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("task {} aborted: {}", task.id, e);
                debug!(worker = self.id, task_id = task.id, "{}", message);
                self.runner.record_panic(&task, message).await;
                TaskOutcome::Failed { stage: None }
            }
        }
    }
}
