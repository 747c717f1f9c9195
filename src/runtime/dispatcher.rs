use anyhow::{Context as AnyhowContext, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use crate::runtime::pipeline::TaskRunner;
use crate::runtime::pool::{PoolStats, WorkerPool};
use crate::runtime::queue::{InMemoryTaskQueue, TaskQueue};
use crate::runtime::task::{PathPair, QueueItem, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub elapsed: Duration,
    pub pool: PoolStats,
}

/// Feeds a task list through a worker pool and waits for it to drain.
pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    workers: usize,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn TaskRunner>, workers: usize, queue_capacity: usize) -> Self {
        Self::with_queue(Arc::new(InMemoryTaskQueue::new(queue_capacity)), runner, workers)
    }

    pub fn with_queue(queue: Arc<dyn TaskQueue>, runner: Arc<dyn TaskRunner>, workers: usize) -> Self {
        Self { queue, runner, workers }
    }

    /// Enqueues every pair in order, ids counting up from 0, followed by
    /// the shutdown sentinel; returns once all workers have exited.
    pub async fn run(&self, bucket: &str, pairs: Vec<PathPair>) -> Result<BatchReport> {
        let started = Instant::now();
        let total = pairs.len();
        info!("Done. Found {} tasks", total);

        let pool = WorkerPool::start(self.workers, self.queue.clone(), self.runner.clone(), total)
            .context("Failed to start worker pool")?;

        for (id, PathPair(pre_path, post_path)) in pairs.into_iter().enumerate() {
            let task = Task {
                id: id as u64,
                bucket: bucket.to_string(),
                pre_path,
                post_path,
            };
            self.queue.push(QueueItem::Task(task)).await?;
        }
        self.queue.push(QueueItem::Shutdown).await?;

        let stats = pool.join().await.context("Worker pool did not shut down cleanly")?;
        let report = BatchReport {
            total,
            succeeded: stats.succeeded,
            skipped: stats.skipped,
            failed: stats.failed,
            elapsed: started.elapsed(),
            pool: stats,
        };

        info!(
            total = report.total,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch finished"
        );
        Ok(report)
    }
}
