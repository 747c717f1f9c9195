use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use crate::compute::{ComputeAdapter, SpawnEngine};
use crate::config::SpawnerConfig;
use crate::error::TaskError;
use crate::publish::{ResultPublisher, spawn_table_key};
use crate::runtime::failure_log::FailureLog;
use crate::runtime::task::Task;
use crate::storage::ObjectStore;
use crate::storage::cache::FetchCache;
use crate::storage::codec::{Decompressor, LzmaDecompressor};
use crate::storage::fetcher::ArtifactFetcher;

/// Where a task is in its life. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchingPre,
    FetchingPost,
    Computing,
    Publishing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Published { key: String },
    /// Output already present and skipping was enabled.
    Skipped { key: String },
    Failed { stage: Option<Stage> },
}

/// Runs one task to completion. Implementations never propagate a task's
/// failure; they record it and report `TaskOutcome::Failed`.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> TaskOutcome;

    /// Called when `run` panicked instead of returning.
    async fn record_panic(&self, task: &Task, message: String);
}

pub struct TaskPipeline {
    fetcher: ArtifactFetcher,
    compute: ComputeAdapter,
    publisher: ResultPublisher,
    failures: Arc<FailureLog>,
    skip_existing: bool,
}

impl TaskPipeline {
    pub fn new(
        fetcher: ArtifactFetcher,
        compute: ComputeAdapter,
        publisher: ResultPublisher,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            fetcher,
            compute,
            publisher,
            failures,
            skip_existing: false,
        }
    }

    /// Wires the cache, engine and publisher described by `config` around `store`.
    pub fn from_config(
        config: &SpawnerConfig,
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn SpawnEngine>,
        failures: Arc<FailureLog>,
    ) -> Self {
        let decompressor: Arc<dyn Decompressor> = Arc::new(LzmaDecompressor);
        let cache = FetchCache::new(&config.tmp_root, store.clone(), decompressor)
            .with_download_policy(config.retry.download.clone())
            .with_decompress_policy(config.retry.decompress.clone());

        let mut publisher = ResultPublisher::new(store);
        if config.publish_retry {
            publisher = publisher.with_retry(config.retry.download.clone());
        }

        Self::new(
            ArtifactFetcher::new(Arc::new(cache)),
            ComputeAdapter::new(engine),
            publisher,
            failures,
        )
        .with_skip_existing(config.skip_existing)
    }

    pub fn with_skip_existing(mut self, enabled: bool) -> Self {
        self.skip_existing = enabled;
        self
    }

    pub fn fetcher(&self) -> &ArtifactFetcher {
        &self.fetcher
    }

    pub fn failures(&self) -> &Arc<FailureLog> {
        &self.failures
    }

    async fn execute(&self, task: &Task, key: &str, stage: &mut Stage) -> Result<TaskOutcome, TaskError> {
        if self.skip_existing && self.publisher.exists(&task.bucket, key).await.map_err(TaskError::Lookup)? {
            debug!(task_id = task.id, key, "spawn table exists, skipping");
            return Ok(TaskOutcome::Skipped { key: key.to_string() });
        }

        *stage = Stage::FetchingPre;
        let pre = self.fetcher.fetch(&task.bucket, &task.pre_path).await?;

        *stage = Stage::FetchingPost;
        let post = self.fetcher.fetch(&task.bucket, &task.post_path).await?;

        *stage = Stage::Computing;
        let table = self.compute.compute(pre, post).await?;

        *stage = Stage::Publishing;
        self.publisher.publish(&task.bucket, key, table).await?;

        *stage = Stage::Done;
        Ok(TaskOutcome::Published { key: key.to_string() })
    }
}

#[async_trait]
impl TaskRunner for TaskPipeline {
    async fn run(&self, task: &Task) -> TaskOutcome {
        let key = spawn_table_key(&task.pre_path, &task.post_path);
        let mut stage = Stage::FetchingPre;

        match self.execute(task, &key, &mut stage).await {
            Ok(outcome) => outcome,
            Err(err) => {
                debug!(task_id = task.id, key = %key, ?stage, error = %err, "task failed");
                self.failures.record_error(task, &key, Some(stage), &err).await;
                TaskOutcome::Failed { stage: Some(stage) }
            }
        }
    }

    async fn record_panic(&self, task: &Task, message: String) {
        let key = spawn_table_key(&task.pre_path, &task.post_path);
        self.failures.record_message(task, &key, None, message).await;
    }
}
