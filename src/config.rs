use std::path::PathBuf;
use std::time::Duration;
use crate::error::ConfigError;
use crate::storage::http::DEFAULT_STORAGE_HOST;
use crate::storage::retry::RetryPolicy;

pub const DEFAULT_WORKERS: usize = 60;
pub const DEFAULT_TMP_ROOT: &str = "/tmp/";
pub const DEFAULT_FAILURE_LOG: &str = "spawn.log";

/// Known datasets and the bucket their chunks live in.
const DATASETS: &[(u32, &str)] = &[(1, "e2198_compressed"), (11, "zfish")];

pub fn bucket_for_dataset(dataset: u32) -> Result<&'static str, ConfigError> {
    DATASETS
        .iter()
        .find(|(id, _)| *id == dataset)
        .map(|(_, bucket)| *bucket)
        .ok_or(ConfigError::UnknownDataset(dataset))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub download: RetryPolicy,
    pub decompress: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            download: RetryPolicy::download(),
            decompress: RetryPolicy::decompress(),
        }
    }
}

impl RetryConfig {
    /// Millisecond-scale policies with the same shape as the defaults.
    pub fn fast() -> Self {
        Self {
            download: RetryPolicy::Exponential {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                max_attempts: None,
            },
            decompress: RetryPolicy::Fixed {
                delay: Duration::from_millis(1),
                max_attempts: 3,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    /// Root of the on-disk artifact cache.
    pub tmp_root: PathBuf,
    pub storage_host: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry: RetryConfig,
    /// Retry uploads with the download policy.
    pub publish_retry: bool,
    /// Skip tasks whose spawn table is already in the store.
    pub skip_existing: bool,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            tmp_root: PathBuf::from(DEFAULT_TMP_ROOT),
            storage_host: DEFAULT_STORAGE_HOST.to_string(),
            workers: DEFAULT_WORKERS,
            queue_capacity: 1024,
            retry: RetryConfig::default(),
            publish_retry: false,
            skip_existing: false,
        }
    }
}

impl SpawnerConfig {
    pub fn with_tmp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tmp_root = root.into();
        self
    }

    pub fn with_storage_host(mut self, host: impl Into<String>) -> Self {
        self.storage_host = host.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_publish_retry(mut self, enabled: bool) -> Self {
        self.publish_retry = enabled;
        self
    }

    pub fn with_skip_existing(mut self, enabled: bool) -> Self {
        self.skip_existing = enabled;
        self
    }

    /// Default task list location for a bucket: `<tmp_root><bucket>.tasks`.
    pub fn task_list_path(&self, bucket: &str) -> PathBuf {
        self.tmp_root.join(format!("{}.tasks", bucket))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}
