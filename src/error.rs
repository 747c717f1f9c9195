use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by an object store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("server error {status} from {url}")]
    Server { url: String, status: u16 },

    #[error("truncated body from {url}: received {received} of {expected} bytes")]
    Truncated { url: String, expected: u64, received: u64 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("object not found: {url}")]
    NotFound { url: String },

    #[error("request to {url} rejected with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl StoreError {
    /// Server-side and incomplete-transfer failures are expected to clear up on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Server { .. } | StoreError::Truncated { .. } | StoreError::Transport { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("corrupt lzma stream: {0}")]
    Corrupt(String),

    #[error("decompression interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download of {key} failed")]
    Download {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("cache io on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decompressing {key} failed after {attempts} attempt(s)")]
    Decompress {
        key: String,
        attempts: u32,
        #[source]
        source: DecompressError,
    },

    #[error("{key} does not map to a path inside the cache root")]
    UnsafePath { key: String },

    #[error("cache writer for {path} did not finish: {message}")]
    Interrupted { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("engine failed: {0}")]
    Engine(String),

    #[error("engine produced malformed output: {0}")]
    InvalidOutput(String),

    #[error("unknown engine handle {0}")]
    UnknownHandle(u64),

    #[error("engine io")]
    Io(#[from] std::io::Error),

    #[error("engine thread aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("upload of {bucket}/{key} failed")]
    Store {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Anything that can take a task into the failed state.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("checking for existing output failed")]
    Lookup(#[source] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown dataset id {0}")]
    UnknownDataset(u32),

    #[error("worker pool size must be at least 1")]
    NoWorkers,
}
