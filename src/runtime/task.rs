use serde::{Deserialize, Serialize};

/// One spawn table to compute: `pre_path` against its neighbour `post_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Position in the task list, used for progress reporting.
    pub id: u64,
    pub bucket: String,
    pub pre_path: String,
    pub post_path: String,
}

/// What travels through the task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Task(Task),
    /// No more tasks. Every worker that sees it puts it back before exiting.
    Shutdown,
}

/// A `(pre_path, post_path)` entry of the task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPair(pub String, pub String);

impl PathPair {
    pub fn new(pre: impl Into<String>, post: impl Into<String>) -> Self {
        Self(pre.into(), post.into())
    }
}
