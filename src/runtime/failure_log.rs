use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;
use crate::runtime::pipeline::Stage;
use crate::runtime::task::Task;

/// One failed task, as written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub run_id: Uuid,
    pub task_id: u64,
    /// The spawn table the task was meant to produce.
    pub context: String,
    /// Pipeline stage that failed; absent when the task panicked.
    pub stage: Option<Stage>,
    pub error: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
    pub timestamp_ms: u64,
}

struct Sink {
    file: Option<File>,
    records: Vec<FailureRecord>,
}

/// Append-only record of failed tasks, one JSON line each.
///
/// Appends are serialised, so concurrent workers never interleave
/// records. Write errors are reported on the log stream and otherwise
/// swallowed: a broken log must not fail the batch.
pub struct FailureLog {
    run_id: Uuid,
    path: Option<PathBuf>,
    sink: Mutex<Sink>,
}

impl FailureLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open failure log {}", path.display()))?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            path: Some(path),
            sink: Mutex::new(Sink { file: Some(file), records: Vec::new() }),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            path: None,
            sink: Mutex::new(Sink { file: None, records: Vec::new() }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn record_error(&self, task: &Task, context: &str, stage: Option<Stage>, err: &(dyn Error + Send + Sync + 'static)) {
        let causes = error_chain(err);
        self.append(task, context, stage, err.to_string(), causes).await;
    }

    pub async fn record_message(&self, task: &Task, context: &str, stage: Option<Stage>, message: impl Into<String>) {
        self.append(task, context, stage, message.into(), Vec::new()).await;
    }

    async fn append(&self, task: &Task, context: &str, stage: Option<Stage>, error: String, causes: Vec<String>) {
        let record = FailureRecord {
            run_id: self.run_id,
            task_id: task.id,
            context: context.to_string(),
            stage,
            error,
            causes,
            timestamp_ms: now_ms(),
        };

        let mut sink = self.sink.lock().await;
        if let Some(file) = sink.file.as_mut() {
            if let Err(e) = write_line(file, &record).await {
                error!(task_id = task.id, error = %e, "failed to append to failure log");
            }
        }
        sink.records.push(record);
    }

    pub async fn records(&self) -> Vec<FailureRecord> {
        self.sink.lock().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.sink.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reads back every record in a log file, across runs.
    pub async fn read(path: impl AsRef<Path>) -> Result<Vec<FailureRecord>> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read failure log {}", path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Malformed record on line {} of {}", n + 1, path.display()))
            })
            .collect()
    }
}

async fn write_line(file: &mut File, record: &FailureRecord) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

fn error_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
