use async_trait::async_trait;
use anyhow::Result;
use tokio::sync::mpsc;
use crate::runtime::task::QueueItem;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn push(&self, item: QueueItem) -> Result<()>;
    /// Waits for the next item. `None` once the queue can never yield again.
    async fn pop(&self) -> Result<Option<QueueItem>>;
}

/// Multi-consumer queue over a tokio channel. Consumers take turns on the
/// receiver, so each item is handed to exactly one of them.
pub struct InMemoryTaskQueue {
    sender: mpsc::Sender<QueueItem>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<QueueItem>>,
}

impl InMemoryTaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sender: tx,
            receiver: tokio::sync::Mutex::new(rx),
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn push(&self, item: QueueItem) -> Result<()> {
        self.sender.send(item).await.map_err(|e| anyhow::anyhow!("Task channel closed: {}", e))
    }

    async fn pop(&self) -> Result<Option<QueueItem>> {
        let mut rx = self.receiver.lock().await;
        Ok(rx.recv().await)
    }
}
