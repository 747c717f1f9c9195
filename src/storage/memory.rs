use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use crate::error::StoreError;
use crate::storage::ObjectStore;

/// Failure injected in place of a real response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Server(u16),
    Truncated,
    NotFound,
    Rejected(u16),
}

impl ScriptedFailure {
    fn into_error(self, url: String) -> StoreError {
        match self {
            ScriptedFailure::Server(status) => StoreError::Server { url, status },
            ScriptedFailure::Truncated => StoreError::Truncated { url, expected: 1, received: 0 },
            ScriptedFailure::NotFound => StoreError::NotFound { url },
            ScriptedFailure::Rejected(status) => StoreError::Rejected { url, status },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

type ObjectId = (String, String);

/// Process-local object store used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<ObjectId, StoredObject>,
    get_failures: DashMap<ObjectId, VecDeque<ScriptedFailure>>,
    put_failures: DashMap<ObjectId, VecDeque<ScriptedFailure>>,
    gets: DashMap<ObjectId, usize>,
    puts: DashMap<ObjectId, usize>,
    latency: Option<Duration>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, bucket: &str, object: &str, data: impl Into<Vec<u8>>) {
        self.objects.insert(
            id(bucket, object),
            StoredObject { data: data.into(), content_type: "application/octet-stream".to_string() },
        );
    }

    pub fn object(&self, bucket: &str, object: &str) -> Option<StoredObject> {
        self.objects.get(&id(bucket, object)).map(|o| o.value().clone())
    }

    /// The next `failures.len()` reads of the object fail in order.
    pub fn fail_gets(&self, bucket: &str, object: &str, failures: impl IntoIterator<Item = ScriptedFailure>) {
        self.get_failures.entry(id(bucket, object)).or_default().extend(failures);
    }

    pub fn fail_puts(&self, bucket: &str, object: &str, failures: impl IntoIterator<Item = ScriptedFailure>) {
        self.put_failures.entry(id(bucket, object)).or_default().extend(failures);
    }

    /// Number of reads attempted against the object, failed ones included.
    pub fn get_count(&self, bucket: &str, object: &str) -> usize {
        self.gets.get(&id(bucket, object)).map(|c| *c).unwrap_or(0)
    }

    pub fn put_count(&self, bucket: &str, object: &str) -> usize {
        self.puts.get(&id(bucket, object)).map(|c| *c).unwrap_or(0)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn id(bucket: &str, object: &str) -> ObjectId {
    (bucket.to_string(), object.to_string())
}

fn next_failure(script: &DashMap<ObjectId, VecDeque<ScriptedFailure>>, key: &ObjectId) -> Option<ScriptedFailure> {
    script.get_mut(key).and_then(|mut queue| queue.pop_front())
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StoreError> {
        let key = id(bucket, object);
        *self.gets.entry(key.clone()).or_insert(0) += 1;
        self.delay().await;

        let url = format!("memory://{}/{}", bucket, object);
        if let Some(failure) = next_failure(&self.get_failures, &key) {
            return Err(failure.into_error(url));
        }
        self.objects
            .get(&key)
            .map(|o| o.data.clone())
            .ok_or(StoreError::NotFound { url })
    }

    async fn put(&self, bucket: &str, object: &str, data: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let key = id(bucket, object);
        *self.puts.entry(key.clone()).or_insert(0) += 1;
        self.delay().await;

        if let Some(failure) = next_failure(&self.put_failures, &key) {
            return Err(failure.into_error(format!("memory://{}/{}", bucket, object)));
        }
        self.objects.insert(key, StoredObject { data, content_type: content_type.to_string() });
        Ok(())
    }

    async fn exists(&self, bucket: &str, object: &str) -> Result<bool, StoreError> {
        self.delay().await;
        Ok(self.objects.contains_key(&id(bucket, object)))
    }
}
