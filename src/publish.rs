use std::sync::Arc;
use tracing::info;
use crate::error::{PublishError, StoreError};
use crate::storage::ObjectStore;
use crate::storage::retry::{RetryPolicy, retry};

pub const SPAWN_TABLE_CONTENT_TYPE: &str = "application/octet-stream";
pub const SPAWN_TABLE_SUFFIX: &str = ".pb.spawn";

/// Last component of a chunk path, ignoring trailing slashes.
pub fn chunk_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// `<pre_path><basename(post_path)>.pb.spawn`
pub fn spawn_table_key(pre_path: &str, post_path: &str) -> String {
    format!("{}{}{}", pre_path, chunk_name(post_path), SPAWN_TABLE_SUFFIX)
}

#[derive(Clone)]
pub struct ResultPublisher {
    store: Arc<dyn ObjectStore>,
    retry: Option<RetryPolicy>,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store, retry: None }
    }

    /// Retries transient upload failures with `policy`. Uploads are tried once otherwise.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.store.exists(bucket, key).await
    }

    pub async fn publish(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<(), PublishError> {
        let size = data.len();
        let result = match &self.retry {
            Some(policy) => {
                retry(policy, "publish", |e: &StoreError| e.is_transient(), |_| {
                    self.store.put(bucket, key, data.clone(), SPAWN_TABLE_CONTENT_TYPE)
                })
                .await
            }
            None => self.store.put(bucket, key, data, SPAWN_TABLE_CONTENT_TYPE).await,
        };

        result.map_err(|source| PublishError::Store {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;
        info!(bucket, key, size, "published spawn table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_post_chunk_basename() {
        assert_eq!(spawn_table_key("volA/", "volB/"), "volA/volB.pb.spawn");
        assert_eq!(
            spawn_table_key("seg/0-512_0-512_0-128/", "seg/512-1024_0-512_0-128/"),
            "seg/0-512_0-512_0-128/512-1024_0-512_0-128.pb.spawn"
        );
    }

    #[test]
    fn chunk_name_ignores_trailing_slashes() {
        assert_eq!(chunk_name("a/b//"), "b");
        assert_eq!(chunk_name("b"), "b");
    }
}
