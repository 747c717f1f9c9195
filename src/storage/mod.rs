use async_trait::async_trait;
use crate::error::StoreError;

pub mod cache;
pub mod codec;
pub mod fetcher;
pub mod http;
pub mod memory;
pub mod retry;

/// Blob read/write service addressed by bucket and object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, object: &str) -> Result<Vec<u8>, StoreError>;
    async fn put(&self, bucket: &str, object: &str, data: Vec<u8>, content_type: &str) -> Result<(), StoreError>;
    async fn exists(&self, bucket: &str, object: &str) -> Result<bool, StoreError>;
}
