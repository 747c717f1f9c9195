use std::sync::Arc;
use crate::error::FetchError;
use crate::storage::cache::{FetchCache, FetchKey};

pub const METADATA_FILE: &str = "metadata.json";
pub const SEGMENTATION_FILE: &str = "segmentation.lzma";
pub const SIZES_FILE: &str = "segmentation.size";
pub const BBOXES_FILE: &str = "segmentation.bbox";

/// Everything the engine needs about one volume chunk. Segmentation is
/// already decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeArtifacts {
    pub metadata: Vec<u8>,
    pub segmentation: Vec<u8>,
    pub sizes: Vec<u8>,
    pub bboxes: Vec<u8>,
}

#[derive(Clone)]
pub struct ArtifactFetcher {
    cache: Arc<FetchCache>,
}

impl ArtifactFetcher {
    pub fn new(cache: Arc<FetchCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<FetchCache> {
        &self.cache
    }

    /// Fetches all four artifacts under `path`; the first failure aborts the set.
    pub async fn fetch(&self, bucket: &str, path: &str) -> Result<VolumeArtifacts, FetchError> {
        let get = |filename: &str| {
            let key = FetchKey::new(bucket, path, filename);
            async move { self.cache.get(&key).await }
        };

        Ok(VolumeArtifacts {
            metadata: get(METADATA_FILE).await?,
            segmentation: get(SEGMENTATION_FILE).await?,
            sizes: get(SIZES_FILE).await?,
            bboxes: get(BBOXES_FILE).await?,
        })
    }
}
