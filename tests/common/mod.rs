#![allow(dead_code)]

use dashmap::DashMap;
use serde_json::json;
use spawntable::compute::{EngineHandle, SpawnEngine, VolumeDescriptor};
use spawntable::error::ComputeError;
use spawntable::storage::fetcher::{BBOXES_FILE, METADATA_FILE, SEGMENTATION_FILE, SIZES_FILE};
use spawntable::storage::memory::InMemoryObjectStore;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub fn metadata() -> Vec<u8> {
    json!({
        "segment_id_type": "UInt32",
        "bounding_box_type": "UInt16",
        "size_type": "UInt32",
        "num_segments": 2,
        "chunk_voxel_dimensions": [4, 4, 4],
        "voxel_resolution": [1, 1, 1],
        "physical_offset_min": [0, 0, 0],
        "physical_offset_max": [4, 4, 4]
    })
    .to_string()
    .into_bytes()
}

pub fn lzma(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    lzma_rs::lzma_compress(&mut &plain[..], &mut out).unwrap();
    out
}

/// Puts the four artifacts of one chunk into the store. `segmentation` is
/// the decompressed content; it is stored LZMA-compressed.
pub fn seed_volume(store: &InMemoryObjectStore, bucket: &str, path: &str, segmentation: &[u8]) {
    store.insert(bucket, &format!("{}{}", path, METADATA_FILE), metadata());
    store.insert(bucket, &format!("{}{}", path, SEGMENTATION_FILE), lzma(segmentation));
    store.insert(bucket, &format!("{}{}", path, SIZES_FILE), vec![1, 0, 0, 0, 2, 0, 0, 0]);
    store.insert(bucket, &format!("{}{}", path, BBOXES_FILE), vec![0u8; 12]);
}

/// Engine stand-in that answers with a fixed buffer and fails when the
/// pre volume's segmentation equals `poison`.
pub struct MockEngine {
    pub result: Vec<u8>,
    pub poison: Option<Vec<u8>>,
    pub generated: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_read: bool,
    next: AtomicU64,
    live: DashMap<u64, ()>,
}

impl MockEngine {
    pub fn new(result: impl Into<Vec<u8>>) -> Self {
        Self {
            result: result.into(),
            poison: None,
            generated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            fail_read: false,
            next: AtomicU64::new(1),
            live: DashMap::new(),
        }
    }

    pub fn poisoned_by(mut self, segmentation: impl Into<Vec<u8>>) -> Self {
        self.poison = Some(segmentation.into());
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_read = true;
        self
    }

    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }
}

impl SpawnEngine for MockEngine {
    fn generate(&self, pre: &VolumeDescriptor, _post: &VolumeDescriptor) -> Result<EngineHandle, ComputeError> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        if self.poison.as_deref() == Some(pre.segmentation.as_slice()) {
            return Err(ComputeError::Engine("poisoned input".to_string()));
        }
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.live.insert(id, ());
        Ok(EngineHandle::new(id))
    }

    fn read_result(&self, handle: &EngineHandle) -> Result<Vec<u8>, ComputeError> {
        if self.fail_read {
            return Err(ComputeError::InvalidOutput("unreadable".to_string()));
        }
        if !self.live.contains_key(&handle.id()) {
            return Err(ComputeError::UnknownHandle(handle.id()));
        }
        Ok(self.result.clone())
    }

    fn release(&self, handle: EngineHandle) {
        self.live.remove(&handle.id());
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
