//! Boundary to the external volume comparison engine.
//!
//! The engine itself is opaque. This module only marshals fetched
//! artifacts into the descriptors it expects, runs it off the async
//! runtime, copies the result out and hands the handle back.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use crate::error::ComputeError;
use crate::storage::fetcher::VolumeArtifacts;

pub mod subprocess;

/// Keys a chunk's `metadata.json` must define before it is handed to the engine.
pub const REQUIRED_METADATA_KEYS: &[&str] = &[
    "segment_id_type",
    "bounding_box_type",
    "size_type",
    "num_segments",
    "chunk_voxel_dimensions",
    "voxel_resolution",
    "physical_offset_min",
    "physical_offset_max",
];

/// Input volume as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub metadata: String,
    pub bboxes: Vec<u8>,
    pub sizes: Vec<u8>,
    pub segmentation: Vec<u8>,
}

impl VolumeDescriptor {
    pub fn from_artifacts(artifacts: VolumeArtifacts) -> Result<Self, ComputeError> {
        let metadata = String::from_utf8(artifacts.metadata)
            .map_err(|e| ComputeError::InvalidMetadata(e.to_string()))?;
        validate_metadata(&metadata)?;

        Ok(Self {
            metadata,
            bboxes: artifacts.bboxes,
            sizes: artifacts.sizes,
            segmentation: artifacts.segmentation,
        })
    }

    /// Length-prefixed wire form: metadata, bboxes, sizes, segmentation,
    /// each as a little-endian `u32` length followed by the bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ComputeError> {
        let mut buf = Vec::with_capacity(
            16 + self.metadata.len() + self.bboxes.len() + self.sizes.len() + self.segmentation.len(),
        );
        for field in [self.metadata.as_bytes(), self.bboxes.as_slice(), self.sizes.as_slice(), self.segmentation.as_slice()] {
            let len = u32::try_from(field.len())
                .map_err(|_| ComputeError::Engine(format!("field of {} bytes exceeds u32 length prefix", field.len())))?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(field);
        }
        Ok(buf)
    }

    /// Reads one descriptor from the front of `buf`, returning it and the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ComputeError> {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(4);
        for _ in 0..4 {
            let (field, used) = read_prefixed(&buf[offset..])?;
            fields.push(field.to_vec());
            offset += used;
        }
        let segmentation = fields.pop().unwrap_or_default();
        let sizes = fields.pop().unwrap_or_default();
        let bboxes = fields.pop().unwrap_or_default();
        let metadata = String::from_utf8(fields.pop().unwrap_or_default())
            .map_err(|e| ComputeError::InvalidMetadata(e.to_string()))?;

        Ok((Self { metadata, bboxes, sizes, segmentation }, offset))
    }
}

/// Splits a `u32`-length-prefixed field off the front of `buf`.
pub fn read_prefixed(buf: &[u8]) -> Result<(&[u8], usize), ComputeError> {
    let header: [u8; 4] = buf
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| ComputeError::InvalidOutput(format!("need 4 length bytes, have {}", buf.len())))?;
    let len = u32::from_le_bytes(header) as usize;
    let body = buf
        .get(4..4 + len)
        .ok_or_else(|| ComputeError::InvalidOutput(format!("length prefix {} exceeds {} available bytes", len, buf.len() - 4)))?;
    Ok((body, 4 + len))
}

pub fn validate_metadata(metadata: &str) -> Result<(), ComputeError> {
    let parsed: Value = serde_json::from_str(metadata)
        .map_err(|e| ComputeError::InvalidMetadata(e.to_string()))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| ComputeError::InvalidMetadata("metadata is not a JSON object".to_string()))?;

    let missing: Vec<&str> = REQUIRED_METADATA_KEYS
        .iter()
        .copied()
        .filter(|key| object.get(*key).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(ComputeError::InvalidMetadata(format!("missing {}", missing.join(", "))));
    }
    Ok(())
}

/// Result handle owned by the engine until released.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The opaque comparison engine. Calls block; they are run on the blocking pool.
pub trait SpawnEngine: Send + Sync {
    fn generate(&self, pre: &VolumeDescriptor, post: &VolumeDescriptor) -> Result<EngineHandle, ComputeError>;
    /// Copies the result buffer behind `handle` out of engine memory.
    fn read_result(&self, handle: &EngineHandle) -> Result<Vec<u8>, ComputeError>;
    fn release(&self, handle: EngineHandle);
}

/// Releases the handle when dropped, whichever way the call exits.
struct HandleGuard<'a> {
    engine: &'a dyn SpawnEngine,
    handle: Option<EngineHandle>,
}

impl<'a> HandleGuard<'a> {
    fn new(engine: &'a dyn SpawnEngine, handle: EngineHandle) -> Self {
        Self { engine, handle: Some(handle) }
    }

    fn handle(&self) -> Option<&EngineHandle> {
        self.handle.as_ref()
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(handle = handle.id(), "releasing engine result");
            self.engine.release(handle);
        }
    }
}

#[derive(Clone)]
pub struct ComputeAdapter {
    engine: Arc<dyn SpawnEngine>,
}

impl ComputeAdapter {
    pub fn new(engine: Arc<dyn SpawnEngine>) -> Self {
        Self { engine }
    }

    pub async fn compute(&self, pre: VolumeArtifacts, post: VolumeArtifacts) -> Result<Vec<u8>, ComputeError> {
        let pre = VolumeDescriptor::from_artifacts(pre)?;
        let post = VolumeDescriptor::from_artifacts(post)?;
        let engine = self.engine.clone();

        tokio::task::spawn_blocking(move || run_engine(engine.as_ref(), &pre, &post))
            .await
            .map_err(|e| ComputeError::Aborted(e.to_string()))?
    }
}

fn run_engine(engine: &dyn SpawnEngine, pre: &VolumeDescriptor, post: &VolumeDescriptor) -> Result<Vec<u8>, ComputeError> {
    let guard = HandleGuard::new(engine, engine.generate(pre, post)?);
    match guard.handle() {
        Some(handle) => engine.read_result(handle),
        None => Err(ComputeError::Engine("result handle already released".to_string())),
    }
}
