use crate::error::DecompressError;
use std::fmt::Debug;
use std::path::Path;

pub trait Decompressor: Send + Sync + Debug {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, DecompressError>;
}

/// Decodes `.lzma` (LZMA-alone) streams, including the 13-byte header.
#[derive(Debug, Default)]
pub struct LzmaDecompressor;

impl Decompressor for LzmaDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, DecompressError> {
        let mut input = data;
        let mut output = Vec::with_capacity(data.len() * 4);
        lzma_rs::lzma_decompress(&mut input, &mut output)
            .map_err(|e| DecompressError::Corrupt(e.to_string()))?;
        Ok(output)
    }
}

/// Artifacts stored compressed are recognised by extension alone.
pub fn is_compressed(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext == "lzma")
}
