//! Batch computation of spawn tables between neighbouring segmentation
//! chunks: a fixed worker pool fetches both chunks' artifacts through a
//! shared on-disk cache, runs the external comparison engine and uploads
//! the result. One failing task is logged and never stops the batch.

pub mod compute;
pub mod config;
pub mod error;
pub mod publish;
pub mod runtime;
pub mod storage;
