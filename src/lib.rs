//! Batch CLIP embedding extraction.
//!
//! Give [`extract()`] a model directory, a list of image or directory paths,
//! and a list of text strings; get back parallel arrays of embedding
//! vectors plus per-stage timing. Individual items that fail to decode or
//! encode are skipped and reported; only a missing model or empty input
//! aborts the batch.

pub mod clip;
pub mod config;
pub mod extract;
pub mod logging;
pub mod scanner;
pub mod similarity;

pub use clip::{ClipEngine, OnnxClip};
pub use extract::{
    extract, run_batch, EncodingResult, ExtractOptions, ExtractProgress, TimingStats,
};
pub use similarity::cosine_similarity;
