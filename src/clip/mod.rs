//! CLIP (Contrastive Language-Image Pre-training) encoder boundary.
//!
//! The orchestrator drives the encoders through the [`ClipEngine`] trait;
//! [`OnnxClip`] is the ONNX Runtime implementation. Image decoding and
//! input preprocessing live alongside it.

mod engine;
mod preprocess;

pub use engine::{ClipEngine, ImageTensor, OnnxClip, TokenizedText, CONTEXT_LENGTH};
pub use preprocess::{load_image, to_input_tensor, CLIP_IMAGE_SIZE};
