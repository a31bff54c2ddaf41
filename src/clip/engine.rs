//! Encoder trait and the ONNX Runtime implementation.

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tokenizers::Tokenizer;

use super::preprocess::{self, CLIP_IMAGE_SIZE};

/// CLIP text context length in tokens.
pub const CONTEXT_LENGTH: usize = 77;

/// Preprocessed image in NCHW layout, ready for the vision encoder.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub(crate) data: Vec<f32>,
}

/// Token ids padded to the model's context length.
#[derive(Debug, Clone)]
pub struct TokenizedText {
    pub(crate) ids: Vec<i64>,
}

/// The encoder collaborator the orchestrator drives.
///
/// One value owns one loaded model; dropping it releases the model. Tests
/// substitute scripted implementations to exercise the batch loops without
/// a model on disk.
pub trait ClipEngine {
    /// Length of the vectors produced by the vision encoder.
    fn vision_projection_dim(&self) -> usize;

    /// Length of the vectors produced by the text encoder.
    fn text_projection_dim(&self) -> usize;

    /// Convert a decoded image into the vision encoder's input.
    fn preprocess(&self, image: &DynamicImage) -> Result<ImageTensor>;

    /// Encode a preprocessed image into an embedding vector.
    fn encode_image(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>>;

    /// Tokenize a text string for the text encoder.
    fn tokenize(&self, text: &str) -> Result<TokenizedText>;

    /// Encode tokenized text into an embedding vector.
    fn encode_text(&mut self, tokens: &TokenizedText) -> Result<Vec<f32>>;
}

/// CLIP encoders backed by ONNX Runtime.
#[derive(Debug)]
pub struct OnnxClip {
    vision: Session,
    text: Session,
    tokenizer: Tokenizer,
    pad_id: i64,
    vision_dim: usize,
    text_dim: usize,
}

impl OnnxClip {
    /// Load the encoders from a model directory.
    ///
    /// The directory must contain `vision_model.onnx`, `text_model.onnx`
    /// and the matching `tokenizer.json`. `n_threads` sets the intra-op
    /// thread count of both sessions (ONNX Runtime fixes this at session
    /// construction, so the hint is consumed here rather than per call).
    pub fn load(model_dir: &Path, n_threads: usize) -> Result<Self> {
        let vision_path = model_dir.join("vision_model.onnx");
        let text_path = model_dir.join("text_model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&vision_path, &text_path, &tokenizer_path] {
            if !path.exists() {
                return Err(anyhow!("model file not found: {}", path.display()));
            }
        }

        let mut vision =
            build_session(&vision_path, n_threads).context("failed to load vision encoder")?;
        let mut text =
            build_session(&text_path, n_threads).context("failed to load text encoder")?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;
        let pad_id = tokenizer
            .token_to_id("<|endoftext|>")
            .ok_or_else(|| anyhow!("tokenizer missing <|endoftext|>"))? as i64;

        // One zero-input run per encoder validates the graph and yields the
        // projection dimension.
        let zeros = vec![0.0f32; 3 * (CLIP_IMAGE_SIZE * CLIP_IMAGE_SIZE) as usize];
        let vision_dim = run_vision(&mut vision, zeros)
            .context("vision encoder rejected probe input")?
            .len();
        let text_dim = run_text(&mut text, pad_to_context(Vec::new(), pad_id))
            .context("text encoder rejected probe input")?
            .len();

        tracing::info!(
            model_dir = %model_dir.display(),
            vision_dim,
            text_dim,
            n_threads,
            "CLIP model loaded"
        );

        Ok(Self {
            vision,
            text,
            tokenizer,
            pad_id,
            vision_dim,
            text_dim,
        })
    }
}

impl ClipEngine for OnnxClip {
    fn vision_projection_dim(&self) -> usize {
        self.vision_dim
    }

    fn text_projection_dim(&self) -> usize {
        self.text_dim
    }

    fn preprocess(&self, image: &DynamicImage) -> Result<ImageTensor> {
        Ok(preprocess::to_input_tensor(image))
    }

    fn encode_image(&mut self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        run_vision(&mut self.vision, tensor.data.clone())
    }

    fn tokenize(&self, text: &str) -> Result<TokenizedText> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {}", e))?;
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        Ok(TokenizedText {
            ids: pad_to_context(ids, self.pad_id),
        })
    }

    fn encode_text(&mut self, tokens: &TokenizedText) -> Result<Vec<f32>> {
        run_text(&mut self.text, tokens.ids.clone())
    }
}

fn build_session(path: &Path, n_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(n_threads)?
        .commit_from_file(path)?;
    Ok(session)
}

fn run_vision(session: &mut Session, data: Vec<f32>) -> Result<Vec<f32>> {
    let input = Tensor::from_array((
        [
            1usize,
            3,
            CLIP_IMAGE_SIZE as usize,
            CLIP_IMAGE_SIZE as usize,
        ],
        data.into_boxed_slice(),
    ))?;

    let outputs = session.run(ort::inputs!["pixel_values" => input])?;

    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("vision encoder produced no outputs"))?;
    let (_shape, embedding) = output.1.try_extract_tensor::<f32>()?;
    if embedding.is_empty() {
        return Err(anyhow!("vision encoder produced an empty embedding"));
    }

    Ok(embedding.to_vec())
}

fn run_text(session: &mut Session, ids: Vec<i64>) -> Result<Vec<f32>> {
    let input = Tensor::from_array(([1usize, CONTEXT_LENGTH], ids.into_boxed_slice()))?;

    let outputs = session.run(ort::inputs!["input_ids" => input])?;

    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("text encoder produced no outputs"))?;
    let (_shape, embedding) = output.1.try_extract_tensor::<f32>()?;
    if embedding.is_empty() {
        return Err(anyhow!("text encoder produced an empty embedding"));
    }

    Ok(embedding.to_vec())
}

/// Truncate or pad token ids to the fixed context length.
fn pad_to_context(mut ids: Vec<i64>, pad_id: i64) -> Vec<i64> {
    ids.truncate(CONTEXT_LENGTH);
    while ids.len() < CONTEXT_LENGTH {
        ids.push(pad_id);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_context_pads_short_input() {
        let ids = pad_to_context(vec![49406, 320, 49407], 0);
        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert_eq!(&ids[..3], &[49406, 320, 49407]);
        assert!(ids[3..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_pad_to_context_truncates_long_input() {
        let ids = pad_to_context(vec![7; CONTEXT_LENGTH + 20], 0);
        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert!(ids.iter().all(|&id| id == 7));
    }

    #[test]
    fn test_load_reports_missing_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxClip::load(dir.path(), 1).unwrap_err();
        assert!(err.to_string().contains("vision_model.onnx"));
    }
}
