//! Batch extraction orchestration.
//!
//! One call loads the model once, expands the image inputs, runs the two
//! sequential encode loops, and releases the model. Per-item failures are
//! logged, recorded in the result, and skipped; only empty input or a
//! failed model load aborts the batch.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;
use thiserror::Error;

use crate::clip::{self, ClipEngine, OnnxClip};
use crate::scanner;

/// Wall-clock totals for each processing stage, in seconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TimingStats {
    pub folder_scan_secs: f64,
    pub image_load_secs: f64,
    pub image_encode_secs: f64,
    pub text_encode_secs: f64,
    pub total_secs: f64,
}

/// Stage at which an input was dropped from the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    ImageLoad,
    Preprocess,
    ImageEncode,
    Tokenize,
    TextEncode,
}

/// An input that failed and was left out of the result sequences.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub input: String,
    pub stage: SkipStage,
    pub reason: String,
}

/// Outcome of one extraction call.
///
/// The embedding and source sequences are parallel: entry `i` of
/// `image_embeddings` came from entry `i` of `image_paths_processed`, and
/// likewise for texts. Failed items appear only in `skipped`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EncodingResult {
    pub success: bool,
    pub error_message: String,
    pub processed_images: usize,
    pub processed_texts: usize,
    pub timing: TimingStats,
    pub image_embeddings: Vec<Vec<f32>>,
    pub text_embeddings: Vec<Vec<f32>>,
    pub image_paths_processed: Vec<String>,
    pub texts_processed: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

impl EncodingResult {
    fn failed(error: FatalError) -> Self {
        Self {
            error_message: error.to_string(),
            ..Self::default()
        }
    }

    fn skip(&mut self, input: &str, stage: SkipStage, reason: &anyhow::Error) {
        self.skipped.push(SkippedItem {
            input: input.to_string(),
            stage,
            reason: reason.to_string(),
        });
    }
}

/// Conditions that abort the batch before any encoding.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("must provide at least one image path or text string")]
    NoInputs,

    #[error("model path cannot be empty")]
    EmptyModelPath,

    #[error("unable to load model from {path}: {cause}")]
    ModelLoad {
        path: String,
        cause: anyhow::Error,
    },
}

/// Knobs for one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Intra-op thread hint for the encoders; values below 1 are coerced to 1.
    pub n_threads: i32,

    /// Log each processed item at info level instead of debug.
    pub verbose: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            n_threads: 4,
            verbose: false,
        }
    }
}

/// Status updates emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ExtractProgress {
    Started {
        total_inputs: usize,
    },
    Processing {
        current: usize,
        total: usize,
        input: String,
    },
    Completed {
        processed_images: usize,
        processed_texts: usize,
    },
}

/// Extract CLIP embeddings for a batch of images and texts.
///
/// `model_path` must name a directory holding the encoder graphs and
/// tokenizer (see [`OnnxClip::load`]). Image paths may be files or
/// directories; directories contribute their image entries. Progress
/// events are observational and a disconnected receiver is ignored.
pub fn extract(
    model_path: &str,
    image_paths: &[String],
    texts: &[String],
    options: &ExtractOptions,
    progress: Option<mpsc::Sender<ExtractProgress>>,
) -> EncodingResult {
    let total_start = Instant::now();

    if image_paths.is_empty() && texts.is_empty() {
        return EncodingResult::failed(FatalError::NoInputs);
    }
    if model_path.is_empty() {
        return EncodingResult::failed(FatalError::EmptyModelPath);
    }

    let n_threads = options.n_threads.max(1) as usize;

    let engine = match OnnxClip::load(Path::new(model_path), n_threads) {
        Ok(engine) => engine,
        Err(cause) => {
            return EncodingResult::failed(FatalError::ModelLoad {
                path: model_path.to_string(),
                cause,
            });
        }
    };

    run_batch(engine, image_paths, texts, options, progress, total_start)
}

/// Run the batch loops against an already-loaded engine.
///
/// Separated from [`extract`] so tests can drive the orchestration with a
/// scripted engine. The engine is dropped, releasing its model, before
/// this returns.
pub fn run_batch<E: ClipEngine>(
    mut engine: E,
    image_paths: &[String],
    texts: &[String],
    options: &ExtractOptions,
    progress: Option<mpsc::Sender<ExtractProgress>>,
    total_start: Instant,
) -> EncodingResult {
    let mut result = EncodingResult::default();

    let scan_start = Instant::now();
    let image_files: Vec<PathBuf> = image_paths
        .iter()
        .flat_map(|p| scanner::expand_path(Path::new(p)))
        .collect();
    result.timing.folder_scan_secs = scan_start.elapsed().as_secs_f64();

    let total_inputs = image_files.len() + texts.len();
    let mut current = 0usize;

    if let Some(ref tx) = progress {
        let _ = tx.send(ExtractProgress::Started { total_inputs });
    }

    for path in &image_files {
        let path_str = path.display().to_string();

        let load_start = Instant::now();
        let image = match clip::load_image(path) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "failed to load image, skipping");
                result.skip(&path_str, SkipStage::ImageLoad, &e);
                continue;
            }
        };

        let tensor = match engine.preprocess(&image) {
            Ok(tensor) => tensor,
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "failed to preprocess image, skipping");
                result.skip(&path_str, SkipStage::Preprocess, &e);
                continue;
            }
        };
        result.timing.image_load_secs += load_start.elapsed().as_secs_f64();

        let encode_start = Instant::now();
        let embedding = match engine.encode_image(&tensor) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "failed to encode image, skipping");
                result.skip(&path_str, SkipStage::ImageEncode, &e);
                continue;
            }
        };
        result.timing.image_encode_secs += encode_start.elapsed().as_secs_f64();

        if options.verbose {
            tracing::info!(path = %path_str, dim = embedding.len(), "image encoded");
        } else {
            tracing::debug!(path = %path_str, dim = embedding.len(), "image encoded");
        }

        result.image_embeddings.push(embedding);
        result.image_paths_processed.push(path_str.clone());
        result.processed_images += 1;

        current += 1;
        if let Some(ref tx) = progress {
            let _ = tx.send(ExtractProgress::Processing {
                current,
                total: total_inputs,
                input: path_str,
            });
        }
    }

    for text in texts {
        let encode_start = Instant::now();

        let tokens = match engine.tokenize(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(text = %snippet(text), error = %e, "failed to tokenize text, skipping");
                result.skip(text, SkipStage::Tokenize, &e);
                continue;
            }
        };

        let embedding = match engine.encode_text(&tokens) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(text = %snippet(text), error = %e, "failed to encode text, skipping");
                result.skip(text, SkipStage::TextEncode, &e);
                continue;
            }
        };
        result.timing.text_encode_secs += encode_start.elapsed().as_secs_f64();

        if options.verbose {
            tracing::info!(text = %snippet(text), dim = embedding.len(), "text encoded");
        } else {
            tracing::debug!(text = %snippet(text), dim = embedding.len(), "text encoded");
        }

        result.text_embeddings.push(embedding);
        result.texts_processed.push(text.clone());
        result.processed_texts += 1;

        current += 1;
        if let Some(ref tx) = progress {
            let _ = tx.send(ExtractProgress::Processing {
                current,
                total: total_inputs,
                input: text.clone(),
            });
        }
    }

    // Release the model before stamping total wall time.
    drop(engine);

    result.timing.total_secs = total_start.elapsed().as_secs_f64();
    result.success = true;

    if let Some(ref tx) = progress {
        let _ = tx.send(ExtractProgress::Completed {
            processed_images: result.processed_images,
            processed_texts: result.processed_texts,
        });
    }

    log_timing_summary(&result.timing, image_files.len(), texts.len());

    result
}

/// First characters of a text input, for log lines.
fn snippet(text: &str) -> String {
    text.chars().take(48).collect()
}

fn log_timing_summary(timing: &TimingStats, image_count: usize, text_count: usize) {
    if image_count > 0 {
        tracing::info!(
            avg_load_secs = timing.image_load_secs / image_count as f64,
            avg_encode_secs = timing.image_encode_secs / image_count as f64,
            "image stage timing"
        );
    }
    if text_count > 0 {
        tracing::info!(
            avg_encode_secs = timing.text_encode_secs / text_count as f64,
            "text stage timing"
        );
    }
    tracing::info!(
        folder_scan_secs = timing.folder_scan_secs,
        total_secs = timing.total_secs,
        "batch finished"
    );
}
