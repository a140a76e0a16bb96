//! Local tokenizer + ONNX session embedding strategy.
//!
//! Loads a tokenizer and an ONNX encoder from the model's artifact
//! directory, runs the session over padded batches, pools the last hidden
//! state with an attention-masked mean, and L2-normalizes the result.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Axis};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use crate::catalog::EmbeddingModelInfo;
use crate::error::{Result, SemIndexError};

use super::{l2_normalize, Embedder};

const DEFAULT_MODEL_FILENAME: &str = "model.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

struct OnnxState {
    session: Session,
    tokenizer: Tokenizer,
}

pub struct OnnxEmbedder {
    model_id: String,
    dimension: u32,
    inner: Mutex<OnnxState>,
}

impl OnnxEmbedder {
    /// Load tokenizer + session from the model's local artifact directory.
    /// Missing artifacts surface as `EmbeddingBackendUnavailable` at
    /// construction, never per-request.
    pub fn new(info: &EmbeddingModelInfo, models_dir: &Path) -> Result<Self> {
        let model_dir = info.local_path.clone().unwrap_or_else(|| {
            models_dir.join(crate::paths::sanitize_for_filename(&info.id))
        });
        let weights = model_dir.join(
            info.preferred_filename
                .as_deref()
                .unwrap_or(DEFAULT_MODEL_FILENAME),
        );
        let tokenizer_path = model_dir.join(TOKENIZER_FILENAME);

        if !weights.exists() || !tokenizer_path.exists() {
            return Err(SemIndexError::EmbeddingBackendUnavailable(format!(
                "model artifacts for '{}' not found under {}",
                info.id,
                model_dir.display()
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            SemIndexError::EmbeddingBackendUnavailable(format!(
                "tokenizer load for '{}': {e}",
                info.id
            ))
        })?;
        // Pad to the longest sequence in the batch, truncate at the model's
        // window. Padding direction stays whatever the tokenizer config says.
        let mut padding = tokenizer
            .get_padding()
            .cloned()
            .unwrap_or_else(PaddingParams::default);
        padding.strategy = tokenizers::PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));
        let truncation = TruncationParams {
            max_length: info.max_sequence_length as usize,
            ..Default::default()
        };
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| {
                SemIndexError::EmbeddingBackendUnavailable(format!(
                    "tokenizer truncation config for '{}': {e}",
                    info.id
                ))
            })?;

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&weights))
            .map_err(|e| {
                SemIndexError::EmbeddingBackendUnavailable(format!(
                    "ONNX session for '{}': {e}",
                    info.id
                ))
            })?;

        Ok(Self {
            model_id: info.id.clone(),
            dimension: info.dimension,
            inner: Mutex::new(OnnxState { session, tokenizer }),
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = self
            .inner
            .lock()
            .map_err(|_| SemIndexError::Other("embedder mutex poisoned".into()))?;

        let encodings = state
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| SemIndexError::Other(format!("tokenize batch: {e}")))?;

        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        let mut token_type_ids = Array2::<i64>::zeros((batch, seq_len));
        for (row, encoding) in encodings.iter().enumerate() {
            for (col, (&id, &mask)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask().iter())
                .enumerate()
            {
                input_ids[[row, col]] = id as i64;
                attention_mask[[row, col]] = mask as i64;
            }
            for (col, &tt) in encoding.get_type_ids().iter().enumerate() {
                token_type_ids[[row, col]] = tt as i64;
            }
        }

        let outputs = state
            .session
            .run(ort::inputs![
                "input_ids" => Tensor::from_array(input_ids)?,
                "attention_mask" => Tensor::from_array(attention_mask.clone())?,
                "token_type_ids" => Tensor::from_array(token_type_ids)?,
            ])
            .map_err(|e| SemIndexError::Other(format!("ONNX inference: {e}")))?;

        // [batch, seq, hidden] last hidden state
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| SemIndexError::Other(format!("extract hidden state: {e}")))?;
        let hidden = hidden
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| SemIndexError::Other(format!("unexpected output shape: {e}")))?;

        // Attention-masked mean pool over the sequence axis
        let mut vectors = Vec::with_capacity(batch);
        for row in 0..batch {
            let mask_row = attention_mask.index_axis(Axis(0), row);
            let token_count: i64 = mask_row.sum();
            let denom = token_count.max(1) as f32;

            let hidden_dim = hidden.shape()[2];
            let mut pooled = vec![0.0f32; hidden_dim];
            for (pos, &mask) in mask_row.iter().enumerate() {
                if mask == 0 {
                    continue;
                }
                for (d, value) in pooled.iter_mut().enumerate() {
                    *value += hidden[[row, pos, d]];
                }
            }
            for value in pooled.iter_mut() {
                *value /= denom;
            }
            l2_normalize(&mut pooled);

            if pooled.len() != self.dimension as usize {
                return Err(SemIndexError::EmbeddingDimensionMismatch {
                    expected: self.dimension as usize,
                    actual: pooled.len(),
                });
            }
            vectors.push(pooled);
        }
        Ok(vectors)
    }
}

impl From<ort::Error> for SemIndexError {
    fn from(e: ort::Error) -> Self {
        SemIndexError::Other(format!("onnx runtime: {e}"))
    }
}
