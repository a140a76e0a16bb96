//! Library-driven embedding strategy backed by the fastembed crate.
//!
//! fastembed owns tokenization, inference, and normalization; this wrapper
//! only maps catalog ids onto its model enum and serializes access (the
//! engine promises at most one concurrent `embed` per instance, the mutex
//! makes that a hard guarantee).

use std::path::Path;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::catalog::EmbeddingModelInfo;
use crate::error::{Result, SemIndexError};

use super::{l2_normalize, Embedder};

pub struct FastEmbedder {
    model_id: String,
    dimension: u32,
    inner: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    /// Initialize the runtime for a catalog entry. Model artifacts download
    /// into `models_dir` on first use (fastembed's own cache layout).
    pub fn new(info: &EmbeddingModelInfo, models_dir: &Path) -> Result<Self> {
        let model = model_for_id(&info.id).ok_or_else(|| {
            SemIndexError::EmbeddingBackendUnavailable(format!(
                "no fastembed model mapped for catalog id '{}'",
                info.id
            ))
        })?;

        let options = InitOptions::new(model)
            .with_cache_dir(models_dir.to_path_buf())
            .with_show_download_progress(false);
        let inner = TextEmbedding::try_new(options).map_err(|e| {
            SemIndexError::EmbeddingBackendUnavailable(format!(
                "fastembed init for '{}': {e}",
                info.id
            ))
        })?;

        Ok(Self {
            model_id: info.id.clone(),
            dimension: info.dimension,
            inner: Mutex::new(inner),
        })
    }
}

/// Catalog id to fastembed model mapping. Models not listed here need the
/// ONNX backend instead.
fn model_for_id(id: &str) -> Option<EmbeddingModel> {
    match id {
        "minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "minilm-l12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Some(EmbeddingModel::BGELargeENV15),
        _ => None,
    }
}

impl Embedder for FastEmbedder {
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
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| SemIndexError::Other("embedder mutex poisoned".into()))?;
        let mut vectors = guard
            .embed(texts.to_vec(), None)
            .map_err(|e| SemIndexError::Other(format!("fastembed inference: {e}")))?;
        drop(guard);

        for vec in &mut vectors {
            if vec.len() != self.dimension as usize {
                return Err(SemIndexError::EmbeddingDimensionMismatch {
                    expected: self.dimension as usize,
                    actual: vec.len(),
                });
            }
            // fastembed returns normalized passage vectors; renormalizing is
            // a cheap no-op that keeps the trait contract independent of the
            // library version.
            l2_normalize(vec);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_mapping_known_ids() {
        assert!(model_for_id("minilm-l6-v2").is_some());
        assert!(model_for_id("bge-small-en-v1.5").is_some());
        assert!(model_for_id("made-up-model").is_none());
    }

    #[test]
    fn test_unknown_id_is_backend_unavailable() {
        let info = EmbeddingModelInfo {
            id: "made-up-model".to_string(),
            dimension: 384,
            ..Default::default()
        };
        let temp = tempfile::tempdir().unwrap();
        let err = FastEmbedder::new(&info, temp.path()).unwrap_err();
        assert!(matches!(
            err,
            SemIndexError::EmbeddingBackendUnavailable(_)
        ));
    }
}
