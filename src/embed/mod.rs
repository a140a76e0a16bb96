//! Embedding interface and batch plumbing.
//!
//! The engine only ever sees [`Embedder`]: an opaque batch-callable with a
//! known dimension. Concrete runtimes (fastembed, ONNX, the deterministic
//! mock) live in submodules and are selected by the factory from the model's
//! catalog entry. Contract: returned vectors are L2-normalized, `embed`
//! fails atomically, and at most one concurrent `embed` call per instance is
//! required to work (implementations serialize internally).

pub mod fastembed;
pub mod mock;
pub mod onnx;

use std::path::Path;
use std::sync::Arc;

use crate::catalog::{EmbeddingBackend, EmbeddingModelInfo};
use crate::chunker::CodeChunk;
use crate::error::Result;

/// Opaque embedding runtime.
pub trait Embedder: Send + Sync {
    /// Catalog id of the model backing this embedder.
    fn id(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> u32;

    /// Embed a batch of texts. Returns one vector per input, in order;
    /// fails atomically (no partial batch).
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Release runtime resources. Idempotent; default is a no-op.
    fn close(&self) {}
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: CodeChunk,
    pub embedding: Vec<f32>,
}

/// Embed chunks in bounded batches. The per-batch granularity is what makes
/// cancellation responsive during heavy inference.
pub fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<CodeChunk>,
    batch_size: usize,
) -> Result<Vec<EmbeddedChunk>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);
    let mut out = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts)?;
        for (chunk, embedding) in batch.iter().cloned().zip(vectors) {
            out.push(EmbeddedChunk { chunk, embedding });
        }
    }
    Ok(out)
}

/// Normalize a vector to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Factory signature injected at startup: catalog entry in, runtime out.
pub type EmbedderFactory =
    Arc<dyn Fn(&EmbeddingModelInfo) -> Result<Arc<dyn Embedder>> + Send + Sync>;

/// Default factory dispatching on the model's backend.
///
/// `SEMINDEX_OFFLINE=1` swaps in the deterministic mock for every model so
/// the full pipeline runs without model downloads.
pub fn default_factory(models_dir: &Path) -> EmbedderFactory {
    let models_dir = models_dir.to_path_buf();
    Arc::new(move |info: &EmbeddingModelInfo| {
        if std::env::var("SEMINDEX_OFFLINE").map(|v| v == "1").unwrap_or(false) {
            return Ok(Arc::new(mock::MockEmbedder::new(&info.id, info.dimension))
                as Arc<dyn Embedder>);
        }
        match info.backend {
            EmbeddingBackend::LibraryFastembed => Ok(Arc::new(
                fastembed::FastEmbedder::new(info, &models_dir)?,
            )),
            EmbeddingBackend::LocalTokenizerOnnx => {
                Ok(Arc::new(onnx::OnnxEmbedder::new(info, &models_dir)?))
            }
        }
    })
}

/// Factory that always yields the mock; used throughout the test suite.
pub fn mock_factory() -> EmbedderFactory {
    Arc::new(|info: &EmbeddingModelInfo| {
        Ok(Arc::new(mock::MockEmbedder::new(&info.id, info.dimension)) as Arc<dyn Embedder>)
    })
}
