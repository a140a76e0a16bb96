//! Deterministic mock embedder for tests and offline mode.
//!
//! Vectors are pseudo-random but fully determined by the input text: the
//! SHA-256 of the text seeds an RNG that fills the vector, which is then
//! L2-normalized. Equal texts always embed identically, across processes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::{l2_normalize, Embedder};

pub struct MockEmbedder {
    model_id: String,
    dimension: u32,
}

impl MockEmbedder {
    pub fn new(model_id: &str, dimension: u32) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimension,
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = Sha256::new();
        hasher.update(self.model_id.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let seed = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));

        let mut rng = StdRng::seed_from_u64(seed);
        let mut vec: Vec<f32> = (0..self.dimension)
            .map(|_| rng.gen_range(-1.0f32..1.0f32))
            .collect();
        l2_normalize(&mut vec);
        vec
    }
}

impl Embedder for MockEmbedder {
    fn id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
