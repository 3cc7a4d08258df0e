//! Process-wide embedding handle with degrade-to-nothing semantics.
//!
//! Load it once at start-up and share it behind an `Arc`. Every failure mode
//! (model missing, inference error, wrong width) yields `None` so callers can
//! run without the vector signal.

use lexfind_core::config::EmbeddingSettings;
use lexfind_core::traits::Embedder;

use crate::get_default_embedder;

pub struct EmbeddingProvider {
    inner: Option<Box<dyn Embedder>>,
    dim: usize,
}

impl EmbeddingProvider {
    /// Wrap a loaded embedder. An embedder whose width differs from the corpus
    /// dimension is kept out, since its vectors cannot be compared.
    pub fn new(embedder: Box<dyn Embedder>, dim: usize) -> Self {
        if embedder.dim() != dim {
            tracing::warn!(model_dim = embedder.dim(), corpus_dim = dim, "embedding width mismatch; vector search disabled");
            return Self::unavailable(dim);
        }
        Self { inner: Some(embedder), dim }
    }

    pub fn unavailable(dim: usize) -> Self { Self { inner: None, dim } }

    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        match get_default_embedder(settings) {
            Ok(embedder) => Self::new(embedder, settings.dimension),
            Err(e) => {
                tracing::warn!(error = %e, "embedding model unavailable; vector search disabled");
                Self::unavailable(settings.dimension)
            }
        }
    }

    pub fn is_available(&self) -> bool { self.inner.is_some() }

    pub fn dim(&self) -> usize { self.dim }

    pub fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.inner.as_ref()?;
        match embedder.embed_batch(&[text.to_string()]) {
            Ok(mut vectors) if vectors.len() == 1 && vectors[0].len() == self.dim => vectors.pop(),
            Ok(vectors) => {
                tracing::warn!(got = ?vectors.iter().map(Vec::len).collect::<Vec<_>>(), expected = self.dim, "embedding has unexpected shape");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed");
                None
            }
        }
    }
}
