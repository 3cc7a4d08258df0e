use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CorpusHit, TextQuery};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// A backing store holding the template corpus.
///
/// `open_session` is the only call allowed to fail hard; everything a session
/// returns is per-method and may be degraded by the caller.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn open_session(&self) -> Result<Box<dyn CorpusSession>>;
}

/// One unit of work against the store. Postgres sessions hold a pooled
/// connection for their lifetime.
#[async_trait]
pub trait CorpusSession: Send {
    /// Cosine similarity above `floor`, best first.
    async fn vector_search(&mut self, embedding: &[f32], floor: f32, limit: usize) -> Result<Vec<CorpusHit>>;

    /// Full-text relevance over `search_text`, rescaled by `rank_scale` and capped at 1.0.
    async fn text_search(&mut self, query: TextQuery<'_>, language: &str, rank_scale: f32, limit: usize) -> Result<Vec<CorpusHit>>;

    /// Trigram similarity between `query` and `canonical_title` above `floor`.
    async fn fuzzy_search(&mut self, query: &str, floor: f32, limit: usize) -> Result<Vec<CorpusHit>>;

    /// Case-insensitive substring match of any term against title or snippet,
    /// each hit scored `score`.
    async fn legacy_search(&mut self, terms: &[String], language: &str, score: f32, limit: usize) -> Result<Vec<CorpusHit>>;
}
