//! In-process corpus backend loaded from a JSON or JSON-lines export.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use lexfind_core::traits::{CorpusSession, CorpusStore};
use lexfind_core::types::{CorpusHit, Document, TextQuery};
use lexfind_core::{Error, Result};
use lexfind_text::{trigram_similarity, TextIndex};

use crate::vector::cosine_similarity;

struct SnapshotData {
    docs: Vec<Document>,
    canonical_titles: Vec<String>,
    positions: HashMap<String, usize>,
    text_index: TextIndex,
}

#[derive(Clone)]
pub struct SnapshotCorpus {
    data: Arc<SnapshotData>,
}

impl SnapshotCorpus {
    /// Validates unique `doc_id`s and a single embedding width across rows
    /// that carry one, then builds the text index.
    pub fn new(docs: Vec<Document>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut width: Option<usize> = None;
        for doc in &docs {
            if doc.doc_id.trim().is_empty() {
                return Err(Error::InvalidCorpus("document with empty doc_id".to_string()));
            }
            if !seen.insert(doc.doc_id.as_str()) {
                return Err(Error::InvalidCorpus(format!("duplicate doc_id {}", doc.doc_id)));
            }
            if doc.embedding.is_empty() { continue; }
            match width {
                None => width = Some(doc.embedding.len()),
                Some(w) if w != doc.embedding.len() => {
                    return Err(Error::InvalidCorpus(format!("embedding width {} for {} differs from {}", doc.embedding.len(), doc.doc_id, w)));
                }
                Some(_) => {}
            }
        }
        let search_texts: Vec<String> = docs.iter().map(Document::effective_search_text).collect();
        let text_index = TextIndex::build(docs.iter().zip(&search_texts).map(|(d, t)| (d.doc_id.as_str(), t.as_str())))
            .map_err(|e| Error::InvalidCorpus(format!("text index: {e}")))?;
        let canonical_titles = docs.iter().map(Document::effective_canonical_title).collect();
        let positions = docs.iter().enumerate().map(|(i, d)| (d.doc_id.clone(), i)).collect();
        tracing::info!(documents = docs.len(), embedding_dim = ?width, "snapshot corpus loaded");
        Ok(Self { data: Arc::new(SnapshotData { docs, canonical_titles, positions, text_index }) })
    }

    /// `.jsonl` files hold one document per line; anything else is a JSON array.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidCorpus(format!("{}: {e}", path.display())))?;
        let is_lines = path.extension().is_some_and(|ext| ext == "jsonl") || !raw.trim_start().starts_with('[');
        let docs: Vec<Document> = if is_lines {
            raw.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| serde_json::from_str(line).map_err(|e| Error::InvalidCorpus(format!("{} line {}: {e}", path.display(), n + 1))))
                .collect::<Result<_>>()?
        } else {
            serde_json::from_str(&raw).map_err(|e| Error::InvalidCorpus(format!("{}: {e}", path.display())))?
        };
        Self::new(docs)
    }

    pub fn len(&self) -> usize { self.data.docs.len() }

    pub fn is_empty(&self) -> bool { self.data.docs.is_empty() }
}

#[async_trait]
impl CorpusStore for SnapshotCorpus {
    fn backend(&self) -> &'static str { "snapshot" }

    async fn open_session(&self) -> Result<Box<dyn CorpusSession>> {
        Ok(Box::new(SnapshotSession { data: Arc::clone(&self.data) }))
    }
}

struct SnapshotSession {
    data: Arc<SnapshotData>,
}

fn rank(mut hits: Vec<CorpusHit>, limit: usize) -> Vec<CorpusHit> {
    hits.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(Ordering::Equal).then_with(|| a.template.doc_id.cmp(&b.template.doc_id)));
    hits.truncate(limit);
    hits
}

impl SnapshotSession {
    fn hit(&self, idx: usize, raw_score: f32) -> CorpusHit { CorpusHit { template: self.data.docs[idx].to_ref(), raw_score } }
}

#[async_trait]
impl CorpusSession for SnapshotSession {
    async fn vector_search(&mut self, embedding: &[f32], floor: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let hits = self.data.docs.iter().enumerate()
            .filter(|(_, d)| d.embedding.len() == embedding.len())
            .map(|(i, d)| (i, cosine_similarity(embedding, &d.embedding)))
            .filter(|(_, sim)| *sim > floor)
            .map(|(i, sim)| self.hit(i, sim))
            .collect();
        Ok(rank(hits, limit))
    }

    async fn text_search(&mut self, query: TextQuery<'_>, language: &str, rank_scale: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        if query.is_empty() { return Ok(Vec::new()); }
        let raw = self.data.text_index.search(&query.to_plain(), language, limit).map_err(Error::transient)?;
        let hits = raw.into_iter()
            .filter_map(|(id, bm25)| self.data.positions.get(&id).map(|&i| (i, bm25)))
            .map(|(i, bm25)| {
                let squashed = bm25.max(0.0) / (bm25.max(0.0) + 1.0);
                self.hit(i, (squashed * rank_scale).min(1.0))
            })
            .collect();
        Ok(rank(hits, limit))
    }

    async fn fuzzy_search(&mut self, query: &str, floor: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let hits = self.data.canonical_titles.iter().enumerate()
            .map(|(i, title)| (i, trigram_similarity(title, query)))
            .filter(|(_, sim)| *sim > floor)
            .map(|(i, sim)| self.hit(i, sim))
            .collect();
        Ok(rank(hits, limit))
    }

    async fn legacy_search(&mut self, terms: &[String], language: &str, score: f32, limit: usize) -> Result<Vec<CorpusHit>> {
        let needles: Vec<String> = terms.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
        if needles.is_empty() { return Ok(Vec::new()); }
        let hits = self.data.docs.iter().enumerate()
            .filter(|(_, d)| d.language == language)
            .filter(|(i, d)| {
                let title = self.data.canonical_titles[*i].to_lowercase();
                let snippet = d.snippet.to_lowercase();
                needles.iter().any(|n| title.contains(n.as_str()) || snippet.contains(n.as_str()))
            })
            .map(|(i, _)| self.hit(i, score))
            .collect();
        Ok(rank(hits, limit))
    }
}
