//! Runs the four retrieval methods against one store session.

use std::sync::Arc;

use lexfind_core::config::SearchSettings;
use lexfind_core::traits::{CorpusSession, CorpusStore};
use lexfind_core::types::{Candidate, CorpusHit, MatchMethod, TextQuery};
use lexfind_core::Result;
use lexfind_normalize::extract_keywords;

/// One search request. Empty `keywords` means raw-text-only (fast path).
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub raw_text: &'a str,
    pub keywords: &'a [String],
    pub embedding: Option<&'a [f32]>,
    pub language: &'a str,
}

/// Per-method hit counts. `None` means the method was not executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodCounts {
    pub vector: Option<usize>,
    pub text: Option<usize>,
    pub fuzzy: Option<usize>,
    pub legacy: Option<usize>,
}

impl MethodCounts {
    fn primary_hits(&self) -> usize { self.vector.unwrap_or(0) + self.text.unwrap_or(0) + self.fuzzy.unwrap_or(0) }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    pub counts: MethodCounts,
}

pub struct MultiSignalSearch {
    store: Arc<dyn CorpusStore>,
    settings: SearchSettings,
    min_token_chars: usize,
    max_keywords: usize,
}

/// A failed method contributes nothing; the others still run.
fn settle(method: MatchMethod, result: Result<Vec<CorpusHit>>, out: &mut Vec<Candidate>) -> usize {
    match result {
        Ok(hits) => {
            let n = hits.len();
            tracing::debug!(%method, hits = n, "method finished");
            out.extend(hits.into_iter().map(|h| Candidate::from_hit(h, method)));
            n
        }
        Err(e) => {
            tracing::warn!(%method, error = %e, "search method failed; continuing without it");
            0
        }
    }
}

impl MultiSignalSearch {
    pub fn new(store: Arc<dyn CorpusStore>, settings: SearchSettings, min_token_chars: usize, max_keywords: usize) -> Self {
        Self { store, settings, min_token_chars, max_keywords }
    }

    pub fn store(&self) -> &Arc<dyn CorpusStore> { &self.store }

    /// Opening the session is the only step allowed to fail the search.
    pub async fn search(&self, req: SearchRequest<'_>) -> Result<SearchOutcome> {
        let session = self.store.open_session().await?;
        Ok(self.run_methods(session, req).await)
    }

    async fn run_methods(&self, mut session: Box<dyn CorpusSession>, req: SearchRequest<'_>) -> SearchOutcome {
        let s = &self.settings;
        let mut candidates = Vec::new();
        let mut counts = MethodCounts::default();

        if let Some(embedding) = req.embedding {
            let result = session.vector_search(embedding, s.vector_floor, s.vector_limit).await;
            counts.vector = Some(settle(MatchMethod::Vector, result, &mut candidates));
        }

        let text_query = if req.keywords.is_empty() { TextQuery::Raw(req.raw_text) } else { TextQuery::AnyOf(req.keywords) };
        if !text_query.is_empty() {
            let result = session.text_search(text_query, req.language, s.text_rank_scale, s.text_limit).await;
            counts.text = Some(settle(MatchMethod::Text, result, &mut candidates));
        }

        let trimmed = req.raw_text.trim();
        if trimmed.chars().count() >= s.fuzzy_min_query_chars {
            let result = session.fuzzy_search(trimmed, s.fuzzy_floor, s.fuzzy_limit).await;
            counts.fuzzy = Some(settle(MatchMethod::Fuzzy, result, &mut candidates));
        }

        if counts.primary_hits() < s.legacy_min_hits {
            let derived;
            let terms: &[String] = if req.keywords.is_empty() {
                derived = extract_keywords(req.raw_text, self.min_token_chars, self.max_keywords);
                &derived
            } else {
                req.keywords
            };
            if !terms.is_empty() {
                let result = session.legacy_search(terms, req.language, s.legacy_score, s.legacy_limit).await;
                counts.legacy = Some(settle(MatchMethod::Legacy, result, &mut candidates));
            }
        }

        SearchOutcome { candidates, counts }
    }
}
