//! Two-phase retrieval: a cheap raw-text pass, escalating to generative
//! query normalization only when the best fused score is not convincing.

use std::collections::HashSet;
use std::sync::Arc;

use lexfind_core::config::{RetrievalSettings, Settings};
use lexfind_core::traits::CorpusStore;
use lexfind_core::types::{Candidate, FusedResult, MatchMethod, Query, RetrievalResult, TemplateMatch};
use lexfind_core::{Error, Result};
use lexfind_embed::EmbeddingProvider;
use lexfind_normalize::{ProviderPolicy, QueryInterpretation, QueryNormalizer};

use crate::fusion::FusionPolicy;
use crate::search::{MethodCounts, MultiSignalSearch, SearchOutcome, SearchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    FastSearch,
    Accept,
    Escalate,
    SlowSearch,
    Merge,
    Done,
}

/// What a retrieval did, for logs and tests.
#[derive(Debug, Clone, Default)]
pub struct RetrievalTrace {
    pub phases: Vec<Phase>,
    pub embedded: bool,
    pub fast_path_top: Option<f32>,
    pub fast_counts: MethodCounts,
    pub slow_counts: Option<MethodCounts>,
    pub interpretation: Option<QueryInterpretation>,
    pub fast_candidates: usize,
    pub merged_candidates: usize,
}

impl RetrievalTrace {
    pub fn escalated(&self) -> bool { self.phases.contains(&Phase::Escalate) }
}

pub struct TemplateFinder {
    search: MultiSignalSearch,
    fusion: FusionPolicy,
    embedder: Arc<EmbeddingProvider>,
    normalizer: Arc<QueryNormalizer>,
    policy: Arc<ProviderPolicy>,
    retrieval: RetrievalSettings,
    default_language: String,
}

impl TemplateFinder {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<EmbeddingProvider>,
        normalizer: Arc<QueryNormalizer>,
        policy: Arc<ProviderPolicy>,
        settings: &Settings,
    ) -> Self {
        let n = &settings.normalizer;
        Self {
            search: MultiSignalSearch::new(store, settings.search.clone(), n.min_token_chars, n.max_keywords),
            fusion: FusionPolicy::from_settings(&settings.retrieval),
            embedder,
            normalizer,
            policy,
            retrieval: settings.retrieval.clone(),
            default_language: n.default_language.clone(),
        }
    }

    /// Load the embedding model and generative clients named in `settings`.
    pub fn from_settings(store: Arc<dyn CorpusStore>, settings: &Settings) -> Self {
        let embedder = Arc::new(EmbeddingProvider::from_settings(&settings.embedding));
        let normalizer = Arc::new(QueryNormalizer::from_settings(settings.normalizer.clone()));
        let policy = Arc::new(ProviderPolicy::new(settings.normalizer.providers.clone(), settings.normalizer.degraded_cooldown()));
        Self::new(store, embedder, normalizer, policy, settings)
    }

    pub fn policy(&self) -> &Arc<ProviderPolicy> { &self.policy }

    /// Best template for a free-text request, or `None` when nothing matched.
    /// Fails only when the store cannot hand out a connection.
    pub async fn find_best_template(&self, query: &str) -> Result<Option<TemplateMatch>> {
        let (result, trace) = self.retrieve(Query::new(query)).await?;
        tracing::info!(
            escalated = trace.escalated(),
            fast_top = ?trace.fast_path_top,
            candidates = trace.merged_candidates,
            matched = result.is_some(),
            "template lookup finished"
        );
        Ok(result.as_ref().map(TemplateMatch::from))
    }

    async fn embed(&self, query: &Query) -> Option<Vec<f32>> {
        if let Some(e) = &query.embedding { return Some(e.clone()); }
        if !self.embedder.is_available() { return None; }
        let provider = Arc::clone(&self.embedder);
        let text = query.raw_text.clone();
        match tokio::task::spawn_blocking(move || provider.embed(&text)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "embedding task failed");
                None
            }
        }
    }

    /// Fast-path search. Only `PoolUnavailable` propagates.
    async fn run_search(&self, req: SearchRequest<'_>) -> Result<SearchOutcome> {
        match self.search.search(req).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ Error::PoolUnavailable(_)) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "search degraded to no candidates");
                Ok(SearchOutcome::default())
            }
        }
    }

    /// Caller-supplied `keywords` replace the normalizer on escalation.
    pub async fn retrieve(&self, query: Query) -> Result<(Option<RetrievalResult>, RetrievalTrace)> {
        let mut trace = RetrievalTrace { phases: vec![Phase::Start], ..RetrievalTrace::default() };
        let embedding = self.embed(&query).await;
        trace.embedded = embedding.is_some();
        let language = query.language.clone().unwrap_or_else(|| self.default_language.clone());

        trace.phases.push(Phase::FastSearch);
        let fast = self
            .run_search(SearchRequest { raw_text: &query.raw_text, keywords: &[], embedding: embedding.as_deref(), language: &language })
            .await?;
        trace.fast_counts = fast.counts;
        trace.fast_candidates = fast.candidates.len();
        let mut candidates = fast.candidates;
        let mut fused = self.fusion.fuse(&candidates);
        trace.fast_path_top = fused.first().map(|f| f.final_score);

        if trace.fast_path_top.is_some_and(|top| top > self.retrieval.fast_path_threshold) {
            trace.phases.push(Phase::Accept);
            tracing::info!(top = ?trace.fast_path_top, "fast path accepted");
        } else {
            trace.phases.push(Phase::Escalate);
            tracing::info!(top = ?trace.fast_path_top, threshold = self.retrieval.fast_path_threshold, "escalating to normalization");
            let (keywords, slow_language) = if query.keywords.is_empty() {
                let interpretation = self.normalizer.normalize(&query.raw_text, &self.policy).await;
                let pair = (interpretation.keywords().to_vec(), query.language.clone().unwrap_or_else(|| interpretation.language().to_string()));
                trace.interpretation = Some(interpretation);
                pair
            } else {
                (query.keywords.clone(), language.clone())
            };

            trace.phases.push(Phase::SlowSearch);
            // The fast-path candidates are kept whatever happens here.
            let slow = match self
                .search
                .search(SearchRequest { raw_text: &query.raw_text, keywords: &keywords, embedding: embedding.as_deref(), language: &slow_language })
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error = %e, "slow path search failed; keeping fast-path candidates");
                    SearchOutcome::default()
                }
            };
            trace.slow_counts = Some(slow.counts);

            trace.phases.push(Phase::Merge);
            merge_new(&mut candidates, slow.candidates);
            fused = self.fusion.fuse(&candidates);
        }

        trace.merged_candidates = candidates.len();
        trace.phases.push(Phase::Done);
        Ok((self.select(fused), trace))
    }

    fn select(&self, fused: Vec<FusedResult>) -> Option<RetrievalResult> {
        let mut iter = fused.into_iter();
        let best = iter.next()?;
        let alternatives = iter.take(self.retrieval.max_alternatives).collect();
        Some(RetrievalResult { best, alternatives })
    }
}

/// Append slow-path candidates whose `(doc_id, method)` pair the fast path
/// has not already produced.
fn merge_new(existing: &mut Vec<Candidate>, incoming: Vec<Candidate>) {
    let mut seen: HashSet<(String, MatchMethod)> = existing.iter().map(|c| (c.template.doc_id.clone(), c.method)).collect();
    for c in incoming {
        if seen.insert((c.template.doc_id.clone(), c.method)) {
            existing.push(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexfind_core::types::TemplateRef;

    fn cand(id: &str, score: f32, method: MatchMethod) -> Candidate {
        Candidate {
            template: TemplateRef {
                doc_id: id.into(),
                title: id.into(),
                canonical_title: id.into(),
                tags: vec![],
                snippet: String::new(),
                storage_path: String::new(),
            },
            raw_score: score,
            method,
        }
    }

    #[test]
    fn merge_keeps_fast_path_pairs() {
        let mut fast = vec![cand("a", 0.3, MatchMethod::Text)];
        merge_new(&mut fast, vec![cand("a", 0.9, MatchMethod::Text), cand("a", 0.2, MatchMethod::Legacy), cand("b", 0.4, MatchMethod::Text)]);
        assert_eq!(fast.len(), 3);
        assert_eq!(fast[0].raw_score, 0.3);
        assert!(fast.iter().any(|c| c.doc_id() == "b"));
    }
}
