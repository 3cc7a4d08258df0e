//! Domain types shared by the store backends, the search layer and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type DocId = String;

fn default_language() -> String { "en".to_string() }

/// A template row as maintained by the ingestion pipeline.
///
/// - `doc_id`: stable, unique, never rewritten
/// - `canonical_title`: lowercased/trimmed title used for fuzzy comparison
/// - `embedding`: same dimensionality across the whole corpus
/// - `search_text`: full-text representation; derived when left empty
/// - `language`: ISO code used by the legacy substring filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub doc_id: DocId,
    pub title: String,
    #[serde(default)]
    pub canonical_title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    pub storage_path: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub search_text: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>, storage_path: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            doc_id: doc_id.into(),
            canonical_title: canonicalize_title(&title),
            title,
            tags: Vec::new(),
            snippet: snippet.into(),
            storage_path: storage_path.into(),
            embedding: Vec::new(),
            search_text: String::new(),
            language: default_language(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self { self.embedding = embedding; self }

    pub fn with_language(mut self, language: impl Into<String>) -> Self { self.language = language.into(); self }

    /// Canonical title, falling back to the normalized display title for rows
    /// exported without one.
    pub fn effective_canonical_title(&self) -> String {
        if self.canonical_title.trim().is_empty() { canonicalize_title(&self.title) } else { self.canonical_title.clone() }
    }

    /// Full-text representation. Mirrors the store's generated column:
    /// canonical title, snippet and tags joined by spaces.
    pub fn effective_search_text(&self) -> String {
        if !self.search_text.trim().is_empty() { return self.search_text.clone(); }
        let mut parts = vec![self.effective_canonical_title(), self.snippet.clone()];
        parts.extend(self.tags.iter().cloned());
        parts.retain(|p| !p.trim().is_empty());
        parts.join(" ")
    }

    pub fn to_ref(&self) -> TemplateRef {
        TemplateRef {
            doc_id: self.doc_id.clone(),
            title: self.title.clone(),
            canonical_title: self.effective_canonical_title(),
            tags: self.tags.clone(),
            snippet: self.snippet.clone(),
            storage_path: self.storage_path.clone(),
        }
    }
}

pub fn canonicalize_title(title: &str) -> String { title.trim().to_lowercase() }

/// The display metadata a candidate carries through fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateRef {
    pub doc_id: DocId,
    pub title: String,
    pub canonical_title: String,
    pub tags: Vec<String>,
    pub snippet: String,
    pub storage_path: String,
}

/// Which retrieval strategy produced a candidate.
///
/// The declaration order is the order in which fusion folds methods.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Vector,
    Fuzzy,
    Text,
    Legacy,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 4] = [MatchMethod::Vector, MatchMethod::Fuzzy, MatchMethod::Text, MatchMethod::Legacy];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::Vector => "vector",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::Text => "text",
            MatchMethod::Legacy => "legacy",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Input to the full-text method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextQuery<'a> {
    /// The user's raw text, parsed with web-search syntax.
    Raw(&'a str),
    /// Normalized keywords; a document matching any of them qualifies.
    AnyOf(&'a [String]),
}

impl TextQuery<'_> {
    /// Space-joined terms for backends whose parser already ORs clauses.
    pub fn to_plain(&self) -> String {
        match self {
            TextQuery::Raw(text) => text.to_string(),
            TextQuery::AnyOf(terms) => terms.join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TextQuery::Raw(text) => text.trim().is_empty(),
            TextQuery::AnyOf(terms) => terms.iter().all(|t| t.trim().is_empty()),
        }
    }
}

/// One row returned by a store method, before it is labelled with its method.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusHit {
    pub template: TemplateRef,
    pub raw_score: f32,
}

/// A per-method match. `raw_score` is unweighted; fusion applies the weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub template: TemplateRef,
    pub raw_score: f32,
    pub method: MatchMethod,
}

impl Candidate {
    pub fn from_hit(hit: CorpusHit, method: MatchMethod) -> Self {
        Self { template: hit.template, raw_score: hit.raw_score, method }
    }

    pub fn doc_id(&self) -> &str { &self.template.doc_id }
}

/// A document after all of its candidates were combined.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FusedResult {
    pub doc_id: DocId,
    pub final_score: f32,
    pub contributing_methods: BTreeSet<MatchMethod>,
    pub title: String,
    pub snippet: String,
    pub storage_path: String,
}

/// Transient request state. `embedding` and `keywords` are filled in by the
/// orchestrator as phases run.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub raw_text: String,
    pub language: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub keywords: Vec<String>,
}

impl Query {
    pub fn new(raw_text: impl Into<String>) -> Self { Self { raw_text: raw_text.into(), ..Self::default() } }

    pub fn with_language(mut self, language: impl Into<String>) -> Self { self.language = Some(language.into()); self }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievalResult {
    pub best: FusedResult,
    pub alternatives: Vec<FusedResult>,
}

/// The response shape handed to the drafting tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateMatch {
    pub title: String,
    pub doc_id: DocId,
    pub score: f32,
    pub storage_path: String,
    pub alternatives: Vec<AlternativeMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeMatch {
    pub title: String,
    pub score: f32,
    pub storage_path: String,
}

fn round3(score: f32) -> f32 { (score * 1000.0).round() / 1000.0 }

impl From<&RetrievalResult> for TemplateMatch {
    fn from(result: &RetrievalResult) -> Self {
        Self {
            title: result.best.title.clone(),
            doc_id: result.best.doc_id.clone(),
            score: round3(result.best.final_score),
            storage_path: result.best.storage_path.clone(),
            alternatives: result
                .alternatives
                .iter()
                .map(|alt| AlternativeMatch { title: alt.title.clone(), score: round3(alt.final_score), storage_path: alt.storage_path.clone() })
                .collect(),
        }
    }
}
