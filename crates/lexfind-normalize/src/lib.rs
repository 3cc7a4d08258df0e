//! lexfind-normalize
//!
//! Turns a free-text drafting request into search keywords. One generative
//! call does the work when it can; anything else lands on a local tokenizer.

pub mod client;
pub mod error;
pub mod fallback;
pub mod policy;
pub mod retry;

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use lexfind_core::config::NormalizerSettings;

pub use client::{GeminiClient, GenerativeClient};
pub use error::NormalizeError;
pub use fallback::extract_keywords;
pub use policy::ProviderPolicy;
pub use retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub keywords: Vec<String>,
    pub language: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Every provider is cooling down or none is configured.
    NoProvider,
    /// The provider has no client registered.
    NoClient(String),
    Failed(NormalizeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackQuery {
    pub keywords: Vec<String>,
    pub language: String,
    pub reason: FallbackReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInterpretation {
    Normalized(NormalizedQuery),
    Fallback(FallbackQuery),
}

impl QueryInterpretation {
    pub fn keywords(&self) -> &[String] {
        match self {
            QueryInterpretation::Normalized(q) => &q.keywords,
            QueryInterpretation::Fallback(q) => &q.keywords,
        }
    }

    pub fn language(&self) -> &str {
        match self {
            QueryInterpretation::Normalized(q) => &q.language,
            QueryInterpretation::Fallback(q) => &q.language,
        }
    }

    pub fn is_fallback(&self) -> bool { matches!(self, QueryInterpretation::Fallback(_)) }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchHint {
    search_terms: Vec<String>,
    language: String,
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else { return trimmed };
    let inner = inner.strip_prefix("json").or_else(|| inner.strip_prefix("JSON")).unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse model output against `{search_terms: [string], language: string}`.
/// Terms are trimmed, lowercased and deduplicated; an empty result or a blank
/// language is malformed.
pub fn parse_search_hint(raw: &str) -> Result<(Vec<String>, String), NormalizeError> {
    let hint: SearchHint = serde_json::from_str(strip_code_fence(raw)).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
    let mut keywords: Vec<String> = Vec::with_capacity(hint.search_terms.len());
    for term in hint.search_terms {
        let term = term.trim().to_lowercase();
        if term.is_empty() { return Err(NormalizeError::Malformed("blank search term".to_string())); }
        if !keywords.contains(&term) { keywords.push(term); }
    }
    if keywords.is_empty() { return Err(NormalizeError::Malformed("no search terms".to_string())); }
    let language = hint.language.trim().to_lowercase();
    if language.is_empty() { return Err(NormalizeError::Malformed("blank language".to_string())); }
    Ok((keywords, language))
}

pub fn build_prompt(raw_query: &str) -> String {
    format!(
        "Turn this Indian legal drafting request into a structured search hint.\n\
         Reply with JSON only, no prose, exactly in this shape:\n\
         {{\"search_terms\": [\"important\", \"keywords\"], \"language\": \"en\"}}\n\n\
         Request: {}\n",
        serde_json::to_string(raw_query).unwrap_or_default()
    )
}

pub struct QueryNormalizer {
    clients: HashMap<String, Arc<dyn GenerativeClient>>,
    settings: NormalizerSettings,
    retry: RetryPolicy,
}

impl QueryNormalizer {
    /// A normalizer with no clients; every call takes the fallback until one
    /// is registered.
    pub fn new(settings: NormalizerSettings) -> Self {
        let retry = RetryPolicy::from_settings(&settings.retry);
        Self { clients: HashMap::new(), settings, retry }
    }

    /// Register a `GeminiClient` for every configured provider.
    pub fn from_settings(settings: NormalizerSettings) -> Self {
        let mut normalizer = Self::new(settings);
        for provider in normalizer.settings.providers.clone() {
            match GeminiClient::from_settings(&provider, normalizer.settings.timeout()) {
                Ok(client) => {
                    normalizer.clients.insert(provider.name.clone(), Arc::new(client));
                }
                Err(e) => tracing::warn!(provider = %provider.name, error = %e, "could not build generative client"),
            }
        }
        normalizer
    }

    pub fn with_client(mut self, provider: impl Into<String>, client: Arc<dyn GenerativeClient>) -> Self {
        self.clients.insert(provider.into(), client);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fallback(&self, raw_query: &str, reason: FallbackReason) -> QueryInterpretation {
        QueryInterpretation::Fallback(FallbackQuery {
            keywords: extract_keywords(raw_query, self.settings.min_token_chars, self.settings.max_keywords),
            language: self.settings.default_language.clone(),
            reason,
        })
    }

    /// Never fails. Rate-limit and credential errors put the provider on
    /// cooldown in `policy`.
    pub async fn normalize(&self, raw_query: &str, policy: &ProviderPolicy) -> QueryInterpretation {
        let Some(provider) = policy.current_provider() else {
            tracing::info!("no generative provider available; using local keywords");
            return self.fallback(raw_query, FallbackReason::NoProvider);
        };
        let Some(client) = self.clients.get(&provider.name) else {
            tracing::warn!(provider = %provider.name, "no client registered for provider");
            return self.fallback(raw_query, FallbackReason::NoClient(provider.name));
        };

        let prompt = build_prompt(raw_query);
        let timeout = self.settings.timeout();
        let timeout_ms = self.settings.timeout_ms;
        let outcome = self
            .retry
            .run(|attempt| {
                let client = Arc::clone(client);
                let prompt = &prompt;
                async move {
                    tracing::debug!(attempt, "calling generative provider");
                    let text = tokio::time::timeout(timeout, client.generate(prompt))
                        .await
                        .map_err(|_| NormalizeError::Timeout(timeout_ms))??;
                    parse_search_hint(&text)
                }
            })
            .await;

        match outcome {
            Ok((keywords, language)) => {
                tracing::info!(provider = %provider.name, keywords = keywords.len(), "query normalized");
                QueryInterpretation::Normalized(NormalizedQuery { keywords, language, provider: provider.name })
            }
            Err(e) => {
                if e.degrades_provider() { policy.mark_degraded(&provider.name); }
                tracing::warn!(provider = %provider.name, error = %e, "normalization failed; using local keywords");
                self.fallback(raw_query, FallbackReason::Failed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"search_terms\": [\"Loan\", \" repayment \", \"loan\"], \"language\": \"EN\"}\n```";
        let (kw, lang) = parse_search_hint(raw).unwrap();
        assert_eq!(kw, vec!["loan", "repayment"]);
        assert_eq!(lang, "en");
    }

    #[test]
    fn schema_violations_are_malformed() {
        for raw in [
            "not json",
            "{\"search_terms\": [\"a\"]}",
            "{\"search_terms\": [], \"language\": \"en\"}",
            "{\"search_terms\": [\"  \"], \"language\": \"en\"}",
            "{\"search_terms\": [\"lease\"], \"language\": \" \"}",
            "{\"search_terms\": [\"lease\"], \"language\": \"en\", \"extra\": 1}",
            "{\"search_terms\": \"lease\", \"language\": \"en\"}",
        ] {
            assert!(matches!(parse_search_hint(raw), Err(NormalizeError::Malformed(_))), "{raw}");
        }
    }

    #[test]
    fn prompt_quotes_the_request() {
        let p = build_prompt("rent \"deed\"");
        assert!(p.contains("\"rent \\\"deed\\\"\""));
        assert!(p.contains("search_terms"));
    }
}
