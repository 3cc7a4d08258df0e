use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lexfind_core::config::{NormalizerSettings, ProviderSettings};
use lexfind_normalize::{
    FallbackReason, GeminiClient, GenerativeClient, NormalizeError, ProviderPolicy, QueryInterpretation, QueryNormalizer, RetryPolicy,
};

struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, NormalizeError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedClient {
    fn new(script: Vec<Result<String, NormalizeError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0), delay: Duration::ZERO })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(VecDeque::new()), calls: AtomicUsize::new(0), delay })
    }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate(&self, _prompt: &str) -> Result<String, NormalizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() { tokio::time::sleep(self.delay).await; }
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| Err(NormalizeError::Transport("script exhausted".into())))
    }
}

fn ok(json: &str) -> Result<String, NormalizeError> { Ok(json.to_string()) }

fn settings() -> NormalizerSettings { NormalizerSettings::default() }

fn policy(s: &NormalizerSettings) -> ProviderPolicy { ProviderPolicy::new(s.providers.clone(), s.degraded_cooldown()) }

fn normalizer_with(client: Arc<ScriptedClient>) -> QueryNormalizer {
    QueryNormalizer::new(settings()).with_client("gemini", client)
}

#[tokio::test]
async fn conforming_response_is_normalized() {
    let client = ScriptedClient::new(vec![ok(r#"{"search_terms": ["loan", "acknowledgement"], "language": "en"}"#)]);
    let n = normalizer_with(client.clone());
    let out = n.normalize("acknowledgement for loan repayment", &policy(&settings())).await;
    match out {
        QueryInterpretation::Normalized(q) => {
            assert_eq!(q.keywords, vec!["loan", "acknowledgement"]);
            assert_eq!(q.language, "en");
            assert_eq!(q.provider, "gemini");
        }
        other => panic!("expected normalized, got {other:?}"),
    }
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn malformed_or_failed_calls_fall_back_to_local_keywords() {
    for script in [
        ok("Sure! Here are your keywords: loan, repayment"),
        ok(r#"{"keywords": ["loan"], "language": "en"}"#),
        Err(NormalizeError::Transport("connection reset".into())),
        Err(NormalizeError::Provider { status: 500 }),
    ] {
        let n = normalizer_with(ScriptedClient::new(vec![script]));
        let out = n.normalize("Draft a loan repayment letter", &policy(&settings())).await;
        assert!(out.is_fallback());
        assert_eq!(out.keywords(), ["draft", "loan", "repayment", "letter"]);
        assert_eq!(out.language(), "en");
    }
}

#[tokio::test]
async fn stalled_call_times_out_into_fallback() {
    let mut s = settings();
    s.timeout_ms = 20;
    let client = ScriptedClient::slow(Duration::from_millis(500));
    let n = QueryNormalizer::new(s.clone()).with_client("gemini", client.clone());
    let out = n.normalize("sale deed", &policy(&s)).await;
    match out {
        QueryInterpretation::Fallback(f) => assert_eq!(f.reason, FallbackReason::Failed(NormalizeError::Timeout(20))),
        other => panic!("expected fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_degrades_provider_until_cooldown() {
    let s = settings();
    let p = policy(&s);
    let client = ScriptedClient::new(vec![Err(NormalizeError::RateLimited)]);
    let n = normalizer_with(client.clone());

    assert!(n.normalize("partnership deed", &p).await.is_fallback());
    assert!(p.is_degraded("gemini"));

    let second = n.normalize("partnership deed", &p).await;
    match second {
        QueryInterpretation::Fallback(f) => assert_eq!(f.reason, FallbackReason::NoProvider),
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(client.calls(), 1, "degraded provider is not called");
}

#[tokio::test]
async fn unauthorized_degrades_and_zero_cooldown_recovers() {
    let s = settings();
    let p = ProviderPolicy::new(s.providers.clone(), Duration::ZERO);
    let client = ScriptedClient::new(vec![
        Err(NormalizeError::Unauthorized),
        ok(r#"{"search_terms": ["will"], "language": "en"}"#),
    ]);
    let n = normalizer_with(client.clone());
    assert!(n.normalize("last will", &p).await.is_fallback());
    assert!(!n.normalize("last will", &p).await.is_fallback());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn degraded_primary_hands_over_to_next_provider() {
    let mut s = settings();
    s.providers.push(ProviderSettings { name: "backup".into(), ..ProviderSettings::default() });
    let p = policy(&s);
    p.mark_degraded("gemini");
    assert_eq!(p.current_provider().map(|x| x.name), Some("backup".to_string()));

    let backup = ScriptedClient::new(vec![ok(r#"{"search_terms": ["gift"], "language": "hi"}"#)]);
    let n = QueryNormalizer::new(s).with_client("backup", backup.clone());
    let out = n.normalize("gift deed", &p).await;
    assert_eq!(out.keywords(), ["gift"]);
    assert_eq!(out.language(), "hi");
}

#[tokio::test]
async fn missing_client_is_reported() {
    let s = settings();
    let n = QueryNormalizer::new(s.clone());
    match n.normalize("affidavit", &policy(&s)).await {
        QueryInterpretation::Fallback(f) => assert_eq!(f.reason, FallbackReason::NoClient("gemini".into())),
        other => panic!("expected fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn default_policy_makes_a_single_attempt() {
    let client = ScriptedClient::new(vec![Err(NormalizeError::Transport("down".into())), ok(r#"{"search_terms": ["x1"], "language": "en"}"#)]);
    let n = normalizer_with(client.clone());
    assert!(n.normalize("indemnity bond", &policy(&settings())).await.is_fallback());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn retries_stop_at_max_attempts() {
    let retry = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), jitter: 0.5 };

    let flaky = ScriptedClient::new(vec![
        Err(NormalizeError::Transport("reset".into())),
        ok("garbage"),
        ok(r#"{"search_terms": ["lease"], "language": "en"}"#),
    ]);
    let n = normalizer_with(flaky.clone()).with_retry(retry.clone());
    assert!(!n.normalize("lease", &policy(&settings())).await.is_fallback());
    assert_eq!(flaky.calls(), 3);

    let dead = ScriptedClient::new(vec![]);
    let n = normalizer_with(dead.clone()).with_retry(retry.clone());
    assert!(n.normalize("lease", &policy(&settings())).await.is_fallback());
    assert_eq!(dead.calls(), 3);

    let locked_out = ScriptedClient::new(vec![Err(NormalizeError::Unauthorized)]);
    let n = normalizer_with(locked_out.clone()).with_retry(retry);
    assert!(n.normalize("lease", &policy(&settings())).await.is_fallback());
    assert_eq!(locked_out.calls(), 1, "credential failures are not retried");
}

#[test]
fn backoff_doubles_and_caps() {
    let retry = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(100), max_delay: Duration::from_millis(250), jitter: 0.0 };
    assert_eq!(retry.backoff(1), Duration::from_millis(100));
    assert_eq!(retry.backoff(2), Duration::from_millis(200));
    assert_eq!(retry.backoff(3), Duration::from_millis(250));
}

#[tokio::test]
async fn gemini_timeout_reports_the_configured_budget() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = GeminiClient::new(format!("http://{addr}/v1beta"), "gemini-test", Some("key".to_string()), Duration::from_millis(150)).unwrap();
    let err = client.generate("prompt").await.unwrap_err();
    assert_eq!(err, NormalizeError::Timeout(150));
    server.abort();
}
