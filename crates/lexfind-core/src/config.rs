//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__FAST_PATH_THRESHOLD`).
//! Every tunable has a default so an empty configuration is usable.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::MatchMethod;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Wrap an already-assembled figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match env {
            "prod" | "production" => {
                if settings.embedding.use_fake {
                    anyhow::bail!("embedding.use_fake must be false in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub search: SearchSettings,
    pub normalizer: NormalizerSettings,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub tunnel: Option<TunnelSettings>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) { Ok(()) } else { Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {v}"))) }
        };
        unit("retrieval.fast_path_threshold", self.retrieval.fast_path_threshold)?;
        unit("retrieval.agreement_bonus", self.retrieval.agreement_bonus)?;
        unit("search.vector_floor", self.search.vector_floor)?;
        unit("search.fuzzy_floor", self.search.fuzzy_floor)?;
        unit("search.legacy_score", self.search.legacy_score)?;
        unit("normalizer.retry.jitter", self.normalizer.retry.jitter)?;
        for m in MatchMethod::ALL {
            if self.retrieval.weights.weight(m) < 0.0 {
                return Err(Error::InvalidConfig(format!("retrieval.weights.{m} must not be negative")));
            }
        }
        if self.retrieval.fused_limit == 0 { return Err(Error::InvalidConfig("retrieval.fused_limit must be positive".into())); }
        if self.embedding.dimension == 0 { return Err(Error::InvalidConfig("embedding.dimension must be positive".into())); }
        if self.normalizer.retry.max_attempts == 0 { return Err(Error::InvalidConfig("normalizer.retry.max_attempts must be at least 1".into())); }
        if self.store.pool_min == 0 || self.store.pool_min > self.store.pool_max {
            return Err(Error::InvalidConfig(format!(
                "store pool bounds invalid: min={} max={}",
                self.store.pool_min, self.store.pool_max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MethodWeights {
    pub vector: f32,
    pub fuzzy: f32,
    pub text: f32,
    pub legacy: f32,
}

impl Default for MethodWeights {
    fn default() -> Self { Self { vector: 1.0, fuzzy: 1.2, text: 0.9, legacy: 0.5 } }
}

impl MethodWeights {
    pub fn weight(&self, method: MatchMethod) -> f32 {
        match method {
            MatchMethod::Vector => self.vector,
            MatchMethod::Fuzzy => self.fuzzy,
            MatchMethod::Text => self.text,
            MatchMethod::Legacy => self.legacy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Top fused score that must be exceeded to skip normalization.
    pub fast_path_threshold: f32,
    /// Share of the weaker score added when a second method agrees.
    pub agreement_bonus: f32,
    pub fused_limit: usize,
    pub max_alternatives: usize,
    pub weights: MethodWeights,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { fast_path_threshold: 0.45, agreement_bonus: 0.2, fused_limit: 40, max_alternatives: 5, weights: MethodWeights::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub vector_floor: f32,
    pub vector_limit: usize,
    pub text_limit: usize,
    pub text_rank_scale: f32,
    pub fuzzy_floor: f32,
    pub fuzzy_limit: usize,
    pub fuzzy_min_query_chars: usize,
    pub legacy_score: f32,
    pub legacy_limit: usize,
    /// Legacy substring matching only runs below this many combined hits.
    pub legacy_min_hits: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            vector_floor: 0.35,
            vector_limit: 25,
            text_limit: 20,
            text_rank_scale: 1.5,
            fuzzy_floor: 0.3,
            fuzzy_limit: 15,
            fuzzy_min_query_chars: 4,
            legacy_score: 0.2,
            legacy_limit: 10,
            legacy_min_hits: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of each delay added as random jitter.
    pub jitter: f32,
}

impl Default for RetrySettings {
    fn default() -> Self { Self { max_attempts: 1, base_delay_ms: 250, max_delay_ms: 2_000, jitter: 0.2 } }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    pub name: String,
    pub model: String,
    pub endpoint: String,
    /// Environment variable holding the API key; the key itself never lives in config files.
    pub api_key_env: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub timeout_ms: u64,
    pub max_keywords: usize,
    pub min_token_chars: usize,
    pub default_language: String,
    pub degraded_cooldown_secs: u64,
    pub retry: RetrySettings,
    pub providers: Vec<ProviderSettings>,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 4_000,
            max_keywords: 8,
            min_token_chars: 3,
            default_language: "en".to_string(),
            degraded_cooldown_secs: 300,
            retry: RetrySettings::default(),
            providers: vec![ProviderSettings::default()],
        }
    }
}

impl NormalizerSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
    pub fn degraded_cooldown(&self) -> Duration { Duration::from_secs(self.degraded_cooldown_secs) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub dimension: usize,
    pub max_len: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: "models/all-MiniLM-L6-v2".to_string(), dimension: 384, max_len: 256, use_fake: false }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub dsn: String,
    pub snapshot_path: String,
    pub pool_min: usize,
    pub pool_max: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            dsn: "postgres://postgres@localhost:5432/lexfind".to_string(),
            snapshot_path: "data/corpus.json".to_string(),
            pool_min: 1,
            pool_max: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TunnelSettings {
    pub bastion_host: String,
    pub bastion_port: u16,
    pub user: String,
    pub key_path: String,
    pub remote_host: String,
    pub remote_port: u16,
    pub local_port: u16,
    pub ready_timeout_ms: u64,
    pub ssh_binary: String,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            bastion_host: String::new(),
            bastion_port: 22,
            user: "ec2-user".to_string(),
            key_path: "~/.ssh/bastion.pem".to_string(),
            remote_host: String::new(),
            remote_port: 5432,
            local_port: 5432,
            ready_timeout_ms: 10_000,
            ssh_binary: "ssh".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
