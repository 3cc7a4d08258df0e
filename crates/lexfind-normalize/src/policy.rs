use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lexfind_core::config::ProviderSettings;

/// Which generative provider to use, and which ones are cooling down after
/// a rate-limit or credential failure. Shared by reference across requests.
#[derive(Debug)]
pub struct ProviderPolicy {
    providers: Vec<ProviderSettings>,
    cooldown: Duration,
    degraded: Mutex<HashMap<String, Instant>>,
}

impl ProviderPolicy {
    pub fn new(providers: Vec<ProviderSettings>, cooldown: Duration) -> Self {
        Self { providers, cooldown, degraded: Mutex::new(HashMap::new()) }
    }

    /// First configured provider that is not cooling down.
    pub fn current_provider(&self) -> Option<ProviderSettings> {
        let mut degraded = self.degraded.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        degraded.retain(|_, since| now.duration_since(*since) < self.cooldown);
        self.providers.iter().find(|p| !degraded.contains_key(&p.name)).cloned()
    }

    pub fn mark_degraded(&self, provider: &str) {
        tracing::warn!(provider, cooldown = ?self.cooldown, "generative provider degraded");
        self.degraded.lock().unwrap_or_else(|p| p.into_inner()).insert(provider.to_string(), Instant::now());
    }

    pub fn is_degraded(&self, provider: &str) -> bool {
        self.degraded
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(provider)
            .is_some_and(|since| since.elapsed() < self.cooldown)
    }
}
