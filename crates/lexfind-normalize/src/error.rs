use thiserror::Error;

/// Why a generative normalization attempt failed. Never surfaced to callers:
/// every variant ends in the local fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider rejected credentials")]
    Unauthorized,

    #[error("provider returned status {status}")]
    Provider { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl NormalizeError {
    /// Worth another attempt within the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            NormalizeError::Timeout(_) | NormalizeError::Transport(_) | NormalizeError::RateLimited | NormalizeError::Malformed(_) => true,
            NormalizeError::Provider { status } => *status >= 500,
            NormalizeError::Unauthorized => false,
        }
    }

    /// The provider should be skipped for a cooldown period.
    pub fn degrades_provider(&self) -> bool { matches!(self, NormalizeError::RateLimited | NormalizeError::Unauthorized) }
}
