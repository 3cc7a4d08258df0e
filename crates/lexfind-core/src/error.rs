use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    /// No connection could be obtained from the backing store. The only error
    /// a retrieval request surfaces to its caller.
    #[error("Connection pool unavailable: {0}")]
    PoolUnavailable(String),

    /// Store unreachable, query rejected, model unloaded. Callers degrade
    /// to fewer candidates instead of propagating it.
    #[error("Transient infrastructure error: {0}")]
    Transient(String),

    #[error("Tunnel error: {0}")]
    Tunnel(String),
}

impl Error {
    pub fn transient(e: impl std::fmt::Display) -> Self { Error::Transient(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
