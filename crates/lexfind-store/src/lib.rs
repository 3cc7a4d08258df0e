//! lexfind-store
//!
//! Corpus backends and the infrastructure underneath them: a bounded
//! connection pool, an SSH tunnel supervisor, the Postgres backend and the
//! in-process snapshot backend. `StoreRuntime` wires them from settings.

pub mod pool;
pub mod postgres;
pub mod snapshot;
pub mod tunnel;
pub mod vector;

use std::sync::Arc;

use lexfind_core::config::{expand_path, Settings, StoreBackend};
use lexfind_core::traits::CorpusStore;
use lexfind_core::Result;

pub use pool::{ConnectionManager, ConnectionPool, PoolStatus, PooledConnection, SessionConnection};
pub use postgres::{PgConnector, PgCorpus};
pub use snapshot::SnapshotCorpus;
pub use tunnel::{Endpoint, TunnelOwnership, TunnelSupervisor};
pub use vector::cosine_similarity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHealth {
    pub backend: &'static str,
    pub tunnel_reachable: Option<bool>,
    pub pool: Option<PoolStatus>,
}

/// The opened store plus whatever infrastructure it owns.
pub struct StoreRuntime {
    pub store: Arc<dyn CorpusStore>,
    postgres: Option<Arc<PgCorpus>>,
    tunnel: Option<Arc<TunnelSupervisor>>,
}

impl StoreRuntime {
    /// Start the tunnel when one is configured, then open the pool against
    /// its local endpoint. A snapshot backend needs neither.
    pub async fn open(settings: &Settings) -> Result<Self> {
        match settings.store.backend {
            StoreBackend::Snapshot => {
                let path = expand_path(&settings.store.snapshot_path);
                let corpus = SnapshotCorpus::load(&path)?;
                Ok(Self { store: Arc::new(corpus), postgres: None, tunnel: None })
            }
            StoreBackend::Postgres => {
                let tunnel = settings.tunnel.clone().map(|t| Arc::new(TunnelSupervisor::new(t)));
                let endpoint = match &tunnel {
                    Some(t) => Some(t.start().await?),
                    None => None,
                };
                let connector = PgConnector::new(&settings.store.dsn, endpoint.as_ref())?;
                tracing::info!(target_addr = %connector.target(), "opening postgres pool");
                let pool = match ConnectionPool::open(connector, settings.store.pool_min, settings.store.pool_max).await {
                    Ok(pool) => pool,
                    Err(e) => {
                        if let Some(t) = &tunnel { let _ = t.stop().await; }
                        return Err(e);
                    }
                };
                let corpus = Arc::new(PgCorpus::new(pool));
                let store: Arc<dyn CorpusStore> = corpus.clone();
                Ok(Self { store, postgres: Some(corpus), tunnel })
            }
        }
    }

    pub fn from_store(store: Arc<dyn CorpusStore>) -> Self { Self { store, postgres: None, tunnel: None } }

    pub async fn health(&self) -> StoreHealth {
        let tunnel_reachable = match &self.tunnel {
            Some(t) => Some(t.health_check().await),
            None => None,
        };
        StoreHealth {
            backend: self.store.backend(),
            tunnel_reachable,
            pool: self.postgres.as_ref().map(|p| p.pool_status()),
        }
    }

    /// Close the pool, then stop the tunnel if this process started it.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(pg) = &self.postgres { pg.close(); }
        if let Some(t) = &self.tunnel { t.stop().await?; }
        Ok(())
    }
}
