//! Bounded connection pool generic over a connector.
//!
//! A semaphore sized `max` gates checkouts; idle connections sit in a small
//! mutex-protected stack. Exhaustion blocks the caller until a connection is
//! returned. There is no queue-depth limit.

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use lexfind_core::{Error, Result};

/// Creates connections for a [`ConnectionPool`].
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
    pub max: usize,
    pub closed: bool,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<M::Connection>>,
    in_use: AtomicUsize,
    max: usize,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn idle_stack(&self) -> std::sync::MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ConnectionPool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Eagerly open `min` connections. Fails if any of them cannot be made.
    pub async fn open(manager: M, min: usize, max: usize) -> Result<Self> {
        if min == 0 || min > max {
            return Err(Error::InvalidConfig(format!("pool bounds must satisfy 1 <= min <= max (min={min}, max={max})")));
        }
        let mut idle = Vec::with_capacity(max);
        for _ in 0..min {
            let conn = manager.connect().await.map_err(|e| Error::PoolUnavailable(e.to_string()))?;
            idle.push(conn);
        }
        tracing::info!(min, max, "connection pool initialized");
        Ok(Self {
            inner: Arc::new(PoolInner {
                manager,
                semaphore: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(idle),
                in_use: AtomicUsize::new(0),
                max,
            }),
        })
    }

    /// Check out a connection, waiting while all `max` are in use. A closed
    /// pool is `PoolUnavailable`; a failed connect is `Transient`.
    pub async fn acquire(&self) -> Result<PooledConnection<M>> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolUnavailable("pool is closed".to_string()))?;
        let reused = self.inner.idle_stack().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.inner.manager.connect().await.map_err(Error::transient)?,
        };
        self.inner.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection { conn: Some(conn), pool: Arc::clone(&self.inner), _permit: permit })
    }

    /// Drop idle connections and fail every later `acquire`. Checked-out
    /// connections are dropped when their guards go away.
    pub fn close(&self) {
        self.inner.semaphore.close();
        let dropped = std::mem::take(&mut *self.inner.idle_stack());
        tracing::info!(idle_dropped = dropped.len(), "connection pool closed");
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            idle: self.inner.idle_stack().len(),
            in_use: self.inner.in_use.load(Ordering::SeqCst),
            max: self.inner.max,
            closed: self.inner.semaphore.is_closed(),
        }
    }
}

/// A checked-out connection. Returns to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    pub fn release(self) {}

    /// Throw the connection away instead of returning it, e.g. after a
    /// protocol error left it in an unknown state.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            tracing::debug!("discarding pooled connection");
        }
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            if !self.pool.semaphore.is_closed() {
                self.pool.idle_stack().push(conn);
            }
        }
    }
}

/// The connection a multi-query session works on. A connection dropped after
/// a fatal error is replaced from the pool on the next use, so one failed
/// query does not starve the ones after it.
pub struct SessionConnection<M: ConnectionManager> {
    pool: ConnectionPool<M>,
    conn: Option<PooledConnection<M>>,
}

impl<M: ConnectionManager> SessionConnection<M> {
    pub async fn open(pool: &ConnectionPool<M>) -> Result<Self> {
        let conn = pool.acquire().await?;
        Ok(Self { pool: pool.clone(), conn: Some(conn) })
    }

    pub async fn get(&mut self) -> Result<&mut M::Connection> {
        if self.conn.is_none() {
            tracing::debug!("re-acquiring session connection");
            self.conn = Some(self.pool.acquire().await?);
        }
        self.conn.as_deref_mut().ok_or_else(|| Error::Transient("session has no connection".to_string()))
    }

    /// Throw the current connection away; the next `get` checks out another.
    pub fn discard(&mut self) {
        if let Some(conn) = self.conn.take() { conn.discard(); }
    }

    pub fn is_held(&self) -> bool { self.conn.is_some() }
}
