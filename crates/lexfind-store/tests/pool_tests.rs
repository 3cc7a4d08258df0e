use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lexfind_core::Error;
use lexfind_store::{ConnectionManager, ConnectionPool, SessionConnection};

#[derive(Default)]
struct CountingManager {
    made: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl ConnectionManager for CountingManager {
    type Connection = usize;

    async fn connect(&self) -> lexfind_core::Result<usize> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transient("connection refused".to_string()));
        }
        Ok(self.made.fetch_add(1, Ordering::SeqCst))
    }
}

#[tokio::test]
async fn open_creates_min_connections_eagerly() {
    let manager = CountingManager::default();
    let made = Arc::clone(&manager.made);
    let pool = ConnectionPool::open(manager, 2, 5).await.unwrap();
    assert_eq!(made.load(Ordering::SeqCst), 2);
    let status = pool.status();
    assert_eq!((status.idle, status.in_use, status.max), (2, 0, 5));
}

#[tokio::test]
async fn released_connections_are_reused() {
    let manager = CountingManager::default();
    let made = Arc::clone(&manager.made);
    let pool = ConnectionPool::open(manager, 1, 3).await.unwrap();
    let conn = pool.acquire().await.unwrap();
    assert_eq!(*conn, 0);
    assert_eq!(pool.status().in_use, 1);
    conn.release();
    let again = pool.acquire().await.unwrap();
    assert_eq!(*again, 0);
    assert_eq!(made.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_pool_blocks_until_release() {
    let pool = ConnectionPool::open(CountingManager::default(), 1, 1).await.unwrap();
    let held = pool.acquire().await.unwrap();

    let waiting = tokio::time::timeout(Duration::from_millis(100), pool.acquire()).await;
    assert!(waiting.is_err(), "acquire should block while the only connection is out");

    let other = pool.clone();
    let waiter = tokio::spawn(async move { other.acquire().await.map(|c| *c) });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(held);
    let got = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap().unwrap();
    assert_eq!(got, 0);
}

#[tokio::test]
async fn discarded_connection_is_replaced() {
    let manager = CountingManager::default();
    let made = Arc::clone(&manager.made);
    let pool = ConnectionPool::open(manager, 1, 2).await.unwrap();
    pool.acquire().await.unwrap().discard();
    let status = pool.status();
    assert_eq!((status.idle, status.in_use), (0, 0));
    let fresh = pool.acquire().await.unwrap();
    assert_eq!(*fresh, 1);
    assert_eq!(made.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn closed_pool_rejects_acquire() {
    let pool = ConnectionPool::open(CountingManager::default(), 1, 2).await.unwrap();
    pool.close();
    assert!(pool.status().closed);
    assert_eq!(pool.status().idle, 0);
    assert!(matches!(pool.acquire().await, Err(Error::PoolUnavailable(_))));
}

#[tokio::test]
async fn bounds_and_connect_failures_are_reported() {
    assert!(matches!(ConnectionPool::open(CountingManager::default(), 0, 2).await, Err(Error::InvalidConfig(_))));
    assert!(matches!(ConnectionPool::open(CountingManager::default(), 3, 2).await, Err(Error::InvalidConfig(_))));

    let manager = CountingManager::default();
    manager.fail.store(true, Ordering::SeqCst);
    assert!(matches!(ConnectionPool::open(manager, 1, 2).await, Err(Error::PoolUnavailable(_))));
}

#[tokio::test]
async fn failed_connect_on_acquire_frees_the_slot() {
    let manager = CountingManager::default();
    let fail = Arc::clone(&manager.fail);
    let pool = ConnectionPool::open(manager, 1, 1).await.unwrap();
    pool.acquire().await.unwrap().discard();
    fail.store(true, Ordering::SeqCst);
    assert!(matches!(pool.acquire().await, Err(Error::Transient(_))));
    fail.store(false, Ordering::SeqCst);
    assert!(tokio::time::timeout(Duration::from_millis(200), pool.acquire()).await.unwrap().is_ok());
}

#[tokio::test]
async fn session_keeps_working_after_a_dropped_connection() {
    let manager = CountingManager::default();
    let made = Arc::clone(&manager.made);
    let pool = ConnectionPool::open(manager, 1, 2).await.unwrap();
    let mut session = SessionConnection::open(&pool).await.unwrap();
    assert_eq!(*session.get().await.unwrap(), 0);
    assert_eq!(*session.get().await.unwrap(), 0);

    session.discard();
    assert!(!session.is_held());
    assert_eq!(pool.status().in_use, 0);
    assert_eq!(*session.get().await.unwrap(), 1);
    assert!(session.is_held());
    assert_eq!(made.load(Ordering::SeqCst), 2);

    drop(session);
    assert_eq!(pool.status().idle, 1);
}
