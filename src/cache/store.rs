//! Transient store and retry-queue seams.
//!
//! The reconciliation flow only ever talks to these traits. Production wires
//! the Redis-backed implementations; tests and `SKIP_EXTERNALS` runs use the
//! in-memory ones.

use crate::cache::error::{CacheError, CacheResult};
use crate::cache::RedisPool;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait TransientStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Atomic check-and-consume. Concurrent callers for the same key must
    /// observe at most one `Some`; separate get-then-delete calls are not an
    /// acceptable implementation.
    async fn get_and_delete(&self, key: &str) -> CacheResult<Option<String>>;
}

/// FIFO queue for paid orders whose durable write failed.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    async fn push(&self, entry: &str) -> CacheResult<()>;

    async fn pop(&self) -> CacheResult<Option<String>>;
}

pub struct RedisTransientStore {
    pool: RedisPool,
}

impl RedisTransientStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransientStore for RedisTransientStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::TtlError("TTL must be positive".to_string()));
        }
        let mut conn = self.pool.get().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }

    async fn get_and_delete(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        // GETDEL is a single server-side operation, so retried callbacks
        // racing on the same key see exactly one hit.
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut *conn).await?;
        Ok(value)
    }
}

pub struct RedisRetryQueue {
    pool: RedisPool,
    queue_key: String,
}

impl RedisRetryQueue {
    pub fn new(pool: RedisPool, queue_key: impl Into<String>) -> Self {
        Self {
            pool,
            queue_key: queue_key.into(),
        }
    }
}

#[async_trait]
impl RetryQueue for RedisRetryQueue {
    async fn push(&self, entry: &str) -> CacheResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("RPUSH")
            .arg(&self.queue_key)
            .arg(entry)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn pop(&self) -> CacheResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("LPOP")
            .arg(&self.queue_key)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }
}

/// In-memory store with lazy expiry. The single mutex makes
/// `get_and_delete` atomic for concurrent callers.
#[derive(Default)]
pub struct MemoryTransientStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryTransientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransientStore for MemoryTransientStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        if ttl.is_zero() {
            return Err(CacheError::TtlError("TTL must be positive".to_string()));
        }
        let deadline = Instant::now() + ttl;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        entries.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn get_and_delete(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        match entries.remove(key) {
            Some((_, deadline)) if deadline <= Instant::now() => Ok(None),
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryRetryQueue {
    entries: Mutex<VecDeque<String>>,
}

impl MemoryRetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RetryQueue for MemoryRetryQueue {
    async fn push(&self, entry: &str) -> CacheResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        entries.push_back(entry.to_string());
        Ok(())
    }

    async fn pop(&self) -> CacheResult<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        Ok(entries.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemoryTransientStore::new();
        store
            .set("k", "v", Duration::from_secs(900))
            .await
            .expect("set should succeed");
        assert_eq!(store.get("k").await.expect("get"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let store = MemoryTransientStore::new();
        store
            .set("k", "v", Duration::from_millis(20))
            .await
            .expect("set should succeed");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
        assert_eq!(store.get_and_delete("k").await.expect("getdel"), None);
    }

    #[tokio::test]
    async fn get_and_delete_consumes_exactly_once() {
        let store = MemoryTransientStore::new();
        store
            .set("k", "v", Duration::from_secs(900))
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get_and_delete("k").await.expect("first"),
            Some("v".to_string())
        );
        assert_eq!(store.get_and_delete("k").await.expect("second"), None);
    }

    #[tokio::test]
    async fn concurrent_consumers_see_one_hit() {
        let store = Arc::new(MemoryTransientStore::new());
        store
            .set("k", "v", Duration::from_secs(900))
            .await
            .expect("set should succeed");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(
                async move { store.get_and_delete("k").await },
            ));
        }

        let mut hits = 0;
        for handle in handles {
            if handle
                .await
                .expect("task join")
                .expect("getdel should not error")
                .is_some()
            {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn retry_queue_is_fifo() {
        let queue = MemoryRetryQueue::new();
        queue.push("a").await.expect("push");
        queue.push("b").await.expect("push");
        assert_eq!(queue.pop().await.expect("pop"), Some("a".to_string()));
        assert_eq!(queue.pop().await.expect("pop"), Some("b".to_string()));
        assert_eq!(queue.pop().await.expect("pop"), None);
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let store = MemoryTransientStore::new();
        assert!(store.set("k", "v", Duration::ZERO).await.is_err());
    }
}
