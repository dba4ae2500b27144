//! C1 — KV client adapter. A narrow capability interface (`incr`/`expire`/`sadd`/`scard`)
//! so the rate limiter and risk scorer can run against a real Redis deployment or an
//! in-memory double in tests, without caring which.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv_unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn incr(&self, key: &str) -> Result<i64, KvError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError>;
    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError>;
    async fn scard(&self, key: &str) -> Result<i64, KvError>;
}

#[derive(Clone)]
pub struct RedisKvStore {
    manager: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.manager.clone();
        conn.incr(key, 1)
            .await
            .map_err(|err| KvError::Unavailable(err.to_string()))
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        conn.expire(key, seconds as i64)
            .await
            .map_err(|err| KvError::Unavailable(err.to_string()))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        conn.sadd(key, member)
            .await
            .map_err(|err| KvError::Unavailable(err.to_string()))
    }

    async fn scard(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.manager.clone();
        conn.scard(key)
            .await
            .map_err(|err| KvError::Unavailable(err.to_string()))
    }
}

/// In-memory double for tests. Counters and sets expire lazily on access,
/// mirroring the TTL semantics of the Redis-backed store closely enough
/// for the rate limiter and risk scorer's own window logic to behave the
/// same against either implementation.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    counters: Arc<Mutex<HashMap<String, (i64, Option<Instant>)>>>,
    sets: Arc<Mutex<HashMap<String, (Vec<String>, Option<Instant>)>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut guard = self.counters.lock().await;
        let entry = guard.entry(key.to_string()).or_insert((0, None));
        if let Some(expires_at) = entry.1 {
            if Instant::now() >= expires_at {
                entry.0 = 0;
                entry.1 = None;
            }
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError> {
        let mut guard = self.counters.lock().await;
        if let Some(entry) = guard.get_mut(key) {
            entry.1 = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut guard = self.sets.lock().await;
        let entry = guard.entry(key.to_string()).or_insert((Vec::new(), None));
        if let Some(expires_at) = entry.1 {
            if Instant::now() >= expires_at {
                entry.0.clear();
                entry.1 = None;
            }
        }
        if !entry.0.iter().any(|existing| existing == member) {
            entry.0.push(member.to_string());
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<i64, KvError> {
        let guard = self.sets.lock().await;
        Ok(guard.get(key).map(|(members, _)| members.len() as i64).unwrap_or(0))
    }
}
