use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use apigw_core::GatewayError;

use crate::SharedStore;

/// Redis-backed `SharedStore`. Uses `ConnectionManager` for automatic
/// reconnection (the teacher relies on similar always-reconnecting
/// handles for its etcd watch client, `ando-store/src/watcher.rs`); every
/// call is wrapped in `deadline` per §5 ("shared-store calls use a short
/// deadline, ≤ 1s").
pub struct RedisStore {
    conn: ConnectionManager,
    deadline: Duration,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, deadline_ms: u64) -> Result<Self, GatewayError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::Store(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| GatewayError::Store(format!("redis connect failed: {e}")))?;
        Ok(Self {
            conn,
            deadline: Duration::from_millis(deadline_ms),
        })
    }

    async fn with_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, GatewayError> {
        tokio::time::timeout(self.deadline, fut)
            .await
            .map_err(|_| GatewayError::Store("shared store deadline exceeded".into()))?
            .map_err(|e| GatewayError::Store(e.to_string()))
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.zadd::<_, _, _, ()>(key, member, score))
            .await
    }

    async fn zremrangebyscore_le(&self, key: &str, max_score: i64) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.zrembyscore::<_, _, _, ()>(key, "-inf", max_score))
            .await
    }

    async fn zcount(&self, key: &str, min_score: i64, max_score: i64) -> Result<i64, GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.zcount(key, min_score, max_score)).await
    }

    async fn expire_ms(&self, key: &str, ttl_ms: i64) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let secs = ((ttl_ms as f64) / 1000.0).ceil() as i64;
        self.with_deadline(conn.expire::<_, ()>(key, secs.max(1))).await
    }

    async fn set_if_absent_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, GatewayError> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::PX(ttl_ms as u64));
        let result: Option<String> = self
            .with_deadline(conn.set_options(key, value, opts))
            .await?;
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.get(key)).await
    }

    async fn set_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.set_ex::<_, _, ()>(key, value, (ttl_ms as u64).div_ceil(1000).max(1)))
            .await
    }

    async fn del(&self, key: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        self.with_deadline(conn.del::<_, ()>(key)).await
    }
}
