//! The shared coordination store abstraction (§3/§4.7-4.9 of the core
//! spec): an ordered-set + string/TTL KV store used by the rate limiter,
//! the replay guard and the circuit breaker. Grounded on the teacher's
//! `ConfigCache` (`ando-store/src/cache.rs`) for the in-memory shape and
//! on the `redis` crate already in the workspace dependency table for the
//! production backend — the teacher's own store talks to etcd for
//! *configuration*, this one talks to Redis for *ephemeral coordination
//! state*, which is the shape the spec actually calls for (ordered sets,
//! `SET NX PX`, per-key TTL).

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

use apigw_core::GatewayError;

/// Ordered-set + string/TTL coordination store. Every operation carries
/// its own short deadline at the call site (§5: shared-store calls use a
/// deadline of at most 1s) — the trait itself is deadline-agnostic, the
/// implementation enforces it.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Add `member` to the ordered set at `key` with the given `score`
    /// (milliseconds since epoch in all current uses).
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), GatewayError>;

    /// Remove members with score in `(-inf, max_score]`.
    async fn zremrangebyscore_le(&self, key: &str, max_score: i64) -> Result<(), GatewayError>;

    /// Count members with score in `[min_score, max_score]`.
    async fn zcount(&self, key: &str, min_score: i64, max_score: i64) -> Result<i64, GatewayError>;

    /// Set (or refresh) a TTL on `key`, in milliseconds.
    async fn expire_ms(&self, key: &str, ttl_ms: i64) -> Result<(), GatewayError>;

    /// `SET key value NX PX ttl_ms` — true if the key was absent and is
    /// now set; false if it was already present (unchanged).
    async fn set_if_absent_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, GatewayError>;

    /// Fetch a string value, if present.
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Unconditionally set a string value with a TTL.
    async fn set_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), GatewayError>;

    /// Delete a key (string or ordered set). No-op if absent.
    async fn del(&self, key: &str) -> Result<(), GatewayError>;
}
