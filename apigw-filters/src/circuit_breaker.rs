//! Circuit Breaker — per-upstream failure window, CLOSED/OPEN/HALF_OPEN
//! state machine, single-flight HALF_OPEN probe election, per §4.9.
//!
//! State machine and failure-window bookkeeping are grounded on
//! `examples/PaulinaBarcat-arte-aio-coding-hub/src-tauri/src/circuit_breaker.rs`'s
//! `CircuitBreaker` (threshold-triggered OPEN, timed reopen-to-CLOSED);
//! that implementation keeps state in an in-process `Mutex<HashMap>` and
//! has no HALF_OPEN stage. Here state lives in the shared store (so it is
//! observed consistently across gateway instances) and the spec's
//! HALF_OPEN + single-flight probe token is layered on top, since a
//! distributed breaker without it would let every instance's concurrent
//! probe hit the recovering upstream at once.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use apigw_core::GatewayError;
use apigw_observability::MetricsCollector;
use apigw_store::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Matches the `apigw_circuit_breaker_state` gauge's documented scale.
    fn metric_code(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

pub struct CircuitBreaker {
    store: Arc<dyn SharedStore>,
    pub failure_threshold: i64,
    pub window_ms: i64,
    pub open_timeout_ms: i64,
    pub redis_key_expire_ms: i64,
    metrics: Option<Arc<MetricsCollector>>,
}

const PROBE_TOKEN_TTL_MS: i64 = 30_000;
const PROBE_LOSER_WAIT_MS: u64 = 100;

impl CircuitBreaker {
    pub fn new(
        store: Arc<dyn SharedStore>,
        failure_threshold: i64,
        window_ms: i64,
        open_timeout_ms: i64,
        redis_key_expire_ms: i64,
    ) -> Self {
        Self {
            store,
            failure_threshold,
            window_ms,
            open_timeout_ms,
            redis_key_expire_ms,
            metrics: None,
        }
    }

    /// Attach a metrics collector so every observed state transition is
    /// reflected in the `apigw_circuit_breaker_state` gauge.
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as i64
    }

    fn state_key(service_key: &str) -> String {
        format!("breaker:state:{service_key}")
    }
    fn open_time_key(service_key: &str) -> String {
        format!("breaker:open_time:{service_key}")
    }
    fn failures_key(service_key: &str) -> String {
        format!("breaker:failures:{service_key}")
    }
    fn probe_token_key(service_key: &str) -> String {
        format!("probe_token:{service_key}")
    }

    /// Derive the breaker's isolation unit from `provider_url`: the host
    /// if it parses as `http(s)`, else `interface:{id}` as a fallback.
    pub fn service_key(provider_url: &str, interface_id: i64) -> String {
        for scheme in ["https://", "http://"] {
            if let Some(rest) = provider_url.strip_prefix(scheme) {
                let host = rest.split(['/', '?', '#']).next().unwrap_or("");
                let host = host.rsplit('@').next().unwrap_or(host); // drop userinfo, if any
                if !host.is_empty() {
                    return host.to_string();
                }
            }
        }
        format!("interface:{interface_id}")
    }

    /// Observed state, per §4.9: absent scalar => CLOSED; OPEN past its
    /// timeout is *observed* as HALF_OPEN without writing anything; any
    /// shared-store error is permissive (CLOSED).
    pub async fn get_state(&self, service_key: &str) -> CircuitState {
        let now = Self::now_ms();
        let state_str = match self.store.get(&Self::state_key(service_key)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "circuit breaker store error, treating as CLOSED");
                return CircuitState::Closed;
            }
        };

        let state = match state_str.as_deref() {
            None => CircuitState::Closed,
            Some("HALF_OPEN") => CircuitState::HalfOpen,
            Some("OPEN") => {
                let open_time = self
                    .store
                    .get(&Self::open_time_key(service_key))
                    .await
                    .ok()
                    .flatten()
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(now);
                if now - open_time >= self.open_timeout_ms {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            Some(_) => CircuitState::Closed,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_state(service_key, state.metric_code());
        }
        state
    }

    /// Record a failure; transition to OPEN if the window's failure count
    /// reaches `failure_threshold`.
    pub async fn record_failure(&self, service_key: &str) -> Result<(), GatewayError> {
        let now = Self::now_ms();
        let key = Self::failures_key(service_key);
        self.store.zremrangebyscore_le(&key, now - self.window_ms).await?;
        self.store.zadd(&key, &Uuid::new_v4().to_string(), now).await?;
        self.store.expire_ms(&key, self.redis_key_expire_ms).await?;

        let count = self.store.zcount(&key, now - self.window_ms, now).await?;
        if count >= self.failure_threshold {
            self.store.set_px(&Self::state_key(service_key), "OPEN", self.redis_key_expire_ms).await?;
            self.store
                .set_px(&Self::open_time_key(service_key), &now.to_string(), self.redis_key_expire_ms)
                .await?;
        }
        Ok(())
    }

    /// Record a success. Only meaningful transition is HALF_OPEN -> CLOSED.
    pub async fn record_success(&self, service_key: &str) -> Result<(), GatewayError> {
        if self.get_state(service_key).await == CircuitState::HalfOpen {
            self.store.del(&Self::state_key(service_key)).await?;
            self.store.del(&Self::open_time_key(service_key)).await?;
        }
        Ok(())
    }

    /// Re-open the breaker after a failed HALF_OPEN probe.
    async fn reopen(&self, service_key: &str) -> Result<(), GatewayError> {
        let now = Self::now_ms();
        self.store.set_px(&Self::state_key(service_key), "OPEN", self.redis_key_expire_ms).await?;
        self.store
            .set_px(&Self::open_time_key(service_key), &now.to_string(), self.redis_key_expire_ms)
            .await?;
        Ok(())
    }

    /// Gate a call through the breaker. `call` is only invoked when the
    /// breaker allows it: always in CLOSED, never in OPEN, and exactly
    /// once per `probe_token` TTL in HALF_OPEN (single-flight election
    /// per §4.9). Returns `Ok(Some(result))` if the call ran, `Ok(None)`
    /// if it was short-circuited by an open breaker.
    pub async fn gate<F, Fut, T>(&self, service_key: &str, call: F) -> Result<Option<T>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        match self.get_state(service_key).await {
            CircuitState::Closed => {
                let result = call().await;
                match &result {
                    Ok(_) => self.record_success(service_key).await?,
                    Err(_) => self.record_failure(service_key).await?,
                }
                result.map(Some)
            }
            CircuitState::Open => Ok(None),
            CircuitState::HalfOpen => {
                let token_key = Self::probe_token_key(service_key);
                let won = self.store.set_if_absent_px(&token_key, "1", PROBE_TOKEN_TTL_MS).await?;
                if won {
                    let result = call().await;
                    match &result {
                        Ok(_) => self.record_success(service_key).await?,
                        Err(_) => self.reopen(service_key).await?,
                    }
                    self.store.del(&token_key).await?;
                    result.map(Some)
                } else {
                    tokio::time::sleep(std::time::Duration::from_millis(PROBE_LOSER_WAIT_MS)).await;
                    if self.get_state(service_key).await == CircuitState::Closed {
                        let result = call().await;
                        match &result {
                            Ok(_) => self.record_success(service_key).await?,
                            Err(_) => self.record_failure(service_key).await?,
                        }
                        result.map(Some)
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}
