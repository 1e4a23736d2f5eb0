//! `AdminClient` — the RPC surface the spec describes in §6
//! (`GetInvokeUser`, `GetInterfaceInfo`, `PreConsume`, `InvokeCount`),
//! against the out-of-scope admin/relational backend. Two
//! implementations, grounded on the teacher's `ConfigCache`
//! (`ando-store/src/cache.rs`) for the in-memory/`DashMap` shape:
//!
//! - `InMemoryAdminClient`: a YAML-fixture-backed double for local runs
//!   and tests — not the real admin backend, just enough to run the
//!   pipeline end-to-end.
//! - `RpcAdminClient`: a thin `reqwest` HTTP client for the shape a real
//!   deployment would use; the admin backend's own implementation stays
//!   out of scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use apigw_core::{Consumer, GatewayError, InterfaceRecord};

#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn get_invoke_user(&self, access_key: &str) -> Result<Option<Consumer>, GatewayError>;

    async fn get_interface_info(
        &self,
        platform_path: &str,
        method: &str,
    ) -> Result<Option<InterfaceRecord>, GatewayError>;

    /// Atomic conditional decrement: `remaining -= 1 WHERE remaining > 0`.
    /// Returns whether a row was affected.
    async fn pre_consume(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError>;

    /// Atomic `total_used += 1`. Distinct from `pre_consume`; callers must
    /// swallow failures per §4.8/§7.
    async fn invoke_count(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError>;
}

/// In-memory / fixture-backed double. Consumers and interfaces are loaded
/// once from a YAML fixture; quota rows live in a `DashMap` mutated by
/// `pre_consume`/`invoke_count` for the lifetime of the process.
pub struct InMemoryAdminClient {
    consumers_by_key: DashMap<String, Consumer>,
    interfaces_by_path_method: DashMap<(String, String), InterfaceRecord>,
    quota: DashMap<(i64, i64), QuotaRow>,
}

#[derive(Debug, Clone, Default)]
struct QuotaRow {
    remaining: i64,
    total_used: i64,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    consumers: Vec<Consumer>,
    #[serde(default)]
    interfaces: Vec<InterfaceRecord>,
    #[serde(default)]
    quota: Vec<QuotaFixtureRow>,
}

#[derive(Debug, Deserialize)]
struct QuotaFixtureRow {
    consumer_id: i64,
    interface_id: i64,
    remaining: i64,
}

impl InMemoryAdminClient {
    pub fn empty() -> Self {
        Self {
            consumers_by_key: DashMap::new(),
            interfaces_by_path_method: DashMap::new(),
            quota: DashMap::new(),
        }
    }

    pub fn from_fixture_str(yaml: &str) -> Result<Self, GatewayError> {
        let fixture: Fixture = serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("invalid admin fixture: {e}")))?;
        let client = Self::empty();
        for c in fixture.consumers {
            client.consumers_by_key.insert(c.access_key.clone(), c);
        }
        for i in fixture.interfaces {
            client
                .interfaces_by_path_method
                .insert((i.platform_path.clone(), i.method.to_uppercase()), i);
        }
        for q in fixture.quota {
            client.quota.insert(
                (q.consumer_id, q.interface_id),
                QuotaRow {
                    remaining: q.remaining,
                    total_used: 0,
                },
            );
        }
        Ok(client)
    }

    pub fn from_fixture_path(path: &str) -> Result<Self, GatewayError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("reading fixture {path}: {e}")))?;
        Self::from_fixture_str(&contents)
    }

    /// Test/dev helper: register a consumer directly.
    pub fn insert_consumer(&self, consumer: Consumer) {
        self.consumers_by_key.insert(consumer.access_key.clone(), consumer);
    }

    /// Test/dev helper: register an interface directly.
    pub fn insert_interface(&self, interface: InterfaceRecord) {
        self.interfaces_by_path_method.insert(
            (interface.platform_path.clone(), interface.method.to_uppercase()),
            interface,
        );
    }

    /// Test/dev helper: seed a quota row.
    pub fn set_quota(&self, consumer_id: i64, interface_id: i64, remaining: i64) {
        self.quota.insert(
            (consumer_id, interface_id),
            QuotaRow {
                remaining,
                total_used: 0,
            },
        );
    }

    pub fn quota_snapshot(&self, consumer_id: i64, interface_id: i64) -> Option<(i64, i64)> {
        self.quota
            .get(&(consumer_id, interface_id))
            .map(|r| (r.remaining, r.total_used))
    }
}

impl Default for InMemoryAdminClient {
    fn default() -> Self {
        Self::empty()
    }
}

#[async_trait]
impl AdminClient for InMemoryAdminClient {
    async fn get_invoke_user(&self, access_key: &str) -> Result<Option<Consumer>, GatewayError> {
        Ok(self.consumers_by_key.get(access_key).map(|r| r.clone()))
    }

    async fn get_interface_info(
        &self,
        platform_path: &str,
        method: &str,
    ) -> Result<Option<InterfaceRecord>, GatewayError> {
        Ok(self
            .interfaces_by_path_method
            .get(&(platform_path.to_string(), method.to_uppercase()))
            .map(|r| r.clone()))
    }

    async fn pre_consume(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError> {
        let mut row = self
            .quota
            .entry((consumer_id, interface_id))
            .or_default();
        if row.remaining > 0 {
            row.remaining -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn invoke_count(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError> {
        let mut row = self
            .quota
            .entry((consumer_id, interface_id))
            .or_default();
        row.total_used += 1;
        Ok(true)
    }
}

/// Thin HTTP RPC client against the out-of-scope admin backend.
pub struct RpcAdminClient {
    http: reqwest::Client,
    base_url: String,
}

impl RpcAdminClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| GatewayError::Internal(format!("building admin RPC client: {e}")))?;
        Ok(Self { http, base_url })
    }
}

#[async_trait]
impl AdminClient for RpcAdminClient {
    async fn get_invoke_user(&self, access_key: &str) -> Result<Option<Consumer>, GatewayError> {
        let url = format!("{}/rpc/invoke-user", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("accessKey", access_key)])
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("GetInvokeUser RPC: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        resp.json::<Option<Consumer>>()
            .await
            .map_err(|e| GatewayError::Internal(format!("GetInvokeUser RPC decode: {e}")))
    }

    async fn get_interface_info(
        &self,
        platform_path: &str,
        method: &str,
    ) -> Result<Option<InterfaceRecord>, GatewayError> {
        let url = format!("{}/rpc/interface-info", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("platformPath", platform_path), ("method", method)])
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("GetInterfaceInfo RPC: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        resp.json::<Option<InterfaceRecord>>()
            .await
            .map_err(|e| GatewayError::Internal(format!("GetInterfaceInfo RPC decode: {e}")))
    }

    async fn pre_consume(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError> {
        let url = format!("{}/rpc/pre-consume", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&HashMap::from([
                ("interfaceId", interface_id),
                ("consumerId", consumer_id),
            ]))
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("PreConsume RPC: {e}")))?;
        resp.json::<bool>()
            .await
            .map_err(|e| GatewayError::Internal(format!("PreConsume RPC decode: {e}")))
    }

    async fn invoke_count(&self, interface_id: i64, consumer_id: i64) -> Result<bool, GatewayError> {
        let url = format!("{}/rpc/invoke-count", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&HashMap::from([
                ("interfaceId", interface_id),
                ("consumerId", consumer_id),
            ]))
            .send()
            .await
            .map_err(|e| GatewayError::Internal(format!("InvokeCount RPC: {e}")))?;
        resp.json::<bool>()
            .await
            .map_err(|e| GatewayError::Internal(format!("InvokeCount RPC decode: {e}")))
    }
}

pub type SharedAdminClient = Arc<dyn AdminClient>;
