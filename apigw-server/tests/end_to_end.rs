//! End-to-end pipeline tests: assemble the real filter chain (in-memory
//! admin client + in-memory shared store, a local axum mock upstream) and
//! drive it through `Coordinator::handle`, exercising the invariants and
//! scenarios from the core pipeline spec. Colocated crate-level
//! integration style, grounded on the teacher's own `tests/` layout.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::routing::get;
use axum::Router as AxumRouter;

use apigw_core::{AuthType, Consumer, Filter, InterfaceRecord, InterfaceStatus, RequestContext};
use apigw_filters::admin::InMemoryAdminClient;
use apigw_filters::{Authenticator, CircuitBreaker, InterfaceResolver, IpGuard, Proxy, QuotaGate, RateLimiter, RequestLogger};
use apigw_pipeline::Coordinator;
use apigw_store::{InMemoryStore, SharedStore};

async fn spawn_mock_upstream() -> String {
    let app = AxumRouter::new().route("/echo", get(|| async { r#"{"hello":"world"}"# }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn consumer() -> Consumer {
    Consumer {
        id: 1,
        role: "default".into(),
        access_key: "ak_test".into(),
        secret_key: "sk_test".into(),
    }
}

fn interface(provider_url: &str, rate_limit: Option<i64>) -> InterfaceRecord {
    InterfaceRecord {
        id: 10,
        name: "echo".into(),
        platform_path: "/api/echo".into(),
        method: "GET".into(),
        provider_url: provider_url.into(),
        status: InterfaceStatus::Enabled,
        auth_type: AuthType::None,
        auth_config: None,
        timeout_ms: None,
        rate_limit,
        labels: HashMap::new(),
    }
}

/// Builds a validly signed request context. `seq` must be unique per call
/// within a test (it seeds the nonce) since the replay guard rejects a
/// repeated nonce outright.
fn signed_ctx(client_ip: &str, seq: u32) -> RequestContext {
    let nonce = format!("nonce{seq:011}");
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs().to_string();
    let canonical = apigw_core::signer::canonical("GET", "/api/echo", "", &ts, &nonce);
    let sign = apigw_core::signer::hmac_sha256_hex(&canonical, "sk_test");

    let mut headers = HashMap::new();
    headers.insert("accessKey".into(), "ak_test".into());
    headers.insert("nonce".into(), nonce);
    headers.insert("timestamp".into(), ts);
    headers.insert("sign".into(), sign);

    RequestContext::new(
        "req-1".into(),
        "/api/echo".into(),
        "GET".into(),
        client_ip.into(),
        0,
        headers,
        Vec::new(),
        String::new(),
    )
}

struct Fixture {
    admin: Arc<InMemoryAdminClient>,
    store: Arc<InMemoryStore>,
}

async fn fixture(rate_limit: Option<i64>) -> Fixture {
    let upstream_url = spawn_mock_upstream().await;
    let admin = Arc::new(InMemoryAdminClient::empty());
    admin.insert_consumer(consumer());
    admin.insert_interface(interface(&format!("{upstream_url}/echo"), rate_limit));
    admin.set_quota(1, 10, 1_000);
    let store = Arc::new(InMemoryStore::new());
    Fixture { admin, store }
}

fn chain_without_ip_guard(f: &Fixture) -> (Vec<Arc<dyn Filter>>, Arc<CircuitBreaker>) {
    let breaker = Arc::new(CircuitBreaker::new(Arc::clone(&f.store) as Arc<dyn SharedStore>, 5, 300_000, 60_000, 900_000));
    let chain: Vec<Arc<dyn Filter>> = vec![
        Arc::new(RequestLogger),
        Arc::new(Authenticator::new(
            Arc::clone(&f.admin) as Arc<_>,
            Arc::clone(&f.store) as Arc<_>,
            16,
            300,
            true,
            true,
        )),
        Arc::new(InterfaceResolver::new(Arc::clone(&f.admin) as Arc<_>)),
        Arc::new(RateLimiter::new(Arc::clone(&f.store) as Arc<_>, true, 60_000, 1000, 15_000)),
        Arc::new(QuotaGate::new(Arc::clone(&f.admin) as Arc<_>, false)),
        Arc::new(Proxy::new(Arc::clone(&f.admin) as Arc<_>, Arc::clone(&breaker), true, None, 5_000).unwrap()),
    ];
    (chain, breaker)
}

#[tokio::test]
async fn full_chain_proxies_a_valid_signed_request() {
    let f = fixture(None).await;
    let (chain, _breaker) = chain_without_ip_guard(&f);
    let coordinator = Coordinator::new(chain, None);

    let (resp, _ctx) = coordinator.handle(signed_ctx("127.0.0.1", 1)).await;
    assert_eq!(resp.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["data"]["hello"], "world");
}

#[tokio::test]
async fn ip_guard_rejects_addresses_outside_the_whitelist() {
    let f = fixture(None).await;
    let (mut chain, _breaker) = chain_without_ip_guard(&f);
    chain.insert(1, Arc::new(IpGuard::new(vec!["10.0.0.0/8".to_string()])));
    let coordinator = Coordinator::new(chain, None);

    let (resp, _ctx) = coordinator.handle(signed_ctx("127.0.0.1", 1)).await;
    assert_eq!(resp.status, 403);
}

#[tokio::test]
async fn unknown_access_key_never_reaches_upstream() {
    let f = fixture(None).await;
    let (chain, _breaker) = chain_without_ip_guard(&f);
    let coordinator = Coordinator::new(chain, None);

    let mut ctx = signed_ctx("127.0.0.1", 1);
    ctx.request_headers.insert("accessKey".into(), "nope".into());
    let (resp, _ctx) = coordinator.handle(ctx).await;
    assert_eq!(resp.status, 403);
}

#[tokio::test]
async fn rate_limiter_returns_429_once_the_window_is_exhausted() {
    let f = fixture(Some(2)).await;
    let (chain, _breaker) = chain_without_ip_guard(&f);
    let coordinator = Coordinator::new(chain, None);

    let mut statuses = Vec::new();
    for i in 0..3 {
        let (resp, _ctx) = coordinator.handle(signed_ctx("127.0.0.1", i)).await;
        statuses.push(resp.status);
    }
    assert_eq!(statuses, vec![200, 200, 429]);
}

#[tokio::test]
async fn quota_gate_returns_429_once_quota_is_exhausted() {
    let f = fixture(None).await;
    f.admin.set_quota(1, 10, 1);
    let (chain, _breaker) = chain_without_ip_guard(&f);
    let coordinator = Coordinator::new(chain, None);

    let (first, _ctx1) = coordinator.handle(signed_ctx("127.0.0.1", 1)).await;
    let (second, _ctx2) = coordinator.handle(signed_ctx("127.0.0.1", 2)).await;
    assert_eq!(first.status, 200);
    assert_eq!(second.status, 429);
}

#[tokio::test]
async fn circuit_breaker_opens_after_repeated_upstream_failures_and_short_circuits() {
    let admin = Arc::new(InMemoryAdminClient::empty());
    admin.insert_consumer(consumer());
    // Nothing is listening on this port - every call fails.
    admin.insert_interface(interface("http://127.0.0.1:1", None));
    admin.set_quota(1, 10, 1_000);
    let store = Arc::new(InMemoryStore::new());
    let breaker = Arc::new(CircuitBreaker::new(Arc::clone(&store) as Arc<dyn SharedStore>, 2, 300_000, 300_000, 900_000));

    let chain: Vec<Arc<dyn Filter>> = vec![
        Arc::new(RequestLogger),
        Arc::new(Authenticator::new(Arc::clone(&admin) as Arc<_>, Arc::clone(&store) as Arc<_>, 16, 300, true, true)),
        Arc::new(InterfaceResolver::new(Arc::clone(&admin) as Arc<_>)),
        Arc::new(QuotaGate::new(Arc::clone(&admin) as Arc<_>, true)),
        Arc::new(Proxy::new(Arc::clone(&admin) as Arc<_>, Arc::clone(&breaker), true, None, 200).unwrap()),
    ];
    let coordinator = Coordinator::new(chain, None);

    let mut statuses = Vec::new();
    for i in 0..3 {
        let (resp, _ctx) = coordinator.handle(signed_ctx("127.0.0.1", i)).await;
        statuses.push(resp.status);
    }
    // First two calls hit the (failing) upstream directly: 500. The third
    // observes the now-open breaker and short-circuits to 503 without
    // calling upstream at all.
    assert_eq!(statuses, vec![500, 500, 503]);
}
