//! Gateway binary: CLI + tracing setup grounded on the teacher's
//! `ando-server/src/main.rs`, HTTP front door grounded on the teacher's
//! axum admin server (`ando-admin/src/server.rs`). Wires config, the
//! shared store, the admin client and the filter chain into a single
//! catch-all reverse-proxy route plus `/healthz` and `/metrics`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router as AxumRouter;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::info;

use apigw_core::config::GatewayConfig;
use apigw_core::crypto::MasterKey;
use apigw_core::{Filter, RequestContext};
use apigw_filters::admin::{AdminClient, InMemoryAdminClient, RpcAdminClient};
use apigw_filters::logger::extract_client_ip;
use apigw_filters::{Authenticator, CircuitBreaker, InterfaceResolver, IpGuard, Proxy, QuotaGate, RateLimiter, RequestLogger};
use apigw_observability::{AccessLogConfig, AccessLogExporter, MetricsCollector};
use apigw_pipeline::Coordinator;
use apigw_store::{InMemoryStore, RedisStore, SharedStore};

#[derive(Parser, Debug)]
#[command(name = "apigw", version, about = "API gateway core: pipeline front door")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG if set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Address to bind the gateway's HTTP listener on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

struct AppState {
    coordinator: Coordinator,
    metrics: Arc<MetricsCollector>,
    access_log: AccessLogExporter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "gateway starting");

    let config_path = cli.config.as_deref().and_then(|p| p.to_str());
    let config = GatewayConfig::load(config_path)?;

    let store: Arc<dyn SharedStore> = if config.store.in_memory {
        info!("using in-memory shared store");
        Arc::new(InMemoryStore::new())
    } else {
        info!(url = %config.store.redis_url, "connecting to redis shared store");
        Arc::new(RedisStore::connect(&config.store.redis_url, config.store.deadline_ms).await?)
    };

    let admin: Arc<dyn AdminClient> = if config.admin.in_memory {
        info!("using in-memory admin client");
        match &config.admin.fixture_path {
            Some(path) => Arc::new(InMemoryAdminClient::from_fixture_path(path)?),
            None => Arc::new(InMemoryAdminClient::empty()),
        }
    } else {
        info!(base_url = %config.admin.base_url, "using RPC admin client");
        Arc::new(RpcAdminClient::new(config.admin.base_url.clone(), config.admin.timeout_ms)?)
    };

    let master_key = config
        .security
        .authcfg
        .master_key
        .as_deref()
        .map(MasterKey::from_base64)
        .transpose()?;

    let metrics = Arc::new(MetricsCollector::new()?);

    let breaker = Arc::new(
        CircuitBreaker::new(
            Arc::clone(&store),
            config.circuit_breaker.failure_threshold as i64,
            (config.circuit_breaker.window_minutes * 60_000) as i64,
            (config.circuit_breaker.open_timeout_minutes * 60_000) as i64,
            (config.circuit_breaker.redis_key_expire_minutes * 60_000) as i64,
        )
        .with_metrics(Arc::clone(&metrics)),
    );

    let mut chain: Vec<Arc<dyn Filter>> = vec![Arc::new(RequestLogger)];
    if config.filters.ip_guard {
        chain.push(Arc::new(IpGuard::new(config.security.ip_whitelist.clone())));
    }
    if config.filters.authenticator {
        chain.push(Arc::new(Authenticator::new(
            Arc::clone(&admin),
            Arc::clone(&store),
            config.security.nonce_length,
            config.security.signature_timeout_seconds,
            config.security.enable_timestamp_validation,
            config.security.enable_replay_protection,
        )));
    }
    chain.push(Arc::new(InterfaceResolver::new(Arc::clone(&admin))));
    if config.filters.rate_limiter {
        chain.push(Arc::new(RateLimiter::new(
            Arc::clone(&store),
            config.rate_limit.enabled,
            (config.rate_limit.window_seconds * 1000) as i64,
            config.rate_limit.default_limit,
            (config.rate_limit.key_expire_seconds * 1000) as i64 - (config.rate_limit.window_seconds * 1000) as i64,
        )));
    }
    if config.filters.quota_gate {
        chain.push(Arc::new(QuotaGate::new(
            Arc::clone(&admin),
            config.filters.quota_gate_strict_on_rpc_error,
        )));
    }
    chain.push(Arc::new(Proxy::new(
        Arc::clone(&admin),
        Arc::clone(&breaker),
        config.filters.circuit_breaker,
        master_key,
        config.proxy.default_timeout_ms,
    )?));

    let access_log = AccessLogExporter::new(AccessLogConfig {
        enabled: config.observability.log_exporter_enabled,
        endpoint: config.observability.log_exporter_url.clone(),
        ..AccessLogConfig::default()
    });

    let coordinator = Coordinator::new(chain, Some(Arc::clone(&metrics)));
    let state = Arc::new(AppState { coordinator, metrics, access_log });

    let app = AxumRouter::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/{*path}", any(proxy_handler))
        .route("/", any(proxy_handler))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = cli.listen.parse()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.gather_text())
}

async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let request_headers: std::collections::HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let x_real_ip = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    let client_ip = extract_client_ip(xff, x_real_ip, Some(&peer.ip().to_string()));

    let now_ms = chrono::Utc::now().timestamp_millis();
    let ctx = RequestContext::new(
        request_id.clone(),
        uri.path().to_string(),
        method.to_string(),
        client_ip.clone(),
        now_ms,
        request_headers,
        body.to_vec(),
        uri.query().unwrap_or_default().to_string(),
    );

    let interface_label = ctx.platform_path.clone();
    let method_label = ctx.method.clone();
    let start_path = ctx.platform_path.clone();

    let (resp, ctx) = state.coordinator.handle(ctx).await;

    state.access_log.log(
        &request_id,
        &interface_label,
        &method_label,
        &start_path,
        resp.status,
        ctx.elapsed_ms(),
        &client_ip,
        ctx.consumer.as_ref().map(|c| c.id),
    );

    let mut builder = Response::builder().status(resp.status);
    for (k, v) in &resp.headers {
        builder = builder.header(k, v);
    }
    builder.body(axum::body::Body::from(resp.body)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
