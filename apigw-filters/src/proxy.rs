//! Proxy — builds the upstream target URL, strips gateway-internal
//! headers, injects upstream auth, invokes the upstream with a timeout,
//! gated by the circuit breaker, per §4.9/§4.10. On success the response
//! body is stashed in the context; `InvokeCount` fires fire-and-forget.
//! On failure the breaker records it and the context carries an error for
//! the Response Wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use apigw_core::crypto::MasterKey;
use apigw_core::{Action, AuthType, Filter, GatewayError, RequestContext};

use crate::admin::AdminClient;
use crate::circuit_breaker::CircuitBreaker;

/// Headers stripped before forwarding to upstream (case-insensitive),
/// per §4.10.
const GATEWAY_INTERNAL_HEADERS: &[&str] =
    &["accesskey", "sign", "nonce", "timestamp", "body", "x-content-sha256", "x-sign-version"];

#[derive(Debug, Deserialize)]
struct ApiKeyAuthConfig {
    key: String,
    #[serde(default = "default_api_key_header")]
    header: String,
}
fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

#[derive(Debug, Deserialize)]
struct BasicAuthConfig {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct BearerAuthConfig {
    token: String,
}

pub struct Proxy {
    http: reqwest::Client,
    admin: Arc<dyn AdminClient>,
    breaker: Arc<CircuitBreaker>,
    circuit_breaker_enabled: bool,
    master_key: Option<MasterKey>,
    default_timeout_ms: u64,
}

impl Proxy {
    pub fn new(
        admin: Arc<dyn AdminClient>,
        breaker: Arc<CircuitBreaker>,
        circuit_breaker_enabled: bool,
        master_key: Option<MasterKey>,
        default_timeout_ms: u64,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Internal(format!("building proxy HTTP client: {e}")))?;
        Ok(Self {
            http,
            admin,
            breaker,
            circuit_breaker_enabled,
            master_key,
            default_timeout_ms,
        })
    }

    fn build_target_url(provider_url: &str, query: &str) -> String {
        if query.is_empty() {
            return provider_url.to_string();
        }
        let sep = if provider_url.contains('?') { '&' } else { '?' };
        format!("{provider_url}{sep}{query}")
    }

    fn forwardable_headers(ctx: &RequestContext) -> Vec<(String, String)> {
        ctx.request_headers
            .iter()
            .filter(|(k, _)| !GATEWAY_INTERNAL_HEADERS.contains(&k.to_ascii_lowercase().as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn upstream_auth_headers(
        &self,
        auth_type: AuthType,
        auth_config: Option<&str>,
        aad: &str,
    ) -> Result<Vec<(String, String)>, GatewayError> {
        let Some(cipher) = auth_config else {
            return Ok(Vec::new());
        };
        match auth_type {
            AuthType::None => Ok(Vec::new()),
            AuthType::ApiKey => {
                let plaintext = apigw_core::crypto::decrypt(cipher, aad.as_bytes(), self.master_key.as_ref())?;
                let cfg: ApiKeyAuthConfig = serde_json::from_str(&plaintext)
                    .map_err(|e| GatewayError::Internal(format!("invalid api_key auth_config: {e}")))?;
                Ok(vec![(cfg.header, cfg.key)])
            }
            AuthType::Basic => {
                let plaintext = apigw_core::crypto::decrypt(cipher, aad.as_bytes(), self.master_key.as_ref())?;
                let cfg: BasicAuthConfig = serde_json::from_str(&plaintext)
                    .map_err(|e| GatewayError::Internal(format!("invalid basic auth_config: {e}")))?;
                let token = BASE64.encode(format!("{}:{}", cfg.username, cfg.password));
                Ok(vec![("Authorization".to_string(), format!("Basic {token}"))])
            }
            AuthType::Bearer => {
                let plaintext = apigw_core::crypto::decrypt(cipher, aad.as_bytes(), self.master_key.as_ref())?;
                let cfg: BearerAuthConfig = serde_json::from_str(&plaintext)
                    .map_err(|e| GatewayError::Internal(format!("invalid bearer auth_config: {e}")))?;
                Ok(vec![("Authorization".to_string(), format!("Bearer {}", cfg.token))])
            }
        }
    }
}

#[async_trait]
impl Filter for Proxy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        let interface = ctx.interface.clone().expect("interface resolved before proxy");
        let consumer = ctx.consumer.clone().expect("consumer resolved before proxy");

        let service_key = CircuitBreaker::service_key(&interface.provider_url, interface.id);
        let target_url = Self::build_target_url(&interface.provider_url, &ctx.query);
        let aad = format!("{}|{}|{}", interface.provider_url, interface.platform_path, interface.method);
        let auth_headers = self.upstream_auth_headers(interface.auth_type, interface.auth_config.as_deref(), &aad)?;
        let forwarded = Self::forwardable_headers(ctx);
        let method = reqwest::Method::from_bytes(interface.method.as_bytes())
            .map_err(|e| GatewayError::Internal(format!("invalid upstream method: {e}")))?;
        let timeout = Duration::from_millis(interface.timeout_ms.unwrap_or(self.default_timeout_ms));
        let body = ctx.request_body.clone();
        let request_id = ctx.request_id.clone();
        let http = self.http.clone();

        let call = || async move {
            let mut builder = http
                .request(method, &target_url)
                .timeout(timeout)
                .header("X-Forwarded-By", "XiaoXin-API-Gateway")
                .header("X-Request-ID", &request_id);
            for (k, v) in forwarded {
                builder = builder.header(k, v);
            }
            for (k, v) in auth_headers {
                builder = builder.header(k, v);
            }
            if !body.is_empty() {
                builder = builder.body(body);
            }
            let resp = builder
                .send()
                .await
                .map_err(|e| GatewayError::UpstreamFailed(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(GatewayError::UpstreamFailed(format!("upstream status {}", resp.status())));
            }
            resp.bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| GatewayError::UpstreamFailed(e.to_string()))
        };

        let outcome = if self.circuit_breaker_enabled {
            self.breaker.gate(&service_key, call).await
        } else {
            call().await.map(Some)
        };

        match outcome {
            Ok(Some(bytes)) => {
                ctx.proxy_response_bytes = Some(bytes);
                let admin = Arc::clone(&self.admin);
                let (interface_id, consumer_id) = (interface.id, consumer.id);
                tokio::spawn(async move {
                    if let Err(e) = admin.invoke_count(interface_id, consumer_id).await {
                        tracing::error!(error = %e, "InvokeCount RPC failed (swallowed)");
                    }
                });
                Ok(Action::Continue)
            }
            Ok(None) => {
                let suggestion = "retry after the breaker's open timeout elapses".to_string();
                Ok(RequestContext::reject_service_unavailable(&service_key, "circuit open", &suggestion))
            }
            Err(e) => {
                ctx.proxy_error = Some(e.to_string());
                Ok(Action::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn target_url_appends_query_with_question_mark() {
        assert_eq!(Proxy::build_target_url("http://up/echo", "x=1"), "http://up/echo?x=1");
    }

    #[test]
    fn target_url_appends_query_with_ampersand_when_provider_has_one() {
        assert_eq!(Proxy::build_target_url("http://up/echo?a=1", "x=1"), "http://up/echo?a=1&x=1");
    }

    #[test]
    fn empty_query_leaves_url_unchanged() {
        assert_eq!(Proxy::build_target_url("http://up/echo", ""), "http://up/echo");
    }

    #[test]
    fn gateway_internal_headers_are_stripped() {
        let mut ctx = RequestContext::new(
            "r".into(),
            "/x".into(),
            "GET".into(),
            "127.0.0.1".into(),
            0,
            HashMap::new(),
            Vec::new(),
            String::new(),
        );
        ctx.request_headers.insert("accessKey".into(), "ak".into());
        ctx.request_headers.insert("sign".into(), "s".into());
        ctx.request_headers.insert("X-Custom".into(), "keep-me".into());
        let headers = Proxy::forwardable_headers(&ctx);
        assert!(headers.iter().all(|(k, _)| !k.eq_ignore_ascii_case("accessKey")));
        assert!(headers.iter().any(|(k, v)| k == "X-Custom" && v == "keep-me"));
    }
}
