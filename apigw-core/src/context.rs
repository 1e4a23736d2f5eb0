//! Per-request shared context and the filter chain's action type.
//!
//! Grounded on the teacher's `PluginContext`/`PluginResult` pair
//! (`ando-plugin/src/plugin.rs`), generalized per the spec's design note
//! 9: "recast as a sum type of filter kinds or an interface capability
//! `{run(ctx) -> Action}`". One `RequestContext` is created per inbound
//! request and owned exclusively by the pipeline coordinator; filters only
//! borrow it.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

use crate::consumer::Consumer;
use crate::error::GatewayError;
use crate::interface::InterfaceRecord;

/// Envelope body shape the Response Wrapper always produces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    pub data: Value,
    pub timestamp: i64,
}

/// A terminal HTTP response produced by a filter that short-circuits the
/// chain, or by the Response Wrapper itself.
#[derive(Debug, Clone)]
pub struct TerminalResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// What a filter decided to do with the request.
pub enum Action {
    /// Keep going to the next filter in the chain.
    Continue,
    /// Stop the chain now; the Response Wrapper still runs to stamp
    /// common headers, but the body/status below are authoritative.
    Terminal(TerminalResponse),
}

/// Per-request state shared across the filter chain. Lifetime: created
/// before the first filter runs, discarded after the response is flushed.
pub struct RequestContext {
    pub request_id: String,
    pub platform_path: String,
    pub method: String,
    pub client_ip: String,
    pub start_time_ms: i64,

    pub consumer: Option<Consumer>,
    pub interface: Option<InterfaceRecord>,

    /// Raw upstream response body, set by the Proxy filter on success.
    pub proxy_response_bytes: Option<Vec<u8>>,
    /// Set by the Proxy filter (or synthesized by the circuit breaker) on
    /// failure; carried through to the Response Wrapper.
    pub proxy_error: Option<String>,

    /// Request headers as received, case preserved.
    pub request_headers: HashMap<String, String>,
    /// Raw request body, if any.
    pub request_body: Vec<u8>,
    /// Query string, exclusive of the leading `?`.
    pub query: String,

    /// Free-form bag for filter-to-filter data that doesn't warrant a
    /// first-class field (mirrors the teacher's `PluginContext::vars`).
    vars: HashMap<String, Value>,

    start_instant: Instant,
    /// Per-filter elapsed time in milliseconds, recorded by the
    /// coordinator for the Response Wrapper's metrics.
    pub filter_timings_ms: Vec<(&'static str, f64)>,
}

impl RequestContext {
    pub fn new(
        request_id: String,
        platform_path: String,
        method: String,
        client_ip: String,
        start_time_ms: i64,
        request_headers: HashMap<String, String>,
        request_body: Vec<u8>,
        query: String,
    ) -> Self {
        Self {
            request_id,
            platform_path,
            method,
            client_ip,
            start_time_ms,
            consumer: None,
            interface: None,
            proxy_response_bytes: None,
            proxy_error: None,
            request_headers,
            request_body,
            query,
            vars: HashMap::new(),
            start_instant: Instant::now(),
            filter_timings_ms: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64() * 1000.0
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.request_headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == lower)
            .map(|(_, v)| v.as_str())
    }

    /// 403, empty body — used by the IP Guard and most Authenticator
    /// rejections per §4.1/§7 (no internal detail exposed).
    pub fn reject_forbidden() -> Action {
        Action::Terminal(TerminalResponse {
            status: 403,
            headers: Vec::new(),
            body: Vec::new(),
        })
    }

    /// 429 with an envelope body.
    pub fn reject_too_many(message: &str) -> Action {
        Action::Terminal(TerminalResponse {
            status: 429,
            headers: vec![("content-type".into(), "application/json;charset=UTF-8".into())],
            body: envelope_json(429, message, Value::Null),
        })
    }

    /// 503 with the circuit-open envelope shape.
    pub fn reject_service_unavailable(service: &str, reason: &str, suggestion: &str) -> Action {
        let data = serde_json::json!({
            "service": service,
            "reason": reason,
            "suggestion": suggestion,
        });
        Action::Terminal(TerminalResponse {
            status: 503,
            headers: vec![("content-type".into(), "application/json;charset=UTF-8".into())],
            body: envelope_json(503, "service temporarily unavailable, retry later", data),
        })
    }
}

fn envelope_json(code: u16, message: &str, data: Value) -> Vec<u8> {
    let env = Envelope {
        code,
        message: message.to_string(),
        data,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    serde_json::to_vec(&env).unwrap_or_default()
}

impl From<GatewayError> for Action {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::RateLimited => RequestContext::reject_too_many(&err.message()),
            GatewayError::QuotaExhausted => RequestContext::reject_too_many(&err.message()),
            GatewayError::CircuitOpen { service, suggestion } => {
                RequestContext::reject_service_unavailable(service, "circuit open", suggestion)
            }
            GatewayError::Forbidden(_) => RequestContext::reject_forbidden(),
            _ => Action::Terminal(TerminalResponse {
                status: err.status_code(),
                headers: vec![("content-type".into(), "application/json;charset=UTF-8".into())],
                body: envelope_json(err.status_code(), &err.message(), Value::Null),
            }),
        }
    }
}
