//! Response Wrapper — always runs last, wraps the upstream body or error
//! into the uniform envelope, and stamps the fixed header set per §4.11.

use apigw_core::context::Envelope;
use apigw_core::{RequestContext, TerminalResponse};

pub const CORS_METHODS: &str = "GET,POST,PUT,DELETE,OPTIONS";
pub const CORS_HEADERS: &str = "Content-Type,Authorization,accessKey,sign,nonce,timestamp,x-content-sha256";

/// Build the final response for a request that reached the end of the
/// chain without being short-circuited: success if the proxy produced a
/// body, failure if it recorded an error.
pub fn wrap_proxy_outcome(ctx: &RequestContext) -> TerminalResponse {
    let (code, message, data) = if let Some(bytes) = &ctx.proxy_response_bytes {
        let data = serde_json::from_slice::<serde_json::Value>(bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).to_string()));
        (200u16, "ok".to_string(), data)
    } else {
        let err = ctx.proxy_error.as_deref().unwrap_or("unknown upstream failure");
        (500u16, format!("upstream error: {err}"), serde_json::Value::Null)
    };

    let envelope = Envelope {
        code,
        message,
        data,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    TerminalResponse {
        status: code,
        headers: Vec::new(),
        body: serde_json::to_vec(&envelope).unwrap_or_default(),
    }
}

/// Stamp the fixed header set onto any terminal response, success or
/// rejection, per §4.11. Idempotent to call more than once.
pub fn stamp_common_headers(resp: &mut TerminalResponse) {
    let fixed: &[(&str, &str)] = &[
        ("Content-Type", "application/json;charset=UTF-8"),
        ("Cache-Control", "no-cache, no-store, must-revalidate"),
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", CORS_METHODS),
        ("Access-Control-Allow-Headers", CORS_HEADERS),
        ("Access-Control-Max-Age", "3600"),
        ("X-Content-Type-Options", "nosniff"),
        ("X-Frame-Options", "DENY"),
        ("X-XSS-Protection", "1; mode=block"),
        ("X-Powered-By", "XiaoXin-API-Gateway"),
    ];
    for (name, value) in fixed {
        if !resp.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
            resp.headers.push((name.to_string(), value.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new(
            "r".into(),
            "/x".into(),
            "GET".into(),
            "127.0.0.1".into(),
            0,
            HashMap::new(),
            Vec::new(),
            String::new(),
        )
    }

    #[test]
    fn success_wraps_parseable_json_body() {
        let mut c = ctx();
        c.proxy_response_bytes = Some(br#"{"x":1}"#.to_vec());
        let resp = wrap_proxy_outcome(&c);
        assert_eq!(resp.status, 200);
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["code"], 200);
        assert_eq!(v["data"]["x"], 1);
    }

    #[test]
    fn success_wraps_non_json_body_as_string() {
        let mut c = ctx();
        c.proxy_response_bytes = Some(b"plain text".to_vec());
        let resp = wrap_proxy_outcome(&c);
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["data"], "plain text");
    }

    #[test]
    fn failure_wraps_error_message() {
        let mut c = ctx();
        c.proxy_error = Some("timeout".into());
        let resp = wrap_proxy_outcome(&c);
        assert_eq!(resp.status, 500);
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["message"], "upstream error: timeout");
        assert!(v["data"].is_null());
    }

    #[test]
    fn common_headers_are_stamped() {
        let mut resp = TerminalResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        };
        stamp_common_headers(&mut resp);
        assert!(resp.headers.iter().any(|(k, v)| k == "X-Powered-By" && v == "XiaoXin-API-Gateway"));
        assert!(resp.headers.iter().any(|(k, _)| k == "Access-Control-Allow-Origin"));
    }
}
