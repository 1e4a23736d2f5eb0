//! Request Logger — the first filter. Stamps request identity into the
//! context; never fails the request. Client-IP precedence grounded on the
//! XFF-first pattern in `examples/other_examples`'s hermes gateway
//! (`gateway/src/proxy/handler.rs`): left-most `X-Forwarded-For` entry,
//! then `X-Real-IP`, then the TCP peer address, then the literal
//! `"unknown"`.

use async_trait::async_trait;

use apigw_core::{Action, Filter, GatewayError, RequestContext};

pub struct RequestLogger;

#[async_trait]
impl Filter for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        tracing::debug!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.platform_path,
            client_ip = %ctx.client_ip,
            "inbound request"
        );
        Ok(Action::Continue)
    }
}

/// Derive `client_ip` per §4.3's precedence: XFF first entry, then
/// X-Real-IP, then the supplied peer address, then `"unknown"`.
pub fn extract_client_ip(
    xff: Option<&str>,
    x_real_ip: Option<&str>,
    peer_addr: Option<&str>,
) -> String {
    if let Some(xff) = xff
        && let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    if let Some(real_ip) = x_real_ip
        && !real_ip.trim().is_empty() {
            return real_ip.trim().to_string();
        }
    if let Some(peer) = peer_addr
        && !peer.is_empty() {
            return peer.to_string();
        }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xff_takes_precedence() {
        assert_eq!(
            extract_client_ip(Some("1.1.1.1, 2.2.2.2"), Some("3.3.3.3"), Some("4.4.4.4")),
            "1.1.1.1"
        );
    }

    #[test]
    fn falls_back_to_x_real_ip() {
        assert_eq!(extract_client_ip(None, Some("3.3.3.3"), Some("4.4.4.4")), "3.3.3.3");
    }

    #[test]
    fn falls_back_to_peer() {
        assert_eq!(extract_client_ip(None, None, Some("4.4.4.4")), "4.4.4.4");
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(extract_client_ip(None, None, None), "unknown");
    }

    #[test]
    fn blank_xff_falls_through() {
        assert_eq!(extract_client_ip(Some("  "), Some("3.3.3.3"), None), "3.3.3.3");
    }
}
