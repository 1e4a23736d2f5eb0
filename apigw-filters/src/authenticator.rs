//! Authenticator — nonce shape, timestamp freshness, HMAC signature,
//! replay defense. Step ordering follows §4.5 exactly: cheap shape checks
//! before the RPC, RPC before the HMAC recompute, replay check last
//! (since it is the only step allowed to fail open).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use apigw_core::{Action, Filter, GatewayError, RequestContext};
use apigw_store::SharedStore;

use crate::admin::AdminClient;

pub struct Authenticator {
    admin: Arc<dyn AdminClient>,
    store: Arc<dyn SharedStore>,
    nonce_length: usize,
    signature_timeout_s: u64,
    enable_timestamp_validation: bool,
    enable_replay_protection: bool,
}

impl Authenticator {
    pub fn new(
        admin: Arc<dyn AdminClient>,
        store: Arc<dyn SharedStore>,
        nonce_length: usize,
        signature_timeout_s: u64,
        enable_timestamp_validation: bool,
        enable_replay_protection: bool,
    ) -> Self {
        Self {
            admin,
            store,
            nonce_length,
            signature_timeout_s,
            enable_timestamp_validation,
            enable_replay_protection,
        }
    }

    fn nonce_is_valid_shape(&self, nonce: &str) -> bool {
        nonce.len() == self.nonce_length && nonce.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

#[async_trait]
impl Filter for Authenticator {
    fn name(&self) -> &'static str {
        "authenticator"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        let access_key = ctx.get_header("accessKey").unwrap_or("").to_string();
        let nonce = ctx.get_header("nonce").unwrap_or("").to_string();
        let timestamp = ctx.get_header("timestamp").unwrap_or("").to_string();
        let sign = ctx.get_header("sign").unwrap_or("").to_string();
        let content_sha256 = ctx.get_header("x-content-sha256").unwrap_or("").to_string();

        // 1. Shape checks.
        if access_key.trim().is_empty() || nonce.trim().is_empty() || timestamp.trim().is_empty() || sign.trim().is_empty() {
            return Ok(RequestContext::reject_forbidden());
        }

        // 2. Nonce shape.
        if !self.nonce_is_valid_shape(&nonce) {
            return Ok(RequestContext::reject_forbidden());
        }

        // 3. Timestamp freshness.
        if self.enable_timestamp_validation {
            let Ok(ts) = timestamp.parse::<i64>() else {
                return Ok(RequestContext::reject_forbidden());
            };
            let now_s = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock before epoch")
                .as_secs() as i64;
            if (now_s - ts).unsigned_abs() > self.signature_timeout_s {
                return Ok(RequestContext::reject_forbidden());
            }
        }

        // 4. Resolve consumer.
        let Some(consumer) = self.admin.get_invoke_user(&access_key).await? else {
            return Ok(RequestContext::reject_forbidden());
        };

        // 5. Recompute and verify signature.
        let canonical = apigw_core::signer::canonical(
            &ctx.method,
            &ctx.platform_path,
            &content_sha256,
            &timestamp,
            &nonce,
        );
        let expected = apigw_core::signer::hmac_sha256_hex(&canonical, &consumer.secret_key);
        if !apigw_core::signer::verify(&sign, &expected) {
            return Ok(RequestContext::reject_forbidden());
        }

        // 6. Replay protection — fails open on shared-store error.
        if self.enable_replay_protection {
            let key = format!("replay:{access_key}:{nonce}");
            let ttl_ms = (self.signature_timeout_s as i64) * 1000;
            match self.store.set_if_absent_px(&key, "1", ttl_ms).await {
                Ok(true) => {}
                Ok(false) => return Ok(RequestContext::reject_forbidden()),
                Err(e) => {
                    tracing::error!(error = %e, "replay guard store error, allowing permissively");
                }
            }
        }

        ctx.consumer = Some(consumer);
        Ok(Action::Continue)
    }
}
