//! Quota Gate — atomic pre-consume against the admin backend's quota
//! row, per §4.8. `PreConsume` failure is strict by default (503) per
//! §7's "RPC outages do NOT degrade"; `strict_on_rpc_error` makes this
//! configurable as the spec allows.

use std::sync::Arc;

use async_trait::async_trait;

use apigw_core::{Action, Filter, GatewayError, RequestContext};

use crate::admin::AdminClient;

pub struct QuotaGate {
    admin: Arc<dyn AdminClient>,
    strict_on_rpc_error: bool,
}

impl QuotaGate {
    pub fn new(admin: Arc<dyn AdminClient>, strict_on_rpc_error: bool) -> Self {
        Self {
            admin,
            strict_on_rpc_error,
        }
    }
}

#[async_trait]
impl Filter for QuotaGate {
    fn name(&self) -> &'static str {
        "quota_gate"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        let interface = ctx.interface.as_ref().expect("interface resolved before quota gate");
        let consumer = ctx.consumer.as_ref().expect("consumer resolved before quota gate");

        match self.admin.pre_consume(interface.id, consumer.id).await {
            Ok(true) => Ok(Action::Continue),
            Ok(false) => Ok(RequestContext::reject_too_many("quota exhausted or not provisioned")),
            Err(e) => {
                if self.strict_on_rpc_error {
                    Err(GatewayError::UpstreamFailed(format!("PreConsume RPC failed: {e}")))
                } else {
                    tracing::error!(error = %e, "PreConsume RPC failed, allowing permissively");
                    Ok(Action::Continue)
                }
            }
        }
    }
}
