//! The `Filter` capability — one stage of the request pipeline.
//!
//! Recast from the teacher's inheritance-based `Plugin` trait
//! (`ando-plugin/src/plugin.rs`) into the flat capability the design notes
//! call for: `{run(ctx) -> Action}`. Filters are synchronous in signature
//! but `async fn` in body (the pipeline runs end-to-end on tokio, per the
//! "do not mix" rule), since most of them suspend on a shared-store or RPC
//! call.

use async_trait::async_trait;

use crate::context::{Action, RequestContext};
use crate::error::GatewayError;

#[async_trait]
pub trait Filter: Send + Sync {
    /// Name used in logs and filter-timing metrics.
    fn name(&self) -> &'static str;

    /// Run this stage. `Ok(Action::Continue)` advances the chain;
    /// `Ok(Action::Terminal(_))` or `Err(_)` stops it at the Response
    /// Wrapper.
    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError>;
}
