//! Pipeline coordinator, grounded on the teacher's `PluginPipeline`
//! (`ando-plugin/src/pipeline.rs`): owns the ordered filter chain, runs it
//! to completion or first `Action::Terminal`, and always invokes the
//! Response Wrapper stage before handing a response back to the server.

use std::sync::Arc;
use std::time::Instant;

use apigw_core::{Action, Filter, RequestContext, TerminalResponse};
use apigw_filters::response_wrapper::{stamp_common_headers, wrap_proxy_outcome};
use apigw_observability::MetricsCollector;

pub struct Coordinator {
    chain: Vec<Arc<dyn Filter>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Coordinator {
    /// `chain` is the ordered list of enabled filters (Logger, IP Guard,
    /// Authenticator, Interface Resolver, Rate Limiter, Quota Gate, Proxy
    /// — whichever are toggled on per `FiltersConfig`). Disabled filters
    /// are simply left out by the caller; the coordinator itself has no
    /// opinion on ordering or toggles.
    pub fn new(chain: Vec<Arc<dyn Filter>>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { chain, metrics }
    }

    /// Returns the response alongside the spent `ctx`, so the caller can
    /// still read request-scoped outcomes (elapsed time, resolved
    /// consumer) that only exist once the chain has run.
    pub async fn handle(&self, mut ctx: RequestContext) -> (TerminalResponse, RequestContext) {
        let mut terminal: Option<TerminalResponse> = None;

        for filter in &self.chain {
            let started = Instant::now();
            let outcome = filter.run(&mut ctx).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            ctx.filter_timings_ms.push((filter.name(), elapsed_ms));
            if let Some(metrics) = &self.metrics {
                metrics.record_filter_timing(filter.name(), elapsed_ms);
            }

            match outcome {
                Ok(Action::Continue) => continue,
                Ok(Action::Terminal(resp)) => {
                    terminal = Some(resp);
                    break;
                }
                Err(err) => {
                    tracing::warn!(filter = filter.name(), error = %err, "filter rejected request");
                    let Action::Terminal(resp) = Action::from(err) else {
                        unreachable!("GatewayError always converts to a terminal action")
                    };
                    terminal = Some(resp);
                    break;
                }
            }
        }

        let mut resp = terminal.unwrap_or_else(|| wrap_proxy_outcome(&ctx));
        stamp_common_headers(&mut resp);

        if let Some(metrics) = &self.metrics {
            let interface = ctx
                .interface
                .as_ref()
                .map(|i| i.platform_path.clone())
                .unwrap_or_else(|| ctx.platform_path.clone());
            metrics.record_request(&interface, resp.status, ctx.elapsed_ms());
        }

        (resp, ctx)
    }
}
