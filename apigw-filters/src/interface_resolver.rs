//! Interface Resolver — looks up the interface record by
//! `(platform_path, method)` and checks it is enabled and has a
//! `provider_url`, per §4.6.

use std::sync::Arc;

use async_trait::async_trait;

use apigw_core::{Action, Filter, GatewayError, RequestContext};

use crate::admin::AdminClient;

pub struct InterfaceResolver {
    admin: Arc<dyn AdminClient>,
}

impl InterfaceResolver {
    pub fn new(admin: Arc<dyn AdminClient>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Filter for InterfaceResolver {
    fn name(&self) -> &'static str {
        "interface_resolver"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        let Some(interface) = self
            .admin
            .get_interface_info(&ctx.platform_path, &ctx.method)
            .await?
        else {
            return Ok(RequestContext::reject_forbidden());
        };

        if !interface.is_enabled() {
            return Ok(RequestContext::reject_forbidden());
        }
        if interface.provider_url.trim().is_empty() {
            return Ok(RequestContext::reject_forbidden());
        }

        ctx.interface = Some(interface);
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use apigw_core::{AuthType, InterfaceRecord, InterfaceStatus};

    use crate::admin::InMemoryAdminClient;

    use super::*;
    use std::collections::HashMap;

    fn ctx_for(path: &str, method: &str) -> RequestContext {
        RequestContext::new(
            "r".into(),
            path.into(),
            method.into(),
            "127.0.0.1".into(),
            0,
            HashMap::new(),
            Vec::new(),
            String::new(),
        )
    }

    fn interface(status: InterfaceStatus, provider_url: &str) -> InterfaceRecord {
        InterfaceRecord {
            id: 1,
            name: "echo".into(),
            platform_path: "/api/echo".into(),
            method: "GET".into(),
            provider_url: provider_url.into(),
            status,
            auth_type: AuthType::None,
            auth_config: None,
            timeout_ms: None,
            rate_limit: None,
            labels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn unknown_route_is_rejected() {
        let resolver = InterfaceResolver::new(Arc::new(InMemoryAdminClient::empty()));
        let mut ctx = ctx_for("/nope", "GET");
        let Action::Terminal(t) = resolver.run(&mut ctx).await.unwrap() else {
            panic!("expected terminal")
        };
        assert_eq!(t.status, 403);
    }

    #[tokio::test]
    async fn disabled_interface_is_rejected() {
        let admin = InMemoryAdminClient::empty();
        admin.insert_interface(interface(InterfaceStatus::Disabled, "http://up/echo"));
        let resolver = InterfaceResolver::new(Arc::new(admin));
        let mut ctx = ctx_for("/api/echo", "GET");
        let Action::Terminal(t) = resolver.run(&mut ctx).await.unwrap() else {
            panic!("expected terminal")
        };
        assert_eq!(t.status, 403);
    }

    #[tokio::test]
    async fn enabled_interface_resolves() {
        let admin = InMemoryAdminClient::empty();
        admin.insert_interface(interface(InterfaceStatus::Enabled, "http://up/echo"));
        let resolver = InterfaceResolver::new(Arc::new(admin));
        let mut ctx = ctx_for("/api/echo", "GET");
        assert!(matches!(resolver.run(&mut ctx).await.unwrap(), Action::Continue));
        assert_eq!(ctx.interface.unwrap().provider_url, "http://up/echo");
    }
}
