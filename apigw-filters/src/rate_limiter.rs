//! Rate Limiter — sliding window over the shared store's ordered set,
//! per §4.7. Insertion happens before the count (the current request is
//! counted), so a request landing exactly at the limit is admitted —
//! preserved per §9 open question (a).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use uuid::Uuid;

use apigw_core::{Action, Filter, GatewayError, RequestContext};
use apigw_store::SharedStore;

pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    enabled: bool,
    window_ms: i64,
    default_limit: i64,
    slack_ms: i64,
    key_prefix: &'static str,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, enabled: bool, window_ms: i64, default_limit: i64, slack_ms: i64) -> Self {
        Self {
            store,
            enabled,
            window_ms,
            default_limit,
            slack_ms,
            key_prefix: "ratelimit",
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as i64
    }
}

#[async_trait]
impl Filter for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limiter"
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Action, GatewayError> {
        if !self.enabled {
            return Ok(Action::Continue);
        }

        let interface = ctx.interface.as_ref().expect("interface resolved before rate limiter");
        let consumer = ctx.consumer.as_ref().expect("consumer resolved before rate limiter");

        let limit = match interface.rate_limit {
            Some(l) if l > 0 => l,
            Some(_) => return Ok(Action::Continue), // zero/negative => skip per §4.7
            None => self.default_limit,
        };

        let key = format!("{}:{}:{}", self.key_prefix, consumer.id, interface.id);
        let now = Self::now_ms();

        let result: Result<i64, GatewayError> = async {
            self.store.zremrangebyscore_le(&key, now - self.window_ms).await?;
            let member = format!("{now}:{}", Uuid::new_v4());
            self.store.zadd(&key, &member, now).await?;
            self.store.expire_ms(&key, self.window_ms + self.slack_ms).await?;
            self.store.zcount(&key, now - self.window_ms, now).await
        }
        .await;

        match result {
            Ok(count) => {
                if count > limit {
                    Ok(RequestContext::reject_too_many("rate-limited, retry later"))
                } else {
                    Ok(Action::Continue)
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "rate limiter store error, allowing permissively");
                Ok(Action::Continue)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use apigw_core::{AuthType, Consumer, InterfaceRecord, InterfaceStatus};
    use apigw_store::InMemoryStore;

    use super::*;

    fn ctx_with(rate_limit: Option<i64>) -> RequestContext {
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
        ctx.consumer = Some(Consumer {
            id: 1,
            role: String::new(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
        });
        ctx.interface = Some(InterfaceRecord {
            id: 10,
            name: "x".into(),
            platform_path: "/x".into(),
            method: "GET".into(),
            provider_url: "http://up".into(),
            status: InterfaceStatus::Enabled,
            auth_type: AuthType::None,
            auth_config: None,
            timeout_ms: None,
            rate_limit,
            labels: HashMap::new(),
        });
        ctx
    }

    #[tokio::test]
    async fn admits_up_to_and_including_the_limit() {
        let store = Arc::new(InMemoryStore::new());
        let rl = RateLimiter::new(store, true, 60_000, 1000, 15_000);

        for _ in 0..2 {
            let mut ctx = ctx_with(Some(2));
            assert!(matches!(rl.run(&mut ctx).await.unwrap(), Action::Continue));
        }
    }

    #[tokio::test]
    async fn rejects_once_over_the_limit() {
        let store = Arc::new(InMemoryStore::new());
        let rl = RateLimiter::new(store, true, 60_000, 1000, 15_000);

        for _ in 0..2 {
            let mut ctx = ctx_with(Some(2));
            assert!(matches!(rl.run(&mut ctx).await.unwrap(), Action::Continue));
        }
        let mut third = ctx_with(Some(2));
        let Action::Terminal(t) = rl.run(&mut third).await.unwrap() else {
            panic!("expected terminal")
        };
        assert_eq!(t.status, 429);
    }

    #[tokio::test]
    async fn non_positive_limit_skips_the_check() {
        let store = Arc::new(InMemoryStore::new());
        let rl = RateLimiter::new(store, true, 60_000, 1, 15_000);
        for _ in 0..5 {
            let mut ctx = ctx_with(Some(0));
            assert!(matches!(rl.run(&mut ctx).await.unwrap(), Action::Continue));
        }
    }

    #[tokio::test]
    async fn disabled_limiter_always_continues() {
        let store = Arc::new(InMemoryStore::new());
        let rl = RateLimiter::new(store, false, 60_000, 1, 15_000);
        let mut ctx = ctx_with(Some(1));
        assert!(matches!(rl.run(&mut ctx).await.unwrap(), Action::Continue));
        let mut ctx2 = ctx_with(Some(1));
        assert!(matches!(rl.run(&mut ctx2).await.unwrap(), Action::Continue));
    }
}
