pub mod admin;
pub mod authenticator;
pub mod circuit_breaker;
pub mod interface_resolver;
pub mod ip_guard;
pub mod logger;
pub mod proxy;
pub mod quota_gate;
pub mod rate_limiter;
pub mod response_wrapper;

pub use admin::{AdminClient, InMemoryAdminClient, RpcAdminClient, SharedAdminClient};
pub use authenticator::Authenticator;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use interface_resolver::InterfaceResolver;
pub use ip_guard::IpGuard;
pub use logger::RequestLogger;
pub use proxy::Proxy;
pub use quota_gate::QuotaGate;
pub use rate_limiter::RateLimiter;
