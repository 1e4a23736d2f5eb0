//! Layered configuration: YAML file + `GW_`-prefixed env var overrides
//! (`__` nesting separator), following the teacher's figment-based
//! `AndoConfig::load` pattern.

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub admin: AdminClientConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load from an optional YAML path, falling back to defaults, then
    /// overlaying `GW_*` environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, GatewayError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            GatewayConfig::default(),
        ));

        if let Some(path) = config_path {
            if std::path::Path::new(path).exists() {
                figment = figment.merge(Yaml::file(path));
            }
        } else {
            for default_path in ["./gateway.yaml", "/etc/apigw/gateway.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("GW_").split("__"));

        figment
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    #[serde(default = "default_signature_timeout_seconds")]
    pub signature_timeout_seconds: u64,
    #[serde(default = "default_nonce_length")]
    pub nonce_length: usize,
    #[serde(default = "default_true")]
    pub enable_timestamp_validation: bool,
    #[serde(default = "default_true")]
    pub enable_replay_protection: bool,
    #[serde(default)]
    pub authcfg: AuthCfgConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            ip_whitelist: Vec::new(),
            signature_timeout_seconds: default_signature_timeout_seconds(),
            nonce_length: default_nonce_length(),
            enable_timestamp_validation: true,
            enable_replay_protection: true,
            authcfg: AuthCfgConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthCfgConfig {
    /// Base64-encoded 32-byte AES-256 key for envelope decryption.
    #[serde(default)]
    pub master_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rate_limit_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_rate_limit_default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_rate_limit_key_expire_seconds")]
    pub key_expire_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: default_rate_limit_window_seconds(),
            default_limit: default_rate_limit_default_limit(),
            key_expire_seconds: default_rate_limit_key_expire_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_proxy_retry_count")]
    pub default_retry_count: u32,
    #[serde(default)]
    pub enable_request_logging: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_proxy_timeout_ms(),
            default_retry_count: default_proxy_retry_count(),
            enable_request_logging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
    #[serde(default = "default_open_timeout_minutes")]
    pub open_timeout_minutes: u64,
    #[serde(default = "default_redis_key_expire_minutes")]
    pub redis_key_expire_minutes: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            window_minutes: default_window_minutes(),
            open_timeout_minutes: default_open_timeout_minutes(),
            redis_key_expire_minutes: default_redis_key_expire_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default = "default_true")]
    pub ip_guard: bool,
    #[serde(default = "default_true")]
    pub authenticator: bool,
    #[serde(default = "default_true")]
    pub rate_limiter: bool,
    #[serde(default = "default_true")]
    pub quota_gate: bool,
    #[serde(default = "default_true")]
    pub circuit_breaker: bool,
    /// Whether the Quota Gate fails closed (503) when `PreConsume` itself
    /// errors (admin backend unreachable), vs waving the request through.
    /// Strict by default per §7's "RPC outages do NOT degrade".
    #[serde(default = "default_true")]
    pub quota_gate_strict_on_rpc_error: bool,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            ip_guard: true,
            authenticator: true,
            rate_limiter: true,
            quota_gate: true,
            circuit_breaker: true,
            quota_gate_strict_on_rpc_error: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClientConfig {
    #[serde(default = "default_admin_base_url")]
    pub base_url: String,
    #[serde(default = "default_admin_timeout_ms")]
    pub timeout_ms: u64,
    /// When true, use the in-memory fixture double instead of RPC.
    #[serde(default)]
    pub in_memory: bool,
    #[serde(default)]
    pub fixture_path: Option<String>,
}

impl Default for AdminClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_admin_base_url(),
            timeout_ms: default_admin_timeout_ms(),
            in_memory: false,
            fixture_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_store_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            deadline_ms: default_store_deadline_ms(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_exporter_enabled: bool,
    #[serde(default)]
    pub log_exporter_url: Option<String>,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_exporter_enabled: false,
            log_exporter_url: None,
            metrics_addr: default_metrics_addr(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_signature_timeout_seconds() -> u64 {
    300
}
fn default_nonce_length() -> usize {
    16
}
fn default_rate_limit_window_seconds() -> u64 {
    60
}
fn default_rate_limit_default_limit() -> i64 {
    1000
}
fn default_rate_limit_key_expire_seconds() -> u64 {
    75
}
fn default_proxy_timeout_ms() -> u64 {
    30_000
}
fn default_proxy_retry_count() -> u32 {
    3
}
fn default_failure_threshold() -> u64 {
    5
}
fn default_window_minutes() -> u64 {
    5
}
fn default_open_timeout_minutes() -> u64 {
    1
}
fn default_redis_key_expire_minutes() -> u64 {
    15
}
fn default_admin_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}
fn default_admin_timeout_ms() -> u64 {
    5_000
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_store_deadline_ms() -> u64 {
    1_000
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9464".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = GatewayConfig::default();
        assert_eq!(c.security.signature_timeout_seconds, 300);
        assert_eq!(c.security.nonce_length, 16);
        assert!(c.security.enable_timestamp_validation);
        assert!(c.security.enable_replay_protection);
        assert_eq!(c.rate_limit.window_seconds, 60);
        assert_eq!(c.rate_limit.default_limit, 1000);
        assert_eq!(c.rate_limit.key_expire_seconds, 75);
        assert_eq!(c.proxy.default_timeout_ms, 30_000);
        assert_eq!(c.proxy.default_retry_count, 3);
        assert!(c.circuit_breaker.enabled);
        assert_eq!(c.circuit_breaker.failure_threshold, 5);
        assert_eq!(c.circuit_breaker.window_minutes, 5);
        assert_eq!(c.circuit_breaker.open_timeout_minutes, 1);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let c = GatewayConfig::load(Some("/nonexistent/gateway.yaml")).unwrap();
        assert_eq!(c.rate_limit.default_limit, 1000);
    }

    #[test]
    fn env_override_applies_with_double_underscore_nesting() {
        // SAFETY: this test mutates process env; run single-threaded via
        // cargo test's default per-test isolation is not guaranteed across
        // threads, so we scope the var name to this test only.
        unsafe {
            std::env::set_var("GW_RATE_LIMIT__DEFAULT_LIMIT", "42");
        }
        let c = GatewayConfig::load(None).unwrap();
        assert_eq!(c.rate_limit.default_limit, 42);
        unsafe {
            std::env::remove_var("GW_RATE_LIMIT__DEFAULT_LIMIT");
        }
    }
}
