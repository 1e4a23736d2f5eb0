use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Upstream auth scheme injected by the Proxy filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    #[default]
    None,
    ApiKey,
    Basic,
    Bearer,
}

/// A registered upstream interface, keyed by `(platform_path, method)`.
///
/// Invariant: `(platform_path, method)` is unique among enabled records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: i64,
    pub name: String,
    pub platform_path: String,
    pub method: String,
    pub provider_url: String,
    pub status: InterfaceStatus,
    pub auth_type: AuthType,
    /// Opaque, possibly envelope-encrypted. AAD on decrypt is
    /// `{provider_url}|{platform_path}|{method}`.
    #[serde(default)]
    pub auth_config: Option<String>,
    pub timeout_ms: Option<u64>,
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceStatus {
    Enabled,
    Disabled,
}

impl InterfaceRecord {
    pub fn is_enabled(&self) -> bool {
        self.status == InterfaceStatus::Enabled
    }
}
