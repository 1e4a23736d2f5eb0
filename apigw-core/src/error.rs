use thiserror::Error;

/// Unified error type for the gateway pipeline.
///
/// Each variant maps to exactly one of the error kinds in the taxonomy:
/// auth-failed, rate-limited, quota-exhausted, upstream-failed,
/// circuit-open, system-error.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited")]
    RateLimited,

    #[error("quota exhausted or not provisioned")]
    QuotaExhausted,

    #[error("upstream error: {0}")]
    UpstreamFailed(String),

    #[error("service temporarily unavailable, retry later")]
    CircuitOpen { service: String, suggestion: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Map to the HTTP status code the Response Wrapper must emit.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Forbidden(_) => 403,
            GatewayError::RateLimited => 429,
            GatewayError::QuotaExhausted => 429,
            GatewayError::UpstreamFailed(_) => 500,
            GatewayError::CircuitOpen { .. } => 503,
            _ => 500,
        }
    }

    /// Envelope message for this error, as seen by the client.
    pub fn message(&self) -> String {
        match self {
            GatewayError::RateLimited => "rate-limited, retry later".to_string(),
            GatewayError::QuotaExhausted => "quota exhausted or not provisioned".to_string(),
            GatewayError::UpstreamFailed(e) => format!("upstream error: {e}"),
            GatewayError::CircuitOpen { .. } => {
                "service temporarily unavailable, retry later".to_string()
            }
            _ => "internal error".to_string(),
        }
    }
}
