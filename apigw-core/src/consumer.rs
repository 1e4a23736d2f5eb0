use serde::{Deserialize, Serialize};

/// A third-party API consumer resolved by access key.
///
/// Invariant: `access_key` is unique among consumers. `secret_key` is
/// plaintext once held here — any envelope-encrypted at-rest form is
/// decrypted by the resolver before constructing this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub id: i64,
    /// Free-form tag used only for log enrichment, never for authorization.
    #[serde(default)]
    pub role: String,
    pub access_key: String,
    pub secret_key: String,
}
