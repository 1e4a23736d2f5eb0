//! Envelope decrypt oracle for `Consumer.secret_key` / `InterfaceRecord.auth_config`.
//!
//! The admin backend's own encryption-at-rest pipeline is out of scope; this
//! crate only needs `Decrypt(cipher, aad) -> plaintext | error`. Modeled with
//! AES-256-GCM, envelope format `nonce (12 bytes) || ciphertext+tag`, base64
//! encoded with an `enc:v1:` prefix. Anything that isn't in that shape is
//! treated as already-plaintext, so fixtures can hand over raw secrets.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use subtle::ConstantTimeEq;

use crate::error::GatewayError;

const ENC_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Master key for envelope decryption (`security.authcfg.master_key`).
#[derive(Clone)]
pub struct MasterKey(pub [u8; KEY_LEN]);

impl MasterKey {
    /// Parse a base64-encoded 32-byte key from config.
    pub fn from_base64(s: &str) -> Result<Self, GatewayError> {
        let bytes = STANDARD
            .decode(s)
            .map_err(|e| GatewayError::Config(format!("invalid master_key base64: {e}")))?;
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| GatewayError::Config("master_key must decode to 32 bytes".into()))?;
        Ok(MasterKey(arr))
    }
}

/// Decrypt `value` if it is envelope-shaped, otherwise pass it through as
/// plaintext. `aad` binds the ciphertext to its usage context (for
/// `auth_config`: `{provider_url}|{platform_path}|{method}`).
pub fn decrypt(value: &str, aad: &[u8], master_key: Option<&MasterKey>) -> Result<String, GatewayError> {
    let Some(rest) = value.strip_prefix(ENC_PREFIX) else {
        return Ok(value.to_string());
    };

    let key = master_key
        .ok_or_else(|| GatewayError::Internal("envelope payload present but no master key configured".into()))?;

    let decoded = STANDARD
        .decode(rest)
        .map_err(|e| GatewayError::Internal(format!("envelope base64 decode failed: {e}")))?;
    if decoded.len() < NONCE_LEN {
        return Err(GatewayError::Internal("envelope ciphertext too short".into()));
    }
    let (nonce_bytes, ct) = decoded.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| GatewayError::Internal(format!("cipher init failed: {e}")))?;
    let pt = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: ct, aad })
        .map_err(|_| GatewayError::Internal("envelope decrypt failed".into()))?;

    String::from_utf8(pt).map_err(|e| GatewayError::Internal(format!("decrypted payload not utf-8: {e}")))
}

/// Encrypt `plaintext` under `master_key` with the given AAD, producing the
/// `enc:v1:` envelope format. Only used by test fixtures that want to
/// exercise the decrypt path end-to-end.
pub fn encrypt(plaintext: &str, aad: &[u8], master_key: &MasterKey, nonce: &[u8; NONCE_LEN]) -> Result<String, GatewayError> {
    let cipher = Aes256Gcm::new_from_slice(&master_key.0)
        .map_err(|e| GatewayError::Internal(format!("cipher init failed: {e}")))?;
    let ct = cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext.as_bytes(),
                aad,
            },
        )
        .map_err(|e| GatewayError::Internal(format!("encrypt failed: {e}")))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ct);
    Ok(format!("{ENC_PREFIX}{}", STANDARD.encode(out)))
}

/// Constant-time comparison of two hex/ASCII strings (used by the Signer but
/// lives alongside crypto primitives since both rely on `subtle`).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_passthrough() {
        let v = decrypt("sk_test_plain", b"aad", None).unwrap();
        assert_eq!(v, "sk_test_plain");
    }

    #[test]
    fn roundtrip_with_matching_aad() {
        let key = MasterKey([7u8; KEY_LEN]);
        let nonce = [1u8; NONCE_LEN];
        let enc = encrypt("sk_test", b"ctx", &key, &nonce).unwrap();
        assert!(enc.starts_with(ENC_PREFIX));
        let dec = decrypt(&enc, b"ctx", Some(&key)).unwrap();
        assert_eq!(dec, "sk_test");
    }

    #[test]
    fn decrypt_fails_with_wrong_aad() {
        let key = MasterKey([7u8; KEY_LEN]);
        let nonce = [1u8; NONCE_LEN];
        let enc = encrypt("sk_test", b"ctx-a", &key, &nonce).unwrap();
        assert!(decrypt(&enc, b"ctx-b", Some(&key)).is_err());
    }

    #[test]
    fn decrypt_fails_without_master_key() {
        let key = MasterKey([7u8; KEY_LEN]);
        let nonce = [1u8; NONCE_LEN];
        let enc = encrypt("sk_test", b"ctx", &key, &nonce).unwrap();
        assert!(decrypt(&enc, b"ctx", None).is_err());
    }

    #[test]
    fn constant_time_eq_matches_and_rejects() {
        assert!(constant_time_eq("abcd", "abcd"));
        assert!(!constant_time_eq("abcd", "abce"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
