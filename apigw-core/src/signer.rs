//! Canonical-string request signing (HMAC-SHA256), matching the
//! SigV4-shaped contract in the inbound HTTP surface.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::crypto::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Build the canonical signing string: uppercase method, then the four
/// remaining fields newline-joined. Any absent field is the empty string.
/// `path` excludes the query string.
pub fn canonical(method: &str, path: &str, content_sha256: &str, timestamp: &str, nonce: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        path,
        content_sha256,
        timestamp,
        nonce
    )
}

/// HMAC-SHA256 over `data` with `key`, hex-encoded lowercase.
pub fn hmac_sha256_hex(data: &str, key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts key of any length");
    mac.update(data.as_bytes());
    hex_lower(&mac.finalize().into_bytes())
}

/// SHA-256 digest of `data`, hex-encoded lowercase. Used for the request
/// body content digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_lower(&hasher.finalize())
}

/// Constant-time comparison of a provided signature against the expected one.
pub fn verify(provided_hex: &str, expected_hex: &str) -> bool {
    constant_time_eq(provided_hex, expected_hex)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to String never fails");
    }
    s
}
