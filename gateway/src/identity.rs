//! C2 — identity resolver. Extracts the raw API key from the canonical
//! header and hashes it. Raw keys never leave this module: callers only
//! ever see the hex digest.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing_key")]
    MissingKey,
}

/// Reads the raw key out of `x-api-key`. Missing or empty header fails
/// with `missing_key`; raw-key length/format policy is upstream's concern.
pub fn extract(headers: &HeaderMap) -> Result<String, IdentityError> {
    let raw = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if raw.is_empty() {
        return Err(IdentityError::MissingKey);
    }
    Ok(raw.to_string())
}

/// SHA-256 of the UTF-8 bytes of `raw_key`, lowercase hex. Deterministic and total.
pub fn hash(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// `extract` + `hash` in one step.
pub fn validate(headers: &HeaderMap) -> Result<String, IdentityError> {
    extract(headers).map(|raw| hash(&raw))
}
