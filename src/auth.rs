use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::errors::AppError;

/// Validate the admin key from the X-Api-Key header.
///
/// Both sides are hashed first so the comparison runs over equal-length
/// digests regardless of the input lengths.
pub fn validate_admin_key(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AppError> {
    // No key configured: routes are open (warned about at startup)
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Api-Key header".to_string()))?;

    if !constant_time_compare(&digest(provided), &digest(expected)) {
        tracing::warn!("Invalid admin API key received");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}

fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
