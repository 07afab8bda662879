//! Exchange request signing.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `data` under `secret`.
pub fn sign(data: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Config(format!("invalid signing secret: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a presented secret against the expected one.
///
/// Each side keys an HMAC over a fixed message; the tags meet in `verify_slice`.
pub fn secrets_match(given: &str, expected: &str) -> bool {
    const CHALLENGE: &[u8] = b"arena-secret-check";
    let (Ok(mut presented), Ok(mut reference)) = (
        HmacSha256::new_from_slice(given.as_bytes()),
        HmacSha256::new_from_slice(expected.as_bytes()),
    ) else {
        return false;
    };
    presented.update(CHALLENGE);
    reference.update(CHALLENGE);
    presented.verify_slice(&reference.finalize().into_bytes()).is_ok()
}

/// Url-encoded query string of `params` with `timestamp` appended.
///
/// Keys follow the JSON object order; scalar values are written bare and
/// anything nested as its JSON text. `null` entries are dropped.
pub fn query_string(params: &Value, timestamp: i64) -> Result<String> {
    let mut pairs: Vec<(String, String)> = match params {
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, value)| scalar(value).map(|v| (key.clone(), v)))
            .collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(AppError::BadRequest(format!(
                "params must be an object, got {}",
                other
            )))
        }
    };
    pairs.push(("timestamp".to_string(), timestamp.to_string()));

    serde_urlencoded::to_string(&pairs)
        .map_err(|e| AppError::BadRequest(format!("cannot encode params: {}", e)))
}

/// Signed query: `query&signature=<hex>`.
pub fn signed_query(params: &Value, timestamp: i64, secret: &str) -> Result<String> {
    let query = query_string(params, timestamp)?;
    let signature = sign(&query, secret)?;
    Ok(format!("{}&signature={}", query, signature))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
