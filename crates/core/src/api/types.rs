//! Types for backend API calls.

use serde_json::Value;
use thiserror::Error;

/// Header carrying the admission credential on seat calls.
pub const ACCESS_KEY_HEADER: &str = "X-Access-Key";

/// Errors that can occur during API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    /// The backend answered with `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A reservation call was refused because the access key expired.
    /// The stored key has already been removed.
    #[error("Reservation access expired: {message}")]
    AccessExpired {
        resource_id: Option<String>,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::ConnectionFailed(_) | ApiError::Timeout => true,
            ApiError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::ConnectionFailed(e.to_string())
        }
    }
}

/// Unwrap the `{success, message, data}` envelope.
///
/// Bodies without a `success` field are returned unchanged. A successful
/// envelope yields its `data`, or the whole object when there is none.
pub fn unwrap_envelope(body: Value) -> Result<Value, ApiError> {
    let Value::Object(mut object) = body else {
        return Ok(body);
    };

    let Some(success) = object.get("success") else {
        return Ok(Value::Object(object));
    };

    if success.as_bool().unwrap_or(false) {
        match object.remove("data") {
            Some(data) => Ok(data),
            None => Ok(Value::Object(object)),
        }
    } else {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown error")
            .to_string();
        Err(ApiError::Rejected(message))
    }
}

/// Resource id of a seat call that must carry the access key.
pub fn secured_resource_id(path: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r"^/seats/concerts/(\d+)").ok()?;
    re.captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Concert id mentioned anywhere in a path (`concerts/<id>`).
pub fn concert_id_in_path(path: &str) -> Option<String> {
    let re = regex_lite::Regex::new(r"concerts/(\d+)").ok()?;
    re.captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Error message from an error response body.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("API call failed: {}", status))
}
