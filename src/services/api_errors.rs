//! HTTP API error classification
//!
//! Turns Hermes and ASI:One responses into structured errors so the retry
//! layer can tell transient failures from permanent ones.

use serde::Deserialize;
use thiserror::Error;

/// Structured API error types
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 429 or a "rate limit" message
    #[error("Rate limited by upstream API")]
    RateLimited,
    /// 401/403, bad or missing API key
    #[error("API authentication failed")]
    Unauthorized,
    #[error("Resource not found: {0}")]
    NotFound(String),
    /// 5xx or any other unexpected status
    #[error("API error {status}: {body}")]
    Server { status: u16, body: String },
    /// Timeout, DNS, connection reset
    #[error("Network error: {0}")]
    Network(String),
    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// Well-formed response with nothing in it
    #[error("Empty response")]
    Empty,
}

/// Common error envelope shapes (`{"error": ..}`, `{"message": ..}`, `{"detail": ..}`)
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl ErrorEnvelope {
    fn into_message(self) -> Option<String> {
        let from_error = self.error.map(|e| match e {
            serde_json::Value::String(s) => s,
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| serde_json::Value::Object(map).to_string()),
            other => other.to_string(),
        });
        from_error.or(self.message).or(self.detail)
    }
}

impl ApiError {
    /// Classify a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        let error_msg = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(ErrorEnvelope::into_message)
            .unwrap_or_else(|| body.to_string());

        let msg_lower = error_msg.to_lowercase();

        if status == 429 || msg_lower.contains("rate limit") || msg_lower.contains("too many requests") {
            return ApiError::RateLimited;
        }

        if status == 401
            || status == 403
            || msg_lower.contains("unauthorized")
            || msg_lower.contains("invalid api key")
        {
            return ApiError::Unauthorized;
        }

        if status == 404 {
            return ApiError::NotFound(error_msg);
        }

        ApiError::Server {
            status,
            body: error_msg,
        }
    }

    /// Classify a transport-level reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Connection failed".to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// Whether this error is worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::RateLimited | ApiError::Network(_) | ApiError::Empty => true,
            ApiError::Server { status, .. } => *status >= 500,
            ApiError::Unauthorized | ApiError::NotFound(_) | ApiError::Decode(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited() {
        let err = ApiError::from_response(429, "");
        assert!(err.is_retryable());
        assert!(matches!(err, ApiError::RateLimited));

        let err = ApiError::from_response(400, r#"{"message":"Rate limit exceeded"}"#);
        assert!(matches!(err, ApiError::RateLimited));
    }

    #[test]
    fn test_auth_failed() {
        let err = ApiError::from_response(401, r#"{"detail":"Invalid API key"}"#);
        assert!(!err.is_retryable());
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn test_nested_error_object() {
        let err = ApiError::from_response(400, r#"{"error":{"message":"model not found"}}"#);
        match err {
            ApiError::Server { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_errors_retry_client_errors_do_not() {
        assert!(ApiError::from_response(503, "Service Unavailable").is_retryable());
        assert!(!ApiError::from_response(400, "bad feed id").is_retryable());
        assert!(!ApiError::from_response(404, "").is_retryable());
        assert!(ApiError::Empty.is_retryable());
        assert!(!ApiError::Decode("eof".into()).is_retryable());
    }
}
