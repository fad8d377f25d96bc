//! Error handling for the retrieval engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the retrieval engine
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Main error type for the retrieval engine
///
/// Every variant maps to a stable machine-readable code via
/// [`RetrievalError::error_code`]. Messages must never contain
/// credentials; callers construct them from status codes and
/// redacted context only.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),
}

impl RetrievalError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RetrievalError::Connection(_)
                | RetrievalError::Timeout(_)
                | RetrievalError::RateLimited(_)
        )
    }

    /// Get the machine-readable error code for envelopes and logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RetrievalError::Config(_) => "config_error",
            RetrievalError::Connection(_) => "connection_error",
            RetrievalError::Timeout(_) => "timeout_error",
            RetrievalError::Auth(_) => "auth_error",
            RetrievalError::NotFound(_) => "not_found",
            RetrievalError::InvalidInput(_) => "invalid_input",
            RetrievalError::RateLimited(_) => "rate_limited",
            RetrievalError::Internal(_) => "internal_error",
            RetrievalError::Ingestion(_) => "ingestion_error",
        }
    }

    /// Convert to the wire-level error envelope
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error_code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Serializable error envelope for the dispatch collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error_code: String,
    pub message: String,
}

impl From<std::io::Error> for RetrievalError {
    fn from(e: std::io::Error) -> Self {
        RetrievalError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(e: serde_json::Error) -> Self {
        RetrievalError::Internal(e.to_string())
    }
}

impl From<sqlx::Error> for RetrievalError {
    fn from(e: sqlx::Error) -> Self {
        RetrievalError::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(e: reqwest::Error) -> Self {
        // Strip the URL so credentials embedded in it never leak into messages
        if e.is_timeout() {
            RetrievalError::Timeout("request timed out".to_string())
        } else if e.is_connect() {
            RetrievalError::Connection(e.without_url().to_string())
        } else {
            RetrievalError::Internal(e.without_url().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_error = RetrievalError::Timeout("embed".to_string());
        assert!(timeout_error.is_retryable());

        let rate_error = RetrievalError::RateLimited("429".to_string());
        assert!(rate_error.is_retryable());

        let config_error = RetrievalError::Config("missing key".to_string());
        assert!(!config_error.is_retryable());

        let auth_error = RetrievalError::Auth("401".to_string());
        assert!(!auth_error.is_retryable());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            RetrievalError::Config("x".to_string()).error_code(),
            "config_error"
        );
        assert_eq!(
            RetrievalError::InvalidInput("x".to_string()).error_code(),
            "invalid_input"
        );
        assert_eq!(
            RetrievalError::Ingestion("x".to_string()).error_code(),
            "ingestion_error"
        );
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = RetrievalError::NotFound("collection missing".to_string()).to_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error_code"], "not_found");
        assert!(json["message"].as_str().unwrap().contains("collection"));
    }
}
