//! Error types for Usercast

use thiserror::Error;

/// Result type alias for Usercast operations
pub type Result<T> = std::result::Result<T, UsercastError>;

/// Main error type for Usercast
#[derive(Error, Debug)]
pub enum UsercastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Relay closed: {0}")]
    RelayClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UsercastError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            UsercastError::Http(e) => e.is_connect() || e.is_timeout(),
            UsercastError::WebSocket(_) | UsercastError::RelayClosed(_) => true,
            UsercastError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status used when the error surfaces through the proxy
    pub fn status_code(&self) -> u16 {
        match self {
            UsercastError::InvalidInput(_) => 422,
            UsercastError::MalformedEvent(_) | UsercastError::MalformedFrame(_) => 400,
            UsercastError::Upstream { status, .. } => *status,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_passthrough() {
        let err = UsercastError::Upstream {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.status_code(), 503);
        assert!(err.is_retryable());

        let err = UsercastError::Upstream {
            status: 422,
            body: "{}".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_input_errors_are_not_retryable() {
        let err = UsercastError::InvalidInput("email".to_string());
        assert_eq!(err.status_code(), 422);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Invalid input: email");
    }
}
