use reqwest::StatusCode;
use thiserror::Error;

/// Failure modes of the presence API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token or user id available; the call was skipped before any
    /// network I/O.
    #[error("missing credentials for presence request")]
    MissingCredentials,

    #[error("presence request timed out")]
    Timeout,

    #[error("presence request failed: {0}")]
    Transport(String),

    #[error("presence endpoint returned {status}")]
    Status { status: StatusCode },

    #[error("invalid presence response body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    /// Whether the per-contact retry loop should try again.
    ///
    /// Missing credentials and client errors (4xx) never heal on retry;
    /// timeouts, transport faults, throttling, and server errors may.
    /// Malformed bodies are treated as transient (a proxy error page is
    /// indistinguishable from a broken backend).
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::MissingCredentials => false,
            ApiError::Timeout => true,
            ApiError::Transport(_) => true,
            ApiError::Status { status } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::InvalidBody(_) => true,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = err.status() {
            ApiError::Status { status }
        } else if err.is_decode() {
            ApiError::InvalidBody(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
