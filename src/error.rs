//! Error Types
//!
//! Two layers: [`ApiError`] describes what went wrong on the wire, and
//! [`ChatError`] is the uniform result surface of the engine's mutating
//! operations. `Display` output on both is suitable for showing to the user
//! directly; callers branch on success, not on error kind.

use thiserror::Error;

/// Errors from the HTTP request/response surface
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request could not be performed (offline, DNS, connection reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout and was aborted
    #[error("Request timed out")]
    Timeout,

    /// The server rejected the request; message sourced from the response
    /// body when available
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Response body did not decode into the expected shape
    #[error("Unexpected response from server")]
    Decode(String),

    /// No bearer credential available; short-circuited before any network call
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl ApiError {
    /// Whether this failure is transient (worth a user-initiated retry)
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Uniform error surface of the engine's operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Nothing to send: no text and no attachment
    #[error("Message is empty")]
    EmptyMessage,

    /// The referenced message is not in any local timeline
    #[error("Message not found")]
    UnknownMessage,
}

/// Result alias used throughout the engine
pub type ChatResult<T> = Result<T, ChatError>;
