//! Error types for event delivery operations.
//!
//! Delivery failures never escape the relay: the client folds them into a
//! boolean outcome for the dispatcher and sweeper. The categorized error is
//! kept for logging and for callers that want the detail.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions of a single delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure (refused, reset, DNS).
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Number of seconds before the request timed out
        timeout_seconds: u64,
    },

    /// HTTP response indicated client error (4xx).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// HTTP response indicated server error (5xx).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Response with a status outside the 2xx, 4xx and 5xx ranges.
    #[error("unexpected response: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code
        status_code: u16,
    },

    /// The event payload could not be encoded as a request body.
    #[error("payload serialization failed: {message}")]
    SerializationError {
        /// Serializer error message
        message: String,
    },

    /// Invalid client configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates the error matching a non-success HTTP status.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        match status_code {
            400..=499 => Self::ClientError { status_code, body: body.into() },
            500..=599 => Self::ServerError { status_code, body: body.into() },
            _ => Self::UnexpectedStatus { status_code },
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Returns the HTTP status code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnexpectedStatus { status_code } => Some(*status_code),
            _ => None,
        }
    }
}

/// Category of delivery error for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues and timeouts.
    Network,
    /// HTTP client errors (4xx).
    Client,
    /// HTTP server errors (5xx) and other unexpected statuses.
    Server,
    /// Payload or configuration problems on our side.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } => Self::Client,
            DeliveryError::ServerError { .. } | DeliveryError::UnexpectedStatus { .. } => {
                Self::Server
            },
            DeliveryError::SerializationError { .. } | DeliveryError::ConfigurationError { .. } => {
                Self::Internal
            },
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_variants() {
        assert!(matches!(DeliveryError::from_status(404, ""), DeliveryError::ClientError { .. }));
        assert!(matches!(DeliveryError::from_status(503, ""), DeliveryError::ServerError { .. }));
        assert!(matches!(
            DeliveryError::from_status(302, ""),
            DeliveryError::UnexpectedStatus { status_code: 302 }
        ));
    }

    #[test]
    fn status_code_is_exposed_for_http_errors() {
        assert_eq!(DeliveryError::from_status(500, "boom").status_code(), Some(500));
        assert_eq!(DeliveryError::timeout(30).status_code(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(ErrorCategory::from(&DeliveryError::network("refused")), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DeliveryError::timeout(5)), ErrorCategory::Network);
        assert_eq!(
            ErrorCategory::from(&DeliveryError::from_status(400, "bad request")),
            ErrorCategory::Client
        );
        assert_eq!(
            ErrorCategory::from(&DeliveryError::from_status(502, "")),
            ErrorCategory::Server
        );
        assert_eq!(
            ErrorCategory::from(&DeliveryError::serialization("bad")),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn error_display_format() {
        assert_eq!(DeliveryError::timeout(30).to_string(), "request timeout after 30s");
        assert_eq!(
            DeliveryError::from_status(503, "").to_string(),
            "server error: HTTP 503"
        );
    }
}
