//! Error types for webpac-link.

use thiserror::Error;

/// Errors surfaced by the gateway client.
#[derive(Debug, Error)]
pub enum WebpacLinkError {
    /// A protected operation was attempted without a live authentication record.
    #[error("Not authenticated: a live login is required")]
    Unauthenticated,

    /// Real-time integration points are missing or invalid. Not retried.
    #[error("Real-time transport misconfigured: {0}")]
    TransportMisconfigured(String),

    /// The push connection failed to open or was lost.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The gateway did not acknowledge a subscribe request.
    #[error("Subscription to '{mapping}' was not acknowledged: {message}")]
    SubscriptionAckFailure { mapping: String, message: String },

    /// The gateway answered an outbound invocation with an error.
    #[error("Invocation '{target}' failed: {message}")]
    InvocationFailed { target: String, message: String },

    /// A persisted authentication record could not be parsed.
    #[error("Malformed credential record: {0}")]
    MalformedCredentialRecord(String),

    /// The token endpoint rejected the exchange for a reason other than bad credentials.
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// The connection was stopped while the request was in flight.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WebpacLinkError>;

impl From<reqwest::Error> for WebpacLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebpacLinkError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            WebpacLinkError::SerializationError(err.to_string())
        } else {
            WebpacLinkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for WebpacLinkError {
    fn from(err: serde_json::Error) -> Self {
        WebpacLinkError::SerializationError(err.to_string())
    }
}

impl WebpacLinkError {
    /// `true` for failures that a later retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WebpacLinkError::NetworkError(_)
                | WebpacLinkError::TimeoutError(_)
                | WebpacLinkError::ConnectionError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_failure_message_names_mapping() {
        let err = WebpacLinkError::SubscriptionAckFailure {
            mapping: "DB1112".to_string(),
            message: "unknown mapping".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Subscription to 'DB1112' was not acknowledged: unknown mapping"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(WebpacLinkError::NetworkError("reset".into()).is_transient());
        assert!(WebpacLinkError::ConnectionError("closed".into()).is_transient());
        assert!(!WebpacLinkError::Unauthenticated.is_transient());
        assert!(!WebpacLinkError::TransportMisconfigured("x".into()).is_transient());
    }

    #[test]
    fn test_serde_error_converts() {
        let err: WebpacLinkError = serde_json::from_str::<bool>("nope").unwrap_err().into();
        assert!(matches!(err, WebpacLinkError::SerializationError(_)));
    }
}
