//! Error types for the Polygon client

use thiserror::Error;

/// Main error type for Polygon streaming operations
#[derive(Error, Debug)]
pub enum PolygonError {
    // === Connection Errors ===
    /// Failed to establish a WebSocket connection
    #[error("failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Transport-level failure on an established connection
    #[error("websocket transport error: {0}")]
    Transport(String),

    // === Protocol Errors ===
    /// Handshake frame was malformed or carried an unexpected status
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication ack was missing or negative
    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Subscribe/unsubscribe ack was missing or negative
    #[error("subscription rejected for {key}: {reason}")]
    SubscriptionRejected { key: String, reason: String },

    // === Message Errors ===
    /// Failed to parse or decode JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Unrecognized `ev` discriminator during routing
    #[error("unknown event type: {ev}")]
    UnknownEventType { ev: String },

    // === Stream Errors ===
    /// The shared receive loop died; every attached consumer sees this
    #[error("receive loop terminated: {reason}")]
    LoopTerminated { reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PolygonError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a subscription rejection for a key
    pub fn subscription_rejected(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionRejected {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error is fatal to the whole connection rather
    /// than to a single call
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Transport(_)
                | Self::Protocol(_)
                | Self::AuthenticationFailed { .. }
                | Self::LoopTerminated { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_rejection_is_not_connection_fatal() {
        let err = PolygonError::subscription_rejected("AM.SPY", "max_connections");
        assert!(!err.is_connection_fatal());
        assert_eq!(
            err.to_string(),
            "subscription rejected for AM.SPY: max_connections"
        );
    }

    #[test]
    fn handshake_failures_are_fatal() {
        assert!(PolygonError::protocol("bad handshake").is_connection_fatal());
        let err = PolygonError::AuthenticationFailed {
            reason: "auth_failed".into(),
        };
        assert!(err.is_connection_fatal());
    }
}
