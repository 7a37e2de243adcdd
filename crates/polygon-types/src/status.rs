//! Server acknowledgment records

use serde::Deserialize;

/// A `status` event from the server
///
/// The server acknowledges connection, authentication, and
/// subscribe/unsubscribe commands with these records. Command acks are
/// correlated back to their key by the `message` text
/// (`"(un)subscribed to: <key>"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    /// Always `status`
    #[serde(rename = "ev")]
    pub event_type: String,
    /// Outcome: `connected`, `auth_success`, `success`, ...
    pub status: String,
    /// Human-readable detail
    pub message: String,
}

impl StatusMessage {
    /// Whether this ack reports success, compared case-insensitively
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}
