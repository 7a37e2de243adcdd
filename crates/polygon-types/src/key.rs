//! Subscription key type

use crate::enums::EventKind;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Prefix used for internal acknowledgment streams
const STATUS_PREFIX: &str = "status.";

/// Identifies one logical real-time stream
///
/// The wire format is `"{eventPrefix}.{symbol}"`, e.g. `A.SPY` for
/// per-second aggregates on SPY. Keys compare and hash
/// case-insensitively, matching the server's treatment of symbols.
///
/// Keys of the form `status.<key>` are internal: they carry the server's
/// subscribe/unsubscribe acknowledgments for `<key>` and are never
/// subscribed on the wire themselves.
#[derive(Debug, Clone)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Create a key for a data stream
    pub fn new(kind: EventKind, symbol: &str) -> Self {
        Self(format!("{}.{}", kind.as_str(), symbol))
    }

    /// Create the internal acknowledgment key paired with a data key
    pub fn status(of: &str) -> Self {
        Self(format!("{STATUS_PREFIX}{of}"))
    }

    /// Create a key from its raw wire form
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Whether this is an internal acknowledgment key
    pub fn is_status(&self) -> bool {
        self.0.len() >= STATUS_PREFIX.len()
            && self.0[..STATUS_PREFIX.len()].eq_ignore_ascii_case(STATUS_PREFIX)
    }

    /// The key as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for SubscriptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for SubscriptionKey {}

impl Hash for SubscriptionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.as_bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl From<&str> for SubscriptionKey {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}
