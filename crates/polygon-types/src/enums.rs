//! Feed selection and event discriminator enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which Polygon data cluster to stream from
///
/// Free and starter plans only have access to the delayed cluster;
/// paid plans stream from the live cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataStatus {
    /// Real-time data
    #[default]
    Live,
    /// 15-minute delayed data
    Delayed,
}

impl DataStatus {
    /// WebSocket host for this cluster
    pub fn host(&self) -> &'static str {
        match self {
            Self::Live => "wss://socket.polygon.io",
            Self::Delayed => "wss://delayed.polygon.io",
        }
    }
}

/// Asset class served by a socket connection
///
/// Selects the path suffix on the WebSocket URL. Each market gets its own
/// physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Market {
    /// US equities
    #[default]
    Stocks,
    /// Options contracts
    Options,
    /// Currency pairs
    Forex,
    /// Crypto pairs
    Crypto,
}

impl Market {
    /// URL path segment for this market
    pub fn path(&self) -> &'static str {
        match self {
            Self::Stocks => "stocks",
            Self::Options => "options",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Wire event type discriminator (`ev` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Per-second aggregate bar
    #[serde(rename = "A")]
    SecondAggregate,
    /// Per-minute aggregate bar
    #[serde(rename = "AM")]
    MinuteAggregate,
    /// Individual trade
    #[serde(rename = "T")]
    Trade,
    /// Connection/subscription acknowledgment
    #[serde(rename = "status")]
    Status,
}

impl EventKind {
    /// The discriminator as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecondAggregate => "A",
            Self::MinuteAggregate => "AM",
            Self::Trade => "T",
            Self::Status => "status",
        }
    }

    /// Parse a wire discriminator
    pub fn parse(ev: &str) -> Option<Self> {
        match ev {
            "A" => Some(Self::SecondAggregate),
            "AM" => Some(Self::MinuteAggregate),
            "T" => Some(Self::Trade),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tape recorded a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(from = "u8")]
pub enum Tape {
    /// Not reported
    #[default]
    None,
    /// NYSE
    Nyse,
    /// AMEX
    Amex,
    /// Nasdaq
    Nasdaq,
}

impl From<u8> for Tape {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Nyse,
            2 => Self::Amex,
            3 => Self::Nasdaq,
            _ => Self::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_status_hosts() {
        assert_eq!(DataStatus::Live.host(), "wss://socket.polygon.io");
        assert_eq!(DataStatus::Delayed.host(), "wss://delayed.polygon.io");
    }

    #[test]
    fn event_kind_round_trip() {
        for kind in [
            EventKind::SecondAggregate,
            EventKind::MinuteAggregate,
            EventKind::Trade,
            EventKind::Status,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("Q"), None);
    }

    #[test]
    fn tape_from_wire_value() {
        assert_eq!(Tape::from(1), Tape::Nyse);
        assert_eq!(Tape::from(3), Tape::Nasdaq);
        assert_eq!(Tape::from(17), Tape::None);
    }
}
