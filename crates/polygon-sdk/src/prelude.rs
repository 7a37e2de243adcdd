//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use polygon_sdk::prelude::*;
//! ```

// Client
pub use crate::client::PolygonClient;
pub use crate::config::PolygonConfig;

// Types from polygon-types
pub use polygon_types::{
    AggregateBar, DataStatus, EventKind, LiveTrade, Market, PolygonError, StatusMessage,
    SubscriptionKey, Tape,
};

// WebSocket types
pub use polygon_ws::{ConnectionState, EventStream, SocketManager};

// Decimal for prices
pub use polygon_types::Decimal;
