//! Streaming WebSocket client for the Polygon.io real-time feeds
//!
//! This crate owns a single WebSocket connection per market and multiplexes
//! many logical subscriptions over it. Each subscription key (e.g. `AM.SPY`)
//! is fanned out to any number of independent consumers, each pulling from
//! its own cursor.
//!
//! # Example
//!
//! ```no_run
//! use polygon_types::{AggregateBar, DataStatus, EventKind, Market, SubscriptionKey};
//! use polygon_ws::SocketManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SocketManager::new(DataStatus::Delayed, Market::Stocks, "my-api-key");
//!
//!     let key = SubscriptionKey::new(EventKind::MinuteAggregate, "SPY");
//!     let mut bars = manager.events_for_key::<AggregateBar>(key, 4).await?;
//!
//!     while let Some(bar) = bars.recv().await {
//!         println!("{:?}", bar?);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod broadcast;
pub mod codec;
pub mod socket;
pub mod transport;

// Re-export main types
pub use codec::Command;
pub use socket::{ConnectionState, EventStream, SocketManager};
pub use transport::{Connector, FrameSink, FrameStream, TransportError, WsConnector};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::mock::{MockConnector, MockServer};
