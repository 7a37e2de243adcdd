//! High-level SDK for the Polygon.io real-time market data feeds
//!
//! This crate is the ergonomic entry point: configure a client once, then
//! open typed streams per channel and symbol. Connection management is
//! automatic; the WebSocket opens with the first stream and closes when
//! the last one goes away.
//!
//! # Quick Start
//!
//! ```no_run
//! use polygon_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PolygonClient::new(PolygonConfig::from_env()?)?;
//!
//!     let mut bars = client.stock_aggregates_by_minute("SPY").await?;
//!     let mut trades = client.stock_trades("MSFT").await?;
//!
//!     tokio::select! {
//!         Some(bar) = bars.recv() => println!("bar: {:?}", bar?),
//!         Some(trade) = trades.recv() => println!("trade: {:?}", trade?),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod prelude;

// Re-export main types
pub use client::PolygonClient;
pub use config::PolygonConfig;

// Re-export commonly used types from the lower layers
pub use polygon_types::{
    AggregateBar, DataStatus, EventKind, LiveTrade, Market, PolygonError, StatusMessage,
    SubscriptionKey, Tape,
};
pub use polygon_ws::{ConnectionState, EventStream, SocketManager};
