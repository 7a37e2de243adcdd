//! Shared types for the Polygon.io market data APIs
//!
//! This crate provides the core type definitions used across the Polygon
//! client crates. It has minimal dependencies and can be used independently.
//!
//! # Key Types
//!
//! - [`SubscriptionKey`] - Case-insensitive stream identifier (e.g. `AM.SPY`)
//! - [`AggregateBar`], [`LiveTrade`] - Decoded real-time events
//! - [`StatusMessage`] - Server acknowledgment records
//! - [`DataStatus`], [`Market`], [`EventKind`] - Feed selection enums
//! - [`PolygonError`] - Error types

pub mod enums;
pub mod error;
pub mod events;
pub mod key;
pub mod status;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
pub use events::*;
pub use key::*;
pub use status::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
