//! High-level Polygon client

use crate::config::PolygonConfig;
use polygon_types::{AggregateBar, EventKind, LiveTrade, Market, PolygonError, SubscriptionKey};
use polygon_ws::{ConnectionState, Connector, EventStream, SocketManager};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// High-level client for the Polygon.io stocks feed
///
/// Wraps a [`SocketManager`] with typed entry points per channel. No
/// connection is opened until the first stream is requested, and the
/// connection closes again once every stream has been dropped or closed.
///
/// # Example
///
/// ```no_run
/// use polygon_sdk::{PolygonClient, PolygonConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = PolygonClient::new(PolygonConfig::from_env()?)?;
///
///     let mut bars = client.stock_aggregates_by_minute("SPY").await?;
///     while let Some(bar) = bars.recv().await {
///         let bar = bar?;
///         println!("{} closed at {}", bar.symbol, bar.close);
///     }
///
///     Ok(())
/// }
/// ```
pub struct PolygonClient {
    config: PolygonConfig,
    stocks: SocketManager,
}

impl PolygonClient {
    /// Create a client from a validated configuration
    pub fn new(config: PolygonConfig) -> Result<Self, PolygonError> {
        config.validate()?;
        let stocks = SocketManager::new(config.data_status(), Market::Stocks, config.api_key());
        Ok(Self { config, stocks })
    }

    /// Create a client with a custom transport connector
    pub fn with_connector(
        config: PolygonConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, PolygonError> {
        config.validate()?;
        let stocks = SocketManager::with_connector(
            config.data_status(),
            Market::Stocks,
            config.api_key(),
            connector,
        );
        Ok(Self { config, stocks })
    }

    /// Stream per-second aggregate bars for a symbol
    pub async fn stock_aggregates_by_second(
        &self,
        symbol: &str,
    ) -> Result<EventStream<AggregateBar>, PolygonError> {
        self.stream(EventKind::SecondAggregate, symbol).await
    }

    /// Stream per-minute aggregate bars for a symbol
    pub async fn stock_aggregates_by_minute(
        &self,
        symbol: &str,
    ) -> Result<EventStream<AggregateBar>, PolygonError> {
        self.stream(EventKind::MinuteAggregate, symbol).await
    }

    /// Stream individual trades for a symbol
    pub async fn stock_trades(
        &self,
        symbol: &str,
    ) -> Result<EventStream<LiveTrade>, PolygonError> {
        self.stream(EventKind::Trade, symbol).await
    }

    /// Current connection state of the stocks feed
    pub fn state(&self) -> ConnectionState {
        self.stocks.state()
    }

    /// Close the connection and end every open stream
    pub async fn shutdown(&self) {
        self.stocks.shutdown().await;
    }

    async fn stream<T>(
        &self,
        kind: EventKind,
        symbol: &str,
    ) -> Result<EventStream<T>, PolygonError>
    where
        T: DeserializeOwned,
    {
        let key = SubscriptionKey::new(kind, symbol);
        debug!(key = %key, "opening stream");
        self.stocks
            .events_for_key(key, self.config.buffer_capacity())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polygon_ws::{MockConnector, MockServer};
    use rust_decimal_macros::dec;

    fn client(server: &Arc<MockServer>) -> PolygonClient {
        PolygonClient::with_connector(
            PolygonConfig::new("test-key"),
            Arc::new(MockConnector::new(server)),
        )
        .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        assert!(matches!(
            PolygonClient::new(PolygonConfig::new("")),
            Err(PolygonError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn minute_bars_decode_end_to_end() {
        let server = MockServer::new();
        let client = client(&server);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let mut bars = client.stock_aggregates_by_minute("SPY").await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(
            server.count_sent(r#"{"action":"subscribe","params":"AM.SPY"}"#),
            1
        );

        server.push_frame(
            r#"[{"ev":"AM","sym":"SPY","v":4110,"av":9470157,"a":438.0,"vw":438.12,"o":438.1,"h":438.2,"l":438.05,"c":438.15,"z":60,"s":1610144640000,"e":1610144700000}]"#,
        );
        let bar = bars.recv().await.unwrap().unwrap();
        assert_eq!(bar.symbol, "SPY");
        assert_eq!(bar.close, dec!(438.15));

        bars.close().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn trades_and_bars_share_one_connection() {
        let server = MockServer::new();
        let client = client(&server);

        let mut bars = client.stock_aggregates_by_second("SPY").await.unwrap();
        let mut trades = client.stock_trades("MSFT").await.unwrap();
        assert_eq!(server.connect_count(), 1);

        server.push_frame(
            r#"[{"ev":"T","sym":"MSFT","x":4,"i":"12345","z":3,"p":114.125,"s":100,"t":1536036818784,"q":3681328}]"#,
        );
        let trade = trades.recv().await.unwrap().unwrap();
        assert_eq!(trade.price, dec!(114.125));

        bars.close().await;
        trades.close().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let server = MockServer::new();
        let client = client(&server);

        let mut bars = client.stock_aggregates_by_minute("SPY").await.unwrap();
        client.shutdown().await;
        assert!(bars.recv().await.is_none());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
