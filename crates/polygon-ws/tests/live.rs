//! Integration tests against the real Polygon endpoint
//!
//! Ignored by default because they need network access and a real key:
//!
//! ```text
//! POLYGON_API_KEY=... cargo test -p polygon-ws --test live -- --ignored
//! ```

use polygon_types::{AggregateBar, DataStatus, EventKind, Market, SubscriptionKey};
use polygon_ws::{ConnectionState, SocketManager};
use std::time::Duration;

fn api_key() -> String {
    std::env::var("POLYGON_API_KEY").expect("set POLYGON_API_KEY to run live tests")
}

#[tokio::test]
#[ignore = "requires network and a Polygon API key"]
async fn handshake_and_subscribe() {
    let manager = SocketManager::new(DataStatus::Delayed, Market::Stocks, api_key());

    let key = SubscriptionKey::new(EventKind::SecondAggregate, "SPY");
    let mut bars = manager
        .events_for_key::<AggregateBar>(key, 16)
        .await
        .expect("handshake and subscribe should succeed");
    assert_eq!(manager.state(), ConnectionState::Connected);

    // Data only flows during market hours, so receiving is best effort.
    if let Ok(Some(bar)) = tokio::time::timeout(Duration::from_secs(30), bars.recv()).await {
        let bar = bar.expect("live bar should decode");
        assert_eq!(bar.symbol, "SPY");
    }

    bars.close().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
#[ignore = "requires network and a Polygon API key"]
async fn bad_key_is_rejected_at_auth() {
    let manager = SocketManager::new(DataStatus::Delayed, Market::Stocks, "not-a-real-key");

    let key = SubscriptionKey::new(EventKind::SecondAggregate, "SPY");
    let result = manager.events_for_key::<AggregateBar>(key, 4).await;
    assert!(result.is_err());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
