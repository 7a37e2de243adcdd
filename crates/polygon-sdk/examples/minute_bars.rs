//! Simple example: stream per-minute aggregate bars for one symbol
//!
//! Run with: POLYGON_API_KEY=... cargo run --example minute_bars

use polygon_sdk::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let client = PolygonClient::new(PolygonConfig::from_env()?)?;

    println!("Subscribing to minute bars for SPY...");
    let mut bars = client.stock_aggregates_by_minute("SPY").await?;

    while let Some(bar) = bars.recv().await {
        let bar = bar?;
        println!(
            "{} {}..{}  o={} h={} l={} c={} v={}",
            bar.symbol, bar.start, bar.end, bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    }

    println!("Stream ended.");
    Ok(())
}
