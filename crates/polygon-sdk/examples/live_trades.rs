//! Stream individual trades and print a rolling volume-weighted price
//!
//! Run with: POLYGON_API_KEY=... cargo run --example live_trades

use polygon_sdk::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = PolygonClient::new(PolygonConfig::from_env()?)?;

    println!("Subscribing to trades for MSFT...");
    let mut trades = client.stock_trades("MSFT").await?;

    let mut notional = Decimal::ZERO;
    let mut shares = Decimal::ZERO;

    // Process trades for one minute, then shut down cleanly.
    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\nDeadline reached. Shutting down...");
                break;
            }
            trade = trades.recv() => {
                let Some(trade) = trade else { break };
                let trade = trade?;
                let size = Decimal::from(trade.size);
                notional += trade.price * size;
                shares += size;
                println!(
                    "{} {} x {} on tape {:?} (vwap {})",
                    trade.symbol,
                    trade.price,
                    trade.size,
                    trade.tape,
                    notional / shares,
                );
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
