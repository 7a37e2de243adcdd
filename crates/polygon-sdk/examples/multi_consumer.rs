//! Two independent consumers of the same subscription key
//!
//! Both tasks receive every bar in the same order over a single wire
//! subscription; each reads at its own pace.
//!
//! Run with: POLYGON_API_KEY=... cargo run --example multi_consumer

use polygon_sdk::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = PolygonClient::new(PolygonConfig::from_env()?)?;

    let mut fast = client.stock_aggregates_by_second("SPY").await?;
    let mut slow = client.stock_aggregates_by_second("SPY").await?;

    let printer = tokio::spawn(async move {
        while let Some(bar) = fast.recv().await {
            match bar {
                Ok(bar) => println!("[fast] {} close {}", bar.symbol, bar.close),
                Err(err) => {
                    eprintln!("[fast] stream failed: {err}");
                    break;
                }
            }
        }
    });

    let sampler = tokio::spawn(async move {
        while let Some(bar) = slow.recv().await {
            match bar {
                Ok(bar) => println!("[slow] {} range {}..{}", bar.symbol, bar.low, bar.high),
                Err(err) => {
                    eprintln!("[slow] stream failed: {err}");
                    break;
                }
            }
            // A slow reader only delays itself; the fast one keeps up.
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    });

    tokio::time::sleep(Duration::from_secs(30)).await;
    client.shutdown().await;

    let _ = tokio::join!(printer, sampler);
    Ok(())
}
