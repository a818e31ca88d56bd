//! One scan cycle, printed to stdout

use anyhow::{Context, Result};
use std::sync::Arc;

use perp_screener::screener::Screener;
use perp_screener::snapshot::SnapshotStore;
use perp_screener::{runtime, CoinSignal, Config};

pub fn run(config_path: String, top: usize, json: bool) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async {
        let gateway = runtime::build_gateway(&config)?;
        let snapshot = Arc::new(SnapshotStore::new());
        let screener = Screener::new(gateway, config.screener.clone(), Arc::clone(&snapshot));

        let report = screener.run_cycle().await.context("Scan failed")?;
        let coins = snapshot.top(top);

        if json {
            println!("{}", serde_json::to_string_pretty(&coins)?);
        } else {
            print_table(&coins, report.analyzed, report.universe);
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn print_table(coins: &[CoinSignal], analyzed: usize, universe: usize) {
    println!("\n{}", "=".repeat(96));
    println!("TOP {} OF {} ANALYZED ({} IN UNIVERSE)", coins.len(), analyzed, universe);
    println!("{}", "=".repeat(96));
    println!(
        "{:<4} {:<14} {:>7} {:>4} {:<8} {:>14} {:>9} {:>7} {:<10} {:<16}",
        "#", "Symbol", "Score", "TF", "Status", "Price", "24h %", "RSI", "Intraday", "Breakout"
    );
    println!("{}", "-".repeat(96));

    for (i, coin) in coins.iter().enumerate() {
        let status = coin.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        let intraday = coin
            .intraday
            .as_ref()
            .and_then(|v| v.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        let breakout = coin
            .breakout_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<4} {:<14} {:>7.1} {:>4} {:<8} {:>14.6} {:>8.2}% {:>7.1} {:<10} {:<16}",
            i + 1,
            coin.symbol,
            coin.score,
            coin.confluence_count,
            status,
            coin.price,
            coin.pct_change_24h,
            coin.features.rsi,
            intraday,
            breakout
        );
    }
    println!("{}\n", "=".repeat(96));
}
