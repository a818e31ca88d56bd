//! Auto-scalp statistics from the SQLite store

use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use perp_screener::autoscalp::AutoScalpStats;
use perp_screener::store::{AutoScalpStore, SqliteAutoScalpStore};
use perp_screener::Config;

pub fn run(config_path: String, hours: i64) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let db_path = config
        .storage
        .db_path
        .context("No database configured (set storage.db_path or SCREENER_DB_PATH)")?;

    let store = SqliteAutoScalpStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    let since = Utc::now() - Duration::hours(hours.max(1));
    let history = store.get_history(since).context("Failed to load history")?;
    let active = store.get_active_entries().context("Failed to load active positions")?;
    let stats = AutoScalpStats::from_history(&history);

    println!("\n{}", "=".repeat(60));
    println!("AUTO SCALP STATS (last {}h)", hours.max(1));
    println!("{}", "=".repeat(60));
    println!("Total Trades:       {}", stats.total_trades);
    println!("Win Rate:           {:.2}%", stats.win_rate);
    println!("Total P/L:          {:.2}%", stats.total_profit_pct);
    println!("Avg Duration:       {}s", stats.avg_duration_secs);
    println!("Active Positions:   {}", active.len());
    println!("{}", "-".repeat(60));

    for position in history.iter().take(20) {
        println!(
            "{:<14} {:>10.6} -> {:>10.6} {:>7.2}% {:<15} {}",
            position.symbol,
            position.entry_price,
            position.exit_price.unwrap_or_default(),
            position.pnl_pct.unwrap_or_default(),
            position
                .exit_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            position
                .exit_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default()
        );
    }
    for position in active.iter().filter(|p| p.needs_attention) {
        println!(
            "ATTENTION: {} ({}) has no protective stop on the exchange",
            position.symbol, position.id
        );
    }
    println!("{}\n", "=".repeat(60));
    Ok(())
}
