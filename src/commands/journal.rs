//! Manual trade journal backed by the SQLite database

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;

use perp_screener::journal::{TradeEntry, TradeStatus, TradeUpdate};
use perp_screener::scoring::Direction;
use perp_screener::store::{SqliteTradeJournal, TradeJournalStore};
use perp_screener::{Config, Symbol};

#[derive(Subcommand, Debug)]
pub enum JournalAction {
    /// Record a new trade
    Add {
        /// Symbol, e.g. WIFUSDT
        symbol: String,

        /// Short trade (long by default)
        #[arg(long)]
        short: bool,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,

        /// Up to three take-profit levels, comma separated
        #[arg(long, value_delimiter = ',', num_args = 0..=3)]
        tp: Vec<f64>,

        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Mark a take-profit hit, stop out or close a trade
    Update {
        id: String,

        /// active, tp1_hit, tp2_hit, tp3_hit, stopped or closed
        #[arg(long)]
        status: Option<TradeStatus>,

        #[arg(long)]
        exit: Option<f64>,

        /// Override the derived P/L
        #[arg(long)]
        pnl: Option<f64>,
    },

    /// List open trades, or closed ones with --history
    List {
        #[arg(long)]
        history: bool,
    },

    /// Remove a trade
    Delete { id: String },
}

pub fn run(config_path: String, action: JournalAction) -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let db_path = config
        .storage
        .db_path
        .context("No database configured (set storage.db_path or SCREENER_DB_PATH)")?;
    let journal = SqliteTradeJournal::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    match action {
        JournalAction::Add {
            symbol,
            short,
            entry,
            stop,
            tp,
            reason,
        } => {
            let direction = if short { Direction::Short } else { Direction::Long };
            let trade = TradeEntry::new(
                Symbol::new(symbol.to_uppercase()),
                direction,
                entry,
                stop,
                &tp,
                reason,
                Utc::now(),
            );
            journal.create_trade(&trade).context("Failed to record trade")?;
            println!("Recorded {} {} @ {} ({})", trade.direction, trade.symbol, entry, trade.id);
        }
        JournalAction::Update {
            id,
            status,
            exit,
            pnl,
        } => {
            let mut trade = journal
                .get_trade(&id)
                .with_context(|| format!("Trade {} not found", id))?;
            trade.apply(
                TradeUpdate {
                    status,
                    exit_price: exit,
                    profit_loss: pnl,
                    ..Default::default()
                },
                Utc::now(),
            );
            journal.update_trade(&trade).context("Failed to update trade")?;
            print_trades(std::slice::from_ref(&trade));
        }
        JournalAction::List { history } => {
            let trades = if history {
                journal.get_trade_history()
            } else {
                journal.get_open_trades()
            }
            .context("Failed to load trades")?;
            print_trades(&trades);
        }
        JournalAction::Delete { id } => {
            journal
                .delete_trade(&id)
                .with_context(|| format!("Failed to delete trade {}", id))?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

fn print_trades(trades: &[TradeEntry]) {
    println!("\n{}", "=".repeat(100));
    println!(
        "{:<34} {:<12} {:<5} {:>10} {:>10} {:>10} {:<8} {:>9}",
        "ID", "SYMBOL", "SIDE", "ENTRY", "STOP", "EXIT", "STATUS", "P/L"
    );
    println!("{}", "-".repeat(100));
    for trade in trades {
        println!(
            "{:<34} {:<12} {:<5} {:>10.6} {:>10.6} {:>10} {:<8} {:>9}",
            trade.id,
            trade.symbol.as_str(),
            trade.direction.to_string(),
            trade.entry_price,
            trade.stop_loss,
            trade
                .exit_price
                .map(|p| format!("{:.6}", p))
                .unwrap_or_else(|| "-".to_string()),
            trade.status.as_str(),
            trade
                .profit_loss
                .map(|p| format!("{:.6}", p))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!("{}\n", "=".repeat(100));
}
