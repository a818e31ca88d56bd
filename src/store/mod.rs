//! Persistence seams for auto-scalp positions, broker credentials and the
//! manual trade journal
//!
//! The engine and trade executor depend only on the traits here.
//! Auto-scalp stores must enforce at most one ACTIVE position per symbol.

mod memory;
mod sqlite;

pub use memory::{InMemoryAutoScalpStore, InMemoryCredentialStore, InMemoryTradeJournal};
pub use sqlite::{SqliteAutoScalpStore, SqliteTradeJournal};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::autoscalp::AutoScalpPosition;
use crate::binance::OrderType;
use crate::error::StoreError;
use crate::journal::TradeEntry;

pub trait AutoScalpStore: Send + Sync {
    /// Fails with `DuplicateActive` if the symbol already has an ACTIVE position
    fn create_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError>;

    fn update_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError>;

    fn get_active_entries(&self) -> Result<Vec<AutoScalpPosition>, StoreError>;

    fn get_entry(&self, id: &str) -> Result<AutoScalpPosition, StoreError>;

    /// Closed positions with exit time at or after `since`, newest first
    fn get_history(&self, since: DateTime<Utc>) -> Result<Vec<AutoScalpPosition>, StoreError>;

    fn delete_entry(&self, id: &str) -> Result<(), StoreError>;
}

/// Exchange API keys for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerCredentials {
    pub user_id: String,
    pub api_key: String,
    pub secret_key: String,
    pub testnet: bool,
    pub enabled: bool,
}

/// Per-user real trading parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub user_id: String,
    pub trade_amount_usdt: f64,
    pub leverage: u32,
    pub order_type: OrderType,
    pub max_slippage_pct: f64,
    pub max_daily_loss_usdt: f64,
    pub max_daily_trades: u32,
    /// Master switch for real orders
    pub enable_real_trading: bool,
    pub use_stop_loss: bool,
    pub use_take_profit: bool,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            trade_amount_usdt: 10.0,
            leverage: 5,
            order_type: OrderType::Market,
            max_slippage_pct: 0.5,
            max_daily_loss_usdt: 50.0,
            max_daily_trades: 20,
            enable_real_trading: false,
            use_stop_loss: true,
            use_take_profit: false,
            default_stop_loss_pct: 0.4,
            default_take_profit_pct: 0.6,
        }
    }
}

impl TradingConfig {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

pub trait CredentialStore: Send + Sync {
    fn save_credentials(&self, credentials: &BrokerCredentials) -> Result<(), StoreError>;

    fn get_credentials(&self, user_id: &str) -> Result<BrokerCredentials, StoreError>;

    fn delete_credentials(&self, user_id: &str) -> Result<(), StoreError>;

    fn save_trading_config(&self, config: &TradingConfig) -> Result<(), StoreError>;

    /// Defaults (real trading off) when the user has none saved
    fn get_trading_config(&self, user_id: &str) -> Result<TradingConfig, StoreError>;
}

pub trait TradeJournalStore: Send + Sync {
    /// Fails with `AlreadyExists` if the id is taken
    fn create_trade(&self, entry: &TradeEntry) -> Result<(), StoreError>;

    /// Trades not yet stopped or closed, oldest first
    fn get_open_trades(&self) -> Result<Vec<TradeEntry>, StoreError>;

    fn get_trade(&self, id: &str) -> Result<TradeEntry, StoreError>;

    fn update_trade(&self, entry: &TradeEntry) -> Result<(), StoreError>;

    /// Stopped and closed trades, latest exit first
    fn get_trade_history(&self) -> Result<Vec<TradeEntry>, StoreError>;

    fn delete_trade(&self, id: &str) -> Result<(), StoreError>;
}
