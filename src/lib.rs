//! Perpetual Futures Screener
//!
//! Multi-timeframe screener for Binance USDⓈ-M perpetuals: indicator and
//! feature extraction, confluence scoring with auxiliary strategy views, a
//! ranked snapshot published every cycle, de-duplicated alerts and an
//! auto-scalp engine that can mirror its shorts as real orders.

pub mod autoscalp;
pub mod binance;
pub mod common;
pub mod config;
pub mod error;
pub mod execution;
pub mod features;
pub mod indicators;
pub mod journal;
pub mod notification;
pub mod runtime;
pub mod scoring;
pub mod screener;
pub mod signal;
pub mod snapshot;
pub mod store;
pub mod types;

pub use config::Config;
pub use signal::CoinSignal;
pub use types::*;
