//! Manual trade journal
//!
//! Operator-entered trades with a stop and up to three take-profit levels.
//! An entry stays open through partial take-profits and leaves the open set
//! once it is stopped out or closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::scoring::Direction;
use crate::types::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Active,
    Tp1Hit,
    Tp2Hit,
    Tp3Hit,
    Stopped,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Active => "active",
            TradeStatus::Tp1Hit => "tp1_hit",
            TradeStatus::Tp2Hit => "tp2_hit",
            TradeStatus::Tp3Hit => "tp3_hit",
            TradeStatus::Stopped => "stopped",
            TradeStatus::Closed => "closed",
        }
    }

    /// Stopped and closed trades are history
    pub fn is_final(&self) -> bool {
        matches!(self, TradeStatus::Stopped | TradeStatus::Closed)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TradeStatus::Active),
            "tp1_hit" => Ok(TradeStatus::Tp1Hit),
            "tp2_hit" => Ok(TradeStatus::Tp2Hit),
            "tp3_hit" => Ok(TradeStatus::Tp3Hit),
            "stopped" => Ok(TradeStatus::Stopped),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(format!("unknown trade status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub id: String,
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    pub entry_time: DateTime<Utc>,
    pub status: TradeStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    /// Per-unit price difference in the trade's favor
    pub profit_loss: Option<f64>,
    pub entry_reason: String,
}

/// Partial update; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeUpdate {
    pub status: Option<TradeStatus>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit_loss: Option<f64>,
    pub entry_reason: Option<String>,
}

impl TradeEntry {
    /// Missing take-profit levels are stored as 0.0
    pub fn new(
        symbol: Symbol,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        take_profits: &[f64],
        entry_reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        let tp = |i: usize| take_profits.get(i).copied().unwrap_or(0.0);
        Self {
            id: format!("trade-{}-{}", symbol, nanos),
            symbol,
            direction,
            entry_price,
            stop_loss,
            take_profit_1: tp(0),
            take_profit_2: tp(1),
            take_profit_3: tp(2),
            entry_time: now,
            status: TradeStatus::Active,
            exit_price: None,
            exit_time: None,
            profit_loss: None,
            entry_reason: entry_reason.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_final()
    }

    /// Price difference from entry to `exit`, positive when the trade made money
    pub fn price_move(&self, exit: f64) -> f64 {
        match self.direction {
            Direction::Long => exit - self.entry_price,
            Direction::Short => self.entry_price - exit,
        }
    }

    /// Merge `update`. An exit price without an exit time is stamped `now`.
    /// P&L is derived from the exit price when a final trade carries none.
    pub fn apply(&mut self, update: TradeUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(exit_price) = update.exit_price {
            self.exit_price = Some(exit_price);
            self.exit_time = Some(update.exit_time.unwrap_or(now));
        }
        if let Some(reason) = update.entry_reason {
            self.entry_reason = reason;
        }

        if !self.status.is_final() {
            return;
        }
        if let Some(exit_price) = self.exit_price {
            self.profit_loss = Some(
                update
                    .profit_loss
                    .unwrap_or_else(|| self.price_move(exit_price)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn short_trade() -> TradeEntry {
        TradeEntry::new(
            Symbol::new("WIFUSDT"),
            Direction::Short,
            2.50,
            2.60,
            &[2.40, 2.30],
            "rejection at range high",
            t0(),
        )
    }

    #[test]
    fn test_new_trade_is_active() {
        let trade = short_trade();
        assert_eq!(trade.status, TradeStatus::Active);
        assert!(trade.is_open());
        assert_eq!(trade.take_profit_2, 2.30);
        assert_eq!(trade.take_profit_3, 0.0);
    }

    #[test]
    fn test_take_profit_hit_stays_open() {
        let mut trade = short_trade();
        trade.apply(
            TradeUpdate {
                status: Some(TradeStatus::Tp1Hit),
                ..Default::default()
            },
            t0() + Duration::minutes(5),
        );
        assert!(trade.is_open());
        assert!(trade.profit_loss.is_none());
    }

    #[test]
    fn test_close_derives_pnl_by_direction() {
        let mut short = short_trade();
        let closed_at = t0() + Duration::minutes(30);
        short.apply(
            TradeUpdate {
                status: Some(TradeStatus::Closed),
                exit_price: Some(2.35),
                ..Default::default()
            },
            closed_at,
        );
        assert!(!short.is_open());
        assert_eq!(short.exit_time, Some(closed_at));
        assert_relative_eq!(short.profit_loss.unwrap(), 0.15, epsilon = 1e-9);

        let mut long = TradeEntry::new(
            Symbol::new("SOLUSDT"),
            Direction::Long,
            100.0,
            97.0,
            &[105.0],
            "",
            t0(),
        );
        long.apply(
            TradeUpdate {
                status: Some(TradeStatus::Stopped),
                exit_price: Some(97.0),
                ..Default::default()
            },
            closed_at,
        );
        assert_relative_eq!(long.profit_loss.unwrap(), -3.0);
    }

    #[test]
    fn test_explicit_pnl_wins() {
        let mut trade = short_trade();
        trade.apply(
            TradeUpdate {
                status: Some(TradeStatus::Closed),
                exit_price: Some(2.35),
                profit_loss: Some(12.5),
                ..Default::default()
            },
            t0(),
        );
        assert_eq!(trade.profit_loss, Some(12.5));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TradeStatus::Active,
            TradeStatus::Tp1Hit,
            TradeStatus::Tp3Hit,
            TradeStatus::Stopped,
        ] {
            assert_eq!(status.as_str().parse::<TradeStatus>(), Ok(status));
        }
        assert!("open".parse::<TradeStatus>().is_err());
    }
}
