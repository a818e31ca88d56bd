//! Short scalp position lifecycle
//!
//! All P&L uses the short convention: profit is `(entry - price) / entry`,
//! the stop sits above entry and the best price is the lowest seen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::settings::AutoScalpSettings;
use crate::types::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(PositionStatus::Active),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {}", other)),
        }
    }
}

/// Why a position was closed, in evaluation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    SlHit,
    MaxTime,
    TrailingStop,
    EmergencyExit,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::SlHit => "SL_HIT",
            ExitReason::MaxTime => "MAX_TIME",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::EmergencyExit => "EMERGENCY_EXIT",
            ExitReason::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SL_HIT" => Ok(ExitReason::SlHit),
            "MAX_TIME" => Ok(ExitReason::MaxTime),
            "TRAILING_STOP" => Ok(ExitReason::TrailingStop),
            "EMERGENCY_EXIT" => Ok(ExitReason::EmergencyExit),
            "MANUAL" => Ok(ExitReason::Manual),
            other => Err(format!("unknown exit reason: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoScalpPosition {
    pub id: String,
    pub symbol: Symbol,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    /// Most favorable (lowest) price since entry
    pub best_price: f64,
    pub trailing_stop_pct: f64,
    pub entry_score: f64,
    /// USDT exposure used for absolute P&L
    pub notional: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub duration_secs: i64,
    pub quantity: Option<f64>,
    pub entry_order_id: Option<i64>,
    pub stop_order_id: Option<i64>,
    /// Set when the exchange entry filled but no protective stop exists
    pub needs_attention: bool,
}

impl AutoScalpPosition {
    pub fn open(
        symbol: Symbol,
        entry_price: f64,
        entry_score: f64,
        notional: f64,
        settings: &AutoScalpSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1000);
        Self {
            id: format!("{}-{}", symbol, nanos),
            stop_loss: stop_price(entry_price, settings.stop_loss_pct),
            symbol,
            entry_price,
            entry_time: now,
            best_price: entry_price,
            trailing_stop_pct: settings.trailing_stop_pct,
            entry_score,
            notional,
            status: PositionStatus::Active,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            pnl: None,
            pnl_pct: None,
            duration_secs: 0,
            quantity: None,
            entry_order_id: None,
            stop_order_id: None,
            needs_attention: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Unrealized profit in percent at `price`
    pub fn profit_pct(&self, price: f64) -> f64 {
        short_profit_pct(self.entry_price, price)
    }

    /// Profit at the best price seen so far
    pub fn peak_profit_pct(&self) -> f64 {
        short_profit_pct(self.entry_price, self.best_price)
    }

    /// Returns true when the best price moved
    pub fn track_price(&mut self, price: f64) -> bool {
        if price < self.best_price {
            self.best_price = price;
            true
        } else {
            false
        }
    }

    /// First matching exit condition at `price`, checked in priority order.
    /// Call after [`track_price`](Self::track_price) for the same price.
    pub fn evaluate_exit(
        &self,
        price: f64,
        now: DateTime<Utc>,
        settings: &AutoScalpSettings,
    ) -> Option<ExitReason> {
        if price >= self.stop_loss {
            return Some(ExitReason::SlHit);
        }

        let held = (now - self.entry_time).num_seconds();
        if held >= settings.max_hold_secs as i64 {
            return Some(ExitReason::MaxTime);
        }

        let profit = self.profit_pct(price);
        let peak = self.peak_profit_pct();
        if peak >= settings.min_profit_pct && peak - profit >= self.trailing_stop_pct {
            return Some(ExitReason::TrailingStop);
        }

        if profit < -settings.stop_loss_pct {
            return Some(ExitReason::EmergencyExit);
        }

        None
    }

    /// Move to CLOSED and fill in the exit fields
    pub fn close(&mut self, exit_price: f64, reason: ExitReason, now: DateTime<Utc>) {
        let pnl_pct = self.profit_pct(exit_price);
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_time = Some(now);
        self.exit_reason = Some(reason);
        self.pnl_pct = Some(pnl_pct);
        self.pnl = Some(self.notional * pnl_pct / 100.0);
        self.duration_secs = (now - self.entry_time).num_seconds().max(0);
    }
}

pub fn stop_price(entry_price: f64, stop_loss_pct: f64) -> f64 {
    entry_price * (1.0 + stop_loss_pct / 100.0)
}

fn short_profit_pct(entry: f64, price: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    (entry - price) / entry * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn position(entry: f64) -> (AutoScalpPosition, AutoScalpSettings) {
        let settings = AutoScalpSettings::default();
        let pos =
            AutoScalpPosition::open(Symbol::new("PEPEUSDT"), entry, 80.0, 100.0, &settings, t0());
        (pos, settings)
    }

    fn step(
        pos: &mut AutoScalpPosition,
        settings: &AutoScalpSettings,
        price: f64,
        secs: i64,
    ) -> Option<ExitReason> {
        pos.track_price(price);
        pos.evaluate_exit(price, t0() + Duration::seconds(secs), settings)
    }

    #[test]
    fn test_open_sets_stop_above_entry() {
        let (pos, _) = position(100.0);
        assert_relative_eq!(pos.stop_loss, 100.4, epsilon = 1e-9);
        assert_eq!(pos.best_price, 100.0);
        assert!(pos.is_active());
    }

    #[test]
    fn test_trailing_stop_after_retrace() {
        let (mut pos, settings) = position(100.0);

        assert_eq!(step(&mut pos, &settings, 99.5, 10), None);
        assert_eq!(pos.best_price, 99.5);
        assert_relative_eq!(pos.peak_profit_pct(), 0.5, epsilon = 1e-9);

        assert_eq!(
            step(&mut pos, &settings, 99.75, 20),
            Some(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_trailing_not_armed_below_min_profit() {
        let (mut pos, settings) = position(100.0);
        assert_eq!(step(&mut pos, &settings, 99.8, 10), None);
        // peak 0.2% never armed the trail
        assert_eq!(step(&mut pos, &settings, 99.99, 20), None);
    }

    #[test]
    fn test_stop_loss_has_priority_over_max_time() {
        let (mut pos, settings) = position(100.0);
        assert_eq!(
            step(&mut pos, &settings, 100.5, 4000),
            Some(ExitReason::SlHit)
        );
    }

    #[test]
    fn test_max_time() {
        let (mut pos, settings) = position(100.0);
        assert_eq!(
            step(&mut pos, &settings, 99.9, settings.max_hold_secs as i64),
            Some(ExitReason::MaxTime)
        );
    }

    #[test]
    fn test_emergency_exit_without_stop_breach() {
        let (mut pos, mut settings) = position(100.0);
        // stop price was fixed at entry; a later, tighter setting trips the loss check
        settings.stop_loss_pct = 0.2;
        assert_eq!(
            step(&mut pos, &settings, 100.3, 10),
            Some(ExitReason::EmergencyExit)
        );
    }

    #[test]
    fn test_close_fills_exit_fields() {
        let (mut pos, _) = position(100.0);
        pos.close(99.0, ExitReason::Manual, t0() + Duration::seconds(90));

        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.exit_price, Some(99.0));
        assert_eq!(pos.exit_reason, Some(ExitReason::Manual));
        assert_relative_eq!(pos.pnl_pct.unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(pos.pnl.unwrap(), 1.0, epsilon = 1e-9);
        assert_eq!(pos.duration_secs, 90);
    }

    #[test]
    fn test_reason_strings_round_trip() {
        for reason in [
            ExitReason::SlHit,
            ExitReason::MaxTime,
            ExitReason::TrailingStop,
            ExitReason::EmergencyExit,
            ExitReason::Manual,
        ] {
            assert_eq!(reason.as_str().parse::<ExitReason>(), Ok(reason));
        }
        assert_eq!(
            serde_json::to_string(&ExitReason::TrailingStop).unwrap(),
            "\"TRAILING_STOP\""
        );
    }
}
