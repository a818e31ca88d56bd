use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::position::{AutoScalpPosition, ExitReason};
use super::settings::{AutoScalpSettings, SettingsHandle};
use crate::error::{AutoScalpError, StoreError, TradingError};
use crate::execution::{ShortEntry, TradeExecutor};
use crate::features::MarketFeatures;
use crate::signal::CoinSignal;
use crate::store::AutoScalpStore;
use crate::types::Symbol;

/// Primary overbought filter on the headline timeframe
pub const ENTRY_RSI: f64 = 75.0;

pub const REVERSAL_SIGNS_REQUIRED: usize = 2;

/// Reversal confirmations present in `f`
pub fn reversal_signs(f: &MarketFeatures) -> usize {
    [
        f.rejection_wick_ratio > 0.5,
        f.is_above_upper_band,
        f.over_ext_ema >= 0.03,
        f.is_breakdown,
        f.funding_rate > 0.0003,
        f.pct_change_24h >= 15.0,
    ]
    .iter()
    .filter(|&&hit| hit)
    .count()
}

/// Entry signal check for one coin. Capacity and per-symbol exclusivity are
/// checked by the engine.
pub fn should_enter(coin: &CoinSignal, settings: &AutoScalpSettings) -> bool {
    let f = &coin.features;
    if f.rsi < ENTRY_RSI || coin.score < settings.min_entry_score || coin.price <= 0.0 {
        return false;
    }

    let signs = reversal_signs(f);
    if signs >= REVERSAL_SIGNS_REQUIRED {
        info!(
            "Auto scalp entry candidate: {} | RSI: {:.1} | Reversal signs: {} | Price: {:.6}",
            coin.symbol, f.rsi, signs, coin.price
        );
        return true;
    }
    false
}

/// Aggregates over closed positions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoScalpStats {
    pub total_trades: usize,
    /// Percent of trades with positive P&L, 2 decimals
    pub win_rate: f64,
    pub total_profit_pct: f64,
    pub avg_duration_secs: i64,
}

impl AutoScalpStats {
    pub fn from_history(history: &[AutoScalpPosition]) -> Self {
        if history.is_empty() {
            return Self::default();
        }

        let wins = history
            .iter()
            .filter(|p| p.pnl_pct.is_some_and(|pct| pct > 0.0))
            .count();
        let total_profit_pct: f64 = history.iter().filter_map(|p| p.pnl_pct).sum();
        let total_duration: i64 = history.iter().map(|p| p.duration_secs).sum();
        let n = history.len();

        Self {
            total_trades: n,
            win_rate: round2(wins as f64 / n as f64 * 100.0),
            total_profit_pct: round2(total_profit_pct),
            avg_duration_secs: total_duration / n as i64,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// What one tick changed
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub opened: Vec<AutoScalpPosition>,
    pub closed: Vec<AutoScalpPosition>,
}

struct LiveTrading {
    executor: Arc<TradeExecutor>,
    user_id: String,
}

pub struct AutoScalpEngine {
    store: Arc<dyn AutoScalpStore>,
    settings: SettingsHandle,
    notional: f64,
    live: Option<LiveTrading>,
    // Serializes whole ticks from the scan and monitor loops, broker calls
    // included, so a position is never opened or closed twice. It guards no
    // data; the store and settings locks are released before any await.
    tick_guard: Mutex<()>,
}

impl AutoScalpEngine {
    pub fn new(store: Arc<dyn AutoScalpStore>, settings: SettingsHandle) -> Self {
        Self {
            store,
            settings,
            notional: 100.0,
            live: None,
            tick_guard: Mutex::new(()),
        }
    }

    /// USDT exposure per trade
    pub fn with_notional(mut self, notional: f64) -> Self {
        self.notional = notional;
        self
    }

    /// Mirror entries and exits as real orders for `user_id`
    pub fn with_executor(
        mut self,
        executor: Arc<TradeExecutor>,
        user_id: impl Into<String>,
    ) -> Self {
        self.live = Some(LiveTrading {
            executor,
            user_id: user_id.into(),
        });
        self
    }

    pub fn has_executor(&self) -> bool {
        self.live.is_some()
    }

    pub fn settings(&self) -> AutoScalpSettings {
        self.settings.get()
    }

    pub fn update_settings(&self, settings: AutoScalpSettings) -> Result<(), AutoScalpError> {
        self.settings.update(settings)?;
        info!("Auto scalp settings updated: {:?}", self.settings.get());
        Ok(())
    }

    pub fn active_positions(&self) -> Result<Vec<AutoScalpPosition>, StoreError> {
        self.store.get_active_entries()
    }

    pub fn history(&self, since: DateTime<Utc>) -> Result<Vec<AutoScalpPosition>, StoreError> {
        self.store.get_history(since)
    }

    pub fn stats(&self, since: DateTime<Utc>) -> Result<AutoScalpStats, StoreError> {
        Ok(AutoScalpStats::from_history(&self.store.get_history(since)?))
    }

    /// Evaluate exits for every ACTIVE position, then look for entries.
    /// `coins` is the ranked snapshot and the price source.
    pub async fn tick_at(&self, coins: &[CoinSignal], now: DateTime<Utc>) -> TickReport {
        let _guard = self.tick_guard.lock().await;
        let settings = self.settings.get();
        let mut report = TickReport::default();

        let active = match self.store.get_active_entries() {
            Ok(active) => active,
            Err(e) => {
                warn!("Auto scalp: failed to load active positions: {}", e);
                return report;
            }
        };

        let prices: HashMap<&Symbol, f64> = coins.iter().map(|c| (&c.symbol, c.price)).collect();
        let mut open_symbols: HashSet<Symbol> = HashSet::new();
        // closed this tick, eligible again from the next one
        let mut exited: HashSet<Symbol> = HashSet::new();

        for mut position in active {
            let Some(&price) = prices.get(&position.symbol) else {
                open_symbols.insert(position.symbol.clone());
                continue;
            };

            if position.needs_attention {
                debug!(
                    "{}: position {} has no protective stop, waiting for operator",
                    position.symbol, position.id
                );
                open_symbols.insert(position.symbol.clone());
                continue;
            }

            let moved = position.track_price(price);
            match position.evaluate_exit(price, now, &settings) {
                Some(reason) => {
                    let symbol = position.symbol.clone();
                    match self.close_position(position, price, reason, now).await {
                        Ok(closed) => {
                            exited.insert(symbol);
                            report.closed.push(closed);
                        }
                        // still short on the exchange
                        Err(_) => {
                            open_symbols.insert(symbol);
                        }
                    }
                }
                None => {
                    if moved {
                        if let Err(e) = self.store.update_entry(&position) {
                            warn!("Auto scalp: failed to update {}: {}", position.id, e);
                        }
                    }
                    open_symbols.insert(position.symbol.clone());
                }
            }
        }

        if !settings.enabled {
            return report;
        }

        for coin in coins {
            if open_symbols.len() >= settings.max_concurrent_trades {
                break;
            }
            if open_symbols.contains(&coin.symbol)
                || exited.contains(&coin.symbol)
                || !should_enter(coin, &settings)
            {
                continue;
            }
            if let Some(position) = self.open_position(coin, &settings, now).await {
                open_symbols.insert(position.symbol.clone());
                report.opened.push(position);
            }
        }

        report
    }

    async fn open_position(
        &self,
        coin: &CoinSignal,
        settings: &AutoScalpSettings,
        now: DateTime<Utc>,
    ) -> Option<AutoScalpPosition> {
        let mut position = AutoScalpPosition::open(
            coin.symbol.clone(),
            coin.price,
            coin.score,
            self.notional,
            settings,
            now,
        );

        if let Some(live) = &self.live {
            let entry = ShortEntry {
                user_id: live.user_id.clone(),
                symbol: coin.symbol.clone(),
                entry_price: coin.price,
                stop_price: position.stop_loss,
                notional_usdt: Some(self.notional),
                leverage: None,
            };
            match live.executor.place_short_with_stop_loss(&entry).await {
                Ok(placed) => {
                    position.entry_price = placed.fill_price;
                    position.best_price = placed.fill_price;
                    position.quantity = Some(placed.quantity);
                    position.entry_order_id = Some(placed.entry_order_id);
                    position.stop_order_id = Some(placed.stop_order_id);
                }
                Err(TradingError::ProtectiveStopFailed {
                    entry_order_id,
                    quantity,
                    ..
                }) => {
                    position.quantity = Some(quantity);
                    position.entry_order_id = Some(entry_order_id);
                    position.needs_attention = true;
                }
                Err(
                    e @ (TradingError::RealTradingDisabled(_)
                    | TradingError::MissingCredentials(_)),
                ) => {
                    debug!("{}: paper entry ({})", coin.symbol, e);
                }
                Err(e) => {
                    warn!("{}: entry order failed, skipping: {}", coin.symbol, e);
                    return None;
                }
            }
        }

        if let Err(e) = self.store.create_entry(&position) {
            if position.entry_order_id.is_some() {
                error!(
                    "{}: exchange position opened but could not be recorded: {}",
                    position.symbol, e
                );
            } else {
                warn!("Error creating auto scalp entry for {}: {}", position.symbol, e);
            }
            return None;
        }

        info!(
            "Auto scalp opened: {} | Score: {:.0} | Entry: ${:.4} | SL: ${:.4}",
            position.symbol, position.entry_score, position.entry_price, position.stop_loss
        );
        Some(position)
    }

    /// Buy back on the exchange when the position is mirrored, then mark it
    /// CLOSED. A failed buy-back leaves the position ACTIVE and flagged: the
    /// short is still open and its stop has already been cancelled.
    async fn close_position(
        &self,
        mut position: AutoScalpPosition,
        price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<AutoScalpPosition, TradingError> {
        if let (Some(live), Some(quantity), Some(_)) =
            (&self.live, position.quantity, position.entry_order_id)
        {
            let closed = live
                .executor
                .close_short(&live.user_id, &position.symbol, quantity, position.stop_order_id)
                .await;
            if let Err(e) = closed {
                error!(
                    "CRITICAL: {}: failed to close exchange position {} ({}): {}. \
                     Position stays ACTIVE without a stop, manual intervention required",
                    position.symbol, position.id, reason, e
                );
                position.needs_attention = true;
                position.stop_order_id = None;
                if let Err(store_err) = self.store.update_entry(&position) {
                    warn!("Error flagging position {}: {}", position.id, store_err);
                }
                return Err(e);
            }
        }

        position.close(price, reason, now);
        match self.store.update_entry(&position) {
            Ok(()) => info!(
                "Auto scalp closed: {} | {} | P/L: {:.2}% | Duration: {}s | Reason: {}",
                position.symbol,
                position.id,
                position.pnl_pct.unwrap_or(0.0),
                position.duration_secs,
                reason
            ),
            Err(e) => warn!("Error closing position {}: {}", position.id, e),
        }
        Ok(position)
    }

    /// Close an ACTIVE position at `price` with reason MANUAL. Also the only
    /// way out for positions flagged `needs_attention`.
    pub async fn force_close(
        &self,
        id: &str,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<AutoScalpPosition, AutoScalpError> {
        let _guard = self.tick_guard.lock().await;
        let position = self.store.get_entry(id)?;
        if !position.is_active() {
            return Err(AutoScalpError::NotActive(id.to_string()));
        }
        let closed = self
            .close_position(position, price, ExitReason::Manual, now)
            .await?;
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAutoScalpStore;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    use crate::scoring::CoreStatus;
    use crate::types::Timeframe;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn coin(symbol: &str, price: f64, rsi: f64, score: f64) -> CoinSignal {
        CoinSignal {
            symbol: Symbol::new(symbol),
            price,
            pct_change_24h: 22.0,
            quote_volume: 5.0e7,
            funding_rate: 0.0,
            score,
            confluence_count: 2,
            status: Some(CoreStatus::Trigger),
            primary_timeframe: Timeframe::M1,
            features: MarketFeatures {
                price,
                rsi,
                pct_change_24h: 22.0,
                rejection_wick_ratio: 0.6,
                ..Default::default()
            },
            timeframe_scores: Vec::new(),
            timeframe_features: BTreeMap::new(),
            intraday: None,
            pullback: None,
            breakout: None,
            updated_at: t0(),
        }
    }

    fn engine(settings: AutoScalpSettings) -> AutoScalpEngine {
        AutoScalpEngine::new(
            Arc::new(InMemoryAutoScalpStore::new()),
            SettingsHandle::new(settings),
        )
    }

    fn enabled() -> AutoScalpSettings {
        AutoScalpSettings {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_reversal_sign_count() {
        let c = coin("AUSDT", 1.0, 80.0, 90.0);
        // wick 0.6 and 24h pump 22%
        assert_eq!(reversal_signs(&c.features), 2);
        assert!(should_enter(&c, &enabled()));

        let mut weak = c.clone();
        weak.features.pct_change_24h = 3.0;
        assert!(!should_enter(&weak, &enabled()));
    }

    #[test]
    fn test_entry_needs_overbought_and_score() {
        let settings = enabled();
        assert!(!should_enter(&coin("AUSDT", 1.0, 74.9, 90.0), &settings));
        assert!(!should_enter(&coin("AUSDT", 1.0, 80.0, 60.0), &settings));
    }

    #[test]
    fn test_stats_from_history() {
        let settings = AutoScalpSettings::default();
        let mut history = Vec::new();
        for (i, (exit, secs)) in [(99.0, 60), (100.2, 120), (99.5, 300)].iter().enumerate() {
            let mut p = AutoScalpPosition::open(
                Symbol::new(format!("S{}USDT", i)),
                100.0,
                80.0,
                100.0,
                &settings,
                t0(),
            );
            p.close(*exit, ExitReason::Manual, t0() + Duration::seconds(*secs));
            history.push(p);
        }

        let stats = AutoScalpStats::from_history(&history);
        assert_eq!(stats.total_trades, 3);
        assert_relative_eq!(stats.win_rate, 66.67);
        assert_relative_eq!(stats.total_profit_pct, 1.3);
        assert_eq!(stats.avg_duration_secs, 160);

        assert_eq!(AutoScalpStats::from_history(&[]), AutoScalpStats::default());
    }

    #[tokio::test]
    async fn test_disabled_engine_does_not_enter() {
        let engine = engine(AutoScalpSettings::default());
        let report = engine
            .tick_at(&[coin("AUSDT", 1.0, 80.0, 90.0)], t0())
            .await;
        assert!(report.opened.is_empty());
    }

    #[tokio::test]
    async fn test_respects_max_concurrent_and_symbol_exclusivity() {
        let engine = engine(AutoScalpSettings {
            max_concurrent_trades: 2,
            ..enabled()
        });
        let coins = vec![
            coin("AUSDT", 1.0, 80.0, 95.0),
            coin("BUSDT", 2.0, 80.0, 90.0),
            coin("CUSDT", 3.0, 80.0, 85.0),
        ];

        let first = engine.tick_at(&coins, t0()).await;
        assert_eq!(first.opened.len(), 2);

        let second = engine.tick_at(&coins, t0() + Duration::seconds(5)).await;
        assert!(second.opened.is_empty());
        assert_eq!(engine.active_positions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exit_then_reentry() {
        let engine = engine(enabled());
        let a = coin("AUSDT", 100.0, 80.0, 90.0);
        engine.tick_at(&[a.clone()], t0()).await;

        let mut spike = a.clone();
        spike.price = 100.5;
        spike.features.rsi = 50.0;
        let report = engine
            .tick_at(&[spike], t0() + Duration::seconds(5))
            .await;
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].exit_reason, Some(ExitReason::SlHit));
        assert!(report.opened.is_empty());

        let report = engine.tick_at(&[a], t0() + Duration::seconds(10)).await;
        assert_eq!(report.opened.len(), 1);
    }

    #[tokio::test]
    async fn test_force_close_tags_manual() {
        let engine = engine(enabled());
        let report = engine
            .tick_at(&[coin("AUSDT", 100.0, 80.0, 90.0)], t0())
            .await;
        let id = report.opened[0].id.clone();

        let closed = engine
            .force_close(&id, 99.0, t0() + Duration::seconds(42))
            .await
            .unwrap();
        assert_eq!(closed.exit_reason, Some(ExitReason::Manual));
        assert_eq!(closed.duration_secs, 42);

        assert!(matches!(
            engine.force_close(&id, 99.0, t0()).await,
            Err(AutoScalpError::NotActive(_))
        ));
        assert_eq!(engine.stats(t0()).unwrap().total_trades, 1);
    }
}
