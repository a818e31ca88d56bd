//! One scan cycle over the futures universe
//!
//! Symbols are analyzed in parallel, at most `max_concurrency` at a time.
//! Results are collected unordered, ranked once every unit has finished and
//! published as a single snapshot replace. Alerts and the auto-scalp engine
//! then run against the new snapshot.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::autoscalp::AutoScalpEngine;
use crate::binance::MarketDataGateway;
use crate::error::GatewayError;
use crate::features::{extract_features, MarketContext, MarketFeatures};
use crate::notification::{NotificationGate, Notifier};
use crate::scoring::{evaluate_breakout, evaluate_core, evaluate_intraday, evaluate_pullback};
use crate::signal::CoinSignal;
use crate::snapshot::SnapshotStore;
use crate::types::{CandleSeries, Symbol, Ticker24h, Timeframe};

/// Timeframe sets per view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeSets {
    pub core: Vec<Timeframe>,
    pub intraday: Vec<Timeframe>,
    pub pullback_setup: Vec<Timeframe>,
    pub pullback_execution: Vec<Timeframe>,
    pub breakout: Vec<Timeframe>,
}

impl Default for TimeframeSets {
    fn default() -> Self {
        Self {
            core: vec![Timeframe::M1, Timeframe::M5],
            intraday: vec![Timeframe::M15, Timeframe::H1],
            pullback_setup: vec![Timeframe::M5, Timeframe::M15],
            pullback_execution: vec![Timeframe::M1, Timeframe::M3],
            breakout: vec![Timeframe::M15, Timeframe::H1],
        }
    }
}

impl TimeframeSets {
    /// Every timeframe any view needs, each once
    pub fn all(&self) -> Vec<Timeframe> {
        self.core
            .iter()
            .chain(&self.intraday)
            .chain(&self.pullback_setup)
            .chain(&self.pullback_execution)
            .chain(&self.breakout)
            .copied()
            .unique()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub scan_interval_secs: u64,
    /// Symbol units analyzed at once
    pub max_concurrency: usize,
    pub kline_limit: usize,
    /// Timeframes with fewer candles are skipped
    pub min_candles: usize,
    pub timeframes: TimeframeSets,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            max_concurrency: 10,
            kline_limit: 100,
            min_candles: 50,
            timeframes: TimeframeSets::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Symbols both trading and present in the ticker snapshot
    pub universe: usize,
    pub analyzed: usize,
    pub alerts_sent: usize,
    pub positions_opened: usize,
    pub positions_closed: usize,
    pub elapsed_ms: u128,
}

impl CycleReport {
    pub fn dropped(&self) -> usize {
        self.universe - self.analyzed
    }
}

struct Alerts {
    gate: Arc<NotificationGate>,
    notifier: Arc<dyn Notifier>,
}

pub struct Screener {
    gateway: Arc<dyn MarketDataGateway>,
    config: Arc<ScreenerConfig>,
    snapshot: Arc<SnapshotStore>,
    alerts: Option<Alerts>,
    engine: Option<Arc<AutoScalpEngine>>,
}

impl Screener {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        config: ScreenerConfig,
        snapshot: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            gateway,
            config: Arc::new(config),
            snapshot,
            alerts: None,
            engine: None,
        }
    }

    pub fn with_notifications(
        mut self,
        gate: Arc<NotificationGate>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        self.alerts = Some(Alerts { gate, notifier });
        self
    }

    pub fn with_engine(mut self, engine: Arc<AutoScalpEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Arc<SnapshotStore> {
        &self.snapshot
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, GatewayError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Scan, rank, publish, then run alerts and the engine. Fails only when
    /// the universe itself cannot be fetched; the previous snapshot stays.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, GatewayError> {
        let started = Instant::now();

        let symbols = self.gateway.get_active_symbols().await?;
        let mut tickers = self.gateway.get_24h_tickers().await?;
        let universe: Vec<(Symbol, Ticker24h)> = symbols
            .into_iter()
            .filter_map(|symbol| tickers.remove(&symbol).map(|ticker| (symbol, ticker)))
            .collect();
        let universe_size = universe.len();
        debug!("Scanning {} symbols", universe_size);

        let coins = self.analyze_all(universe, now).await;
        let analyzed = coins.len();

        let cycle = self.snapshot.publish(coins, now);
        let latest = self.snapshot.latest();

        let mut report = CycleReport {
            cycle,
            universe: universe_size,
            analyzed,
            ..Default::default()
        };

        if let Some(alerts) = &self.alerts {
            report.alerts_sent = alerts
                .gate
                .process(&latest, alerts.notifier.as_ref(), now)
                .await;
        }
        if let Some(engine) = &self.engine {
            let tick = engine.tick_at(&latest, now).await;
            report.positions_opened = tick.opened.len();
            report.positions_closed = tick.closed.len();
        }

        report.elapsed_ms = started.elapsed().as_millis();
        info!(
            "Cycle {} complete: {}/{} symbols analyzed, {} alerts, {} ms",
            report.cycle, report.analyzed, report.universe, report.alerts_sent, report.elapsed_ms
        );
        Ok(report)
    }

    async fn analyze_all(
        &self,
        universe: Vec<(Symbol, Ticker24h)>,
        now: DateTime<Utc>,
    ) -> Vec<CoinSignal> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let results = Arc::new(Mutex::new(Vec::with_capacity(universe.len())));
        let mut tasks = JoinSet::new();

        for (symbol, ticker) in universe {
            let semaphore = Arc::clone(&semaphore);
            let gateway = Arc::clone(&self.gateway);
            let config = Arc::clone(&self.config);
            let results = Arc::clone(&results);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Some(coin) =
                    analyze_symbol(gateway.as_ref(), &config, symbol, ticker, now).await
                {
                    results.lock().push(coin);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Symbol analysis task failed: {}", e);
            }
        }
        let collected = std::mem::take(&mut *results.lock());
        collected
    }
}

/// Analyze one symbol across every configured timeframe. `None` when fewer
/// than two core timeframes could be analyzed.
pub async fn analyze_symbol(
    gateway: &dyn MarketDataGateway,
    config: &ScreenerConfig,
    symbol: Symbol,
    ticker: Ticker24h,
    now: DateTime<Utc>,
) -> Option<CoinSignal> {
    let funding_rate = match gateway.get_funding_rate(&symbol).await {
        Ok(rate) => rate,
        Err(e) => {
            debug!("{}: funding rate unavailable ({}), using 0", symbol, e);
            0.0
        }
    };
    let context = MarketContext {
        ticker,
        funding_rate,
        open_interest_delta: 0.0,
    };

    let tfs = &config.timeframes;
    let mut analyses: BTreeMap<Timeframe, MarketFeatures> = BTreeMap::new();
    for timeframe in tfs.all() {
        let candles = match gateway
            .get_klines(&symbol, timeframe, config.kline_limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("{} {}: failed to fetch klines: {}", symbol, timeframe, e);
                continue;
            }
        };

        let series = CandleSeries::new(candles);
        match extract_features(&series, &context, config.min_candles) {
            Ok(features) => {
                analyses.insert(timeframe, features);
            }
            Err(e) => debug!("{} {}: skipped, {}", symbol, timeframe, e),
        }
    }

    let Some(core) = evaluate_core(&tfs.core, &analyses) else {
        debug!("{}: not enough core timeframes analyzed", symbol);
        return None;
    };

    let intraday = evaluate_intraday(&tfs.intraday, &analyses);
    let pullback = evaluate_pullback(&tfs.pullback_setup, &tfs.pullback_execution, &analyses);
    let breakout = evaluate_breakout(&tfs.breakout, &analyses);

    let mut coin = CoinSignal::from_core(symbol, &ticker, funding_rate, core, analyses, now);
    coin.intraday = intraday;
    coin.pullback = pullback;
    coin.breakout = breakout;
    Some(coin)
}
