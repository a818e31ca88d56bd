//! Service wiring and the long-running loops
//!
//! The scan loop runs one screener cycle per interval, the first one
//! immediately. The monitor loop re-evaluates open auto-scalp positions
//! against the latest snapshot every few seconds. Both stop on the shared
//! shutdown signal.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::autoscalp::{AutoScalpEngine, SettingsHandle};
use crate::binance::{BinanceConnector, BinanceFuturesClient, MarketDataGateway};
use crate::config::Config;
use crate::execution::TradeExecutor;
use crate::notification::{LogNotifier, NotificationGate, Notifier};
use crate::screener::Screener;
use crate::snapshot::SnapshotStore;
use crate::store::{
    AutoScalpStore, CredentialStore, InMemoryAutoScalpStore, InMemoryCredentialStore,
    SqliteAutoScalpStore,
};

/// Everything `run` needs, built from one [`Config`]
pub struct Services {
    pub snapshot: Arc<SnapshotStore>,
    pub engine: Arc<AutoScalpEngine>,
    pub screener: Arc<Screener>,
}

pub fn build_store(config: &Config) -> Result<Arc<dyn AutoScalpStore>> {
    match &config.storage.db_path {
        Some(path) => {
            let store = SqliteAutoScalpStore::open(path)
                .with_context(|| format!("Failed to open database at {}", path))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("No database configured, auto-scalp positions are kept in memory");
            Ok(Arc::new(InMemoryAutoScalpStore::new()))
        }
    }
}

/// Engine with a real-order executor attached when real trading is enabled
/// and operator credentials are present
pub fn build_engine(config: &Config, store: Arc<dyn AutoScalpStore>) -> Result<AutoScalpEngine> {
    let settings = SettingsHandle::new(config.auto_scalp.settings.clone());
    let engine =
        AutoScalpEngine::new(store, settings).with_notional(config.auto_scalp.notional_usdt);

    if !config.auto_scalp.real_trading {
        info!("Auto scalp in paper mode");
        return Ok(engine);
    }

    let user_id = &config.auto_scalp.user_id;
    let Some(credentials) = config.exchange.credentials_for(user_id) else {
        warn!(
            "Real trading requested but BINANCE_API_KEY/BINANCE_API_SECRET are not set, \
             staying in paper mode"
        );
        return Ok(engine);
    };

    let credential_store = InMemoryCredentialStore::new();
    credential_store
        .save_credentials(&credentials)
        .context("Failed to store operator credentials")?;
    credential_store
        .save_trading_config(&config.auto_scalp.trading_config())
        .context("Failed to store trading config")?;

    let connector = BinanceConnector::new(config.exchange.client_config());
    let executor = TradeExecutor::new(Arc::new(credential_store), Arc::new(connector));

    warn!(
        "REAL TRADING ENABLED for {} ({})",
        user_id,
        if credentials.testnet { "testnet" } else { "production" }
    );
    Ok(engine.with_executor(Arc::new(executor), user_id.clone()))
}

pub fn build_gateway(config: &Config) -> Result<Arc<dyn MarketDataGateway>> {
    let client = BinanceFuturesClient::new(config.exchange.client_config())
        .context("Failed to build market data client")?;
    Ok(Arc::new(client))
}

pub fn build_services(
    config: &Config,
    gateway: Arc<dyn MarketDataGateway>,
    notifier: Arc<dyn Notifier>,
) -> Result<Services> {
    let store = build_store(config)?;
    let engine = Arc::new(build_engine(config, store)?);
    let snapshot = Arc::new(SnapshotStore::new());
    let gate = Arc::new(NotificationGate::new(config.notifications.clone()));

    let screener = Screener::new(gateway, config.screener.clone(), Arc::clone(&snapshot))
        .with_notifications(gate, notifier)
        .with_engine(Arc::clone(&engine));

    Ok(Services {
        snapshot,
        engine,
        screener: Arc::new(screener),
    })
}

/// Shutdown signal shared by both loops
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Flip `shutdown` on Ctrl+C
pub fn spawn_ctrl_c_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown.send(true);
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });
}

pub async fn scan_loop(screener: Arc<Screener>, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(screener.config().scan_interval_secs.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting scan loop ({}s interval)...", period.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                if let Err(e) = screener.run_cycle().await {
                    warn!("Scan cycle failed, keeping previous snapshot: {}", e);
                }
            }
            _ = shutdown.changed() => {
                debug!("Scan loop received shutdown");
                break;
            }
        }
    }
}

pub async fn monitor_loop(
    engine: Arc<AutoScalpEngine>,
    snapshot: Arc<SnapshotStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let coins = snapshot.latest();
                if coins.is_empty() {
                    continue;
                }
                let report = engine.tick_at(&coins, Utc::now()).await;
                if !report.opened.is_empty() || !report.closed.is_empty() {
                    debug!(
                        "Monitor tick: {} opened, {} closed",
                        report.opened.len(),
                        report.closed.len()
                    );
                }
            }
            _ = shutdown.changed() => {
                debug!("Monitor loop received shutdown");
                break;
            }
        }
    }
}

/// Run the screener and the position monitor until Ctrl+C
pub async fn run(config: Config) -> Result<()> {
    let gateway = build_gateway(&config)?;
    let services = build_services(&config, gateway, Arc::new(LogNotifier))?;

    let settings = services.engine.settings();
    info!(
        "Screener: {}s interval, {} concurrent | Auto scalp: {} (max {} trades, SL {}%)",
        config.screener.scan_interval_secs,
        config.screener.max_concurrency,
        if settings.enabled { "enabled" } else { "disabled" },
        settings.max_concurrent_trades,
        settings.stop_loss_pct
    );

    match services.engine.active_positions() {
        Ok(active) if !active.is_empty() => {
            info!("Resuming {} active auto-scalp positions", active.len())
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to load active positions: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    spawn_ctrl_c_handler(shutdown_tx);

    let monitor = tokio::spawn(monitor_loop(
        Arc::clone(&services.engine),
        Arc::clone(&services.snapshot),
        Duration::from_secs(config.auto_scalp.monitor_interval_secs),
        shutdown_rx.clone(),
    ));

    scan_loop(Arc::clone(&services.screener), shutdown_rx).await;

    if let Err(e) = monitor.await {
        error!("Monitor task ended abnormally: {}", e);
    }

    match services.engine.active_positions() {
        Ok(active) if !active.is_empty() => warn!(
            "{} auto-scalp positions remain ACTIVE at shutdown",
            active.len()
        ),
        _ => {}
    }
    info!("Screener stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoscalp::AutoScalpSettings;

    #[test]
    fn test_paper_engine_without_credentials() {
        let mut config = Config::default();
        config.auto_scalp.real_trading = true;
        config.auto_scalp.settings = AutoScalpSettings {
            enabled: true,
            ..Default::default()
        };
        config.exchange.api_key = None;

        let engine = build_engine(&config, Arc::new(InMemoryAutoScalpStore::new())).unwrap();
        assert!(engine.settings().enabled);
        assert!(!engine.has_executor());
    }

    #[tokio::test]
    async fn test_monitor_loop_stops_on_shutdown() {
        let engine = Arc::new(AutoScalpEngine::new(
            Arc::new(InMemoryAutoScalpStore::new()),
            SettingsHandle::new(AutoScalpSettings::default()),
        ));
        let (tx, rx) = shutdown_channel();
        let handle = tokio::spawn(monitor_loop(
            engine,
            Arc::new(SnapshotStore::new()),
            Duration::from_secs(5),
            rx,
        ));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
