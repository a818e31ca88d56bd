//! Alert de-duplication and dispatch
//!
//! Each cycle the gate walks the fresh snapshot, picks symbols that reached
//! an alertable state and sends at most one alert per (symbol, kind) per
//! cooldown window. A cooldown starts only once delivery succeeded, so a
//! failed send is retried on the next cycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::scoring::CoreStatus;
use crate::signal::CoinSignal;
use crate::types::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Trigger,
    Setup,
    Breakout,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Trigger => "TRIGGER",
            AlertKind::Setup => "SETUP",
            AlertKind::Breakout => "BREAKOUT",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// symbol, score, price, status, kind
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn for_coin(coin: &CoinSignal, kind: AlertKind) -> Self {
        let base = coin.symbol.base_asset();
        let (title, score, count, status) = match kind {
            AlertKind::Trigger => (
                format!("{} TRIGGER - Entry Ready!", base),
                coin.score,
                coin.confluence_count,
                CoreStatus::Trigger.to_string(),
            ),
            AlertKind::Setup => (
                format!("{} SETUP - Preparing", base),
                coin.score,
                coin.confluence_count,
                CoreStatus::Setup.to_string(),
            ),
            AlertKind::Breakout => {
                let view = coin.breakout.as_ref();
                let status = coin
                    .breakout_status()
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let direction = coin
                    .breakout_status()
                    .map(|s| s.direction().to_string())
                    .unwrap_or_default();
                (
                    format!("{} BREAKOUT {} - Momentum!", base, direction),
                    view.map(|v| v.score).unwrap_or(0.0),
                    view.map(|v| v.confluence_count).unwrap_or(0),
                    status,
                )
            }
        };

        let body = format!(
            "Score: {:.0} | {}TF | Price: ${:.5} | Change: {:.2}%",
            score, count, coin.price, coin.pct_change_24h
        );

        let data = BTreeMap::from([
            ("symbol".to_string(), coin.symbol.to_string()),
            ("score".to_string(), format!("{:.2}", score)),
            ("price".to_string(), format!("{:.5}", coin.price)),
            ("status".to_string(), status),
            ("kind".to_string(), kind.as_str().to_string()),
        ]);

        Self { title, body, data }
    }
}

/// Delivery transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes alerts to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!("ALERT {} | {}", notification.title, notification.body);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub cooldown_secs: u64,
    /// SETUP alerts are opt-in
    pub notify_setup: bool,
    pub notify_breakout: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 300,
            notify_setup: false,
            notify_breakout: true,
        }
    }
}

impl NotificationSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }
}

type CooldownKey = (Symbol, AlertKind);

/// Last successful alert time per (symbol, kind)
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last_sent: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_ready(&self, symbol: &Symbol, kind: AlertKind, now: DateTime<Utc>) -> bool {
        match self.last_sent.lock().get(&(symbol.clone(), kind)) {
            Some(last) => now - *last >= self.window,
            None => true,
        }
    }

    pub fn mark(&self, symbol: &Symbol, kind: AlertKind, now: DateTime<Utc>) {
        self.last_sent.lock().insert((symbol.clone(), kind), now);
    }

    /// Drop entries older than twice the window. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.window * 2;
        let mut last_sent = self.last_sent.lock();
        let before = last_sent.len();
        last_sent.retain(|_, at| now - *at <= horizon);
        before - last_sent.len()
    }

    pub fn len(&self) -> usize {
        self.last_sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Picks alertable coins from a snapshot and sends them through a [`Notifier`]
#[derive(Debug)]
pub struct NotificationGate {
    settings: NotificationSettings,
    cooldowns: CooldownGate,
}

impl NotificationGate {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            cooldowns: CooldownGate::new(settings.cooldown()),
            settings,
        }
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.cooldowns
    }

    /// Alert kinds `coin` qualifies for under the current settings
    pub fn alert_kinds(&self, coin: &CoinSignal) -> Vec<AlertKind> {
        let mut kinds = Vec::new();
        match coin.status {
            Some(CoreStatus::Trigger) => kinds.push(AlertKind::Trigger),
            Some(CoreStatus::Setup) if self.settings.notify_setup => kinds.push(AlertKind::Setup),
            _ => {}
        }
        if self.settings.notify_breakout
            && coin.breakout_status().is_some_and(|s| s.is_breakout())
        {
            kinds.push(AlertKind::Breakout);
        }
        kinds
    }

    /// Send due alerts for `coins`, then prune stale cooldowns. Returns the
    /// number of alerts delivered.
    pub async fn process(
        &self,
        coins: &[CoinSignal],
        notifier: &dyn Notifier,
        now: DateTime<Utc>,
    ) -> usize {
        if !self.settings.enabled {
            return 0;
        }

        let mut sent = 0;
        for coin in coins {
            for kind in self.alert_kinds(coin) {
                if !self.cooldowns.is_ready(&coin.symbol, kind, now) {
                    debug!("{} {} alert suppressed by cooldown", coin.symbol, kind);
                    continue;
                }

                let notification = Notification::for_coin(coin, kind);
                match notifier.send(&notification).await {
                    Ok(()) => {
                        self.cooldowns.mark(&coin.symbol, kind, now);
                        sent += 1;
                    }
                    Err(e) => warn!("Error sending {} alert for {}: {}", kind, coin.symbol, e),
                }
            }
        }

        let pruned = self.cooldowns.prune(now);
        if pruned > 0 {
            debug!("Pruned {} stale cooldown entries", pruned);
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_cooldown_window() {
        let gate = CooldownGate::new(Duration::minutes(5));
        let sym = Symbol::new("DOGEUSDT");

        assert!(gate.is_ready(&sym, AlertKind::Trigger, t0()));
        gate.mark(&sym, AlertKind::Trigger, t0());

        assert!(!gate.is_ready(&sym, AlertKind::Trigger, t0() + Duration::minutes(4)));
        assert!(gate.is_ready(&sym, AlertKind::Breakout, t0() + Duration::minutes(4)));
        assert!(gate.is_ready(&sym, AlertKind::Trigger, t0() + Duration::minutes(5)));
    }

    #[test]
    fn test_prune_is_idempotent() {
        let gate = CooldownGate::new(Duration::minutes(5));
        gate.mark(&Symbol::new("AUSDT"), AlertKind::Trigger, t0());
        gate.mark(
            &Symbol::new("BUSDT"),
            AlertKind::Trigger,
            t0() + Duration::minutes(8),
        );

        let now = t0() + Duration::minutes(11);
        assert_eq!(gate.prune(now), 1);
        assert_eq!(gate.len(), 1);
        assert_eq!(gate.prune(now), 0);
        assert_eq!(gate.len(), 1);
    }
}
