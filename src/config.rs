//! Configuration management
//!
//! JSON configuration file with environment variable overrides for API
//! credentials, testnet selection and the database path. Every section
//! falls back to its defaults, so a partial file is enough.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::autoscalp::AutoScalpSettings;
use crate::binance::{ClientConfig, FAPI_BASE_URL};
use crate::notification::NotificationSettings;
use crate::screener::ScreenerConfig;
use crate::store::{BrokerCredentials, TradingConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub screener: ScreenerConfig,
    pub auto_scalp: AutoScalpConfig,
    pub notifications: NotificationSettings,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file) but a missing file means defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = var("BINANCE_API_KEY") {
            self.exchange.api_key = Some(api_key);
        }
        if let Some(api_secret) = var("BINANCE_API_SECRET") {
            self.exchange.api_secret = Some(api_secret);
        }
        if let Some(testnet) = var("BINANCE_TESTNET") {
            self.exchange.testnet = matches!(testnet.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Some(db_path) = var("SCREENER_DB_PATH") {
            self.storage.db_path = Some(db_path);
        }
    }
}

/// Binance REST access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Trade on the futures testnet instead of production
    pub testnet: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Requests per second
    pub rate_limit: usize,
    pub circuit_breaker_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: FAPI_BASE_URL.to_string(),
            testnet: false,
            timeout_secs: 10,
            max_retries: 2,
            rate_limit: 20,
            circuit_breaker_threshold: 5,
            api_key: None,
            api_secret: None,
        }
    }
}

impl ExchangeConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_max_retries(self.max_retries)
            .with_rate_limit(self.rate_limit)
            .with_circuit_breaker_threshold(self.circuit_breaker_threshold)
    }

    /// Operator credentials for `user_id` when both key and secret are set
    pub fn credentials_for(&self, user_id: &str) -> Option<BrokerCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(BrokerCredentials {
                    user_id: user_id.to_string(),
                    api_key: key.clone(),
                    secret_key: secret.clone(),
                    testnet: self.testnet,
                    enabled: true,
                })
            }
            _ => None,
        }
    }
}

/// Auto-scalp runtime parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScalpConfig {
    /// Initial engine settings, adjustable at runtime
    pub settings: AutoScalpSettings,
    pub monitor_interval_secs: u64,
    pub notional_usdt: f64,
    /// Operator whose credentials place real orders
    pub user_id: String,
    pub real_trading: bool,
    pub leverage: u32,
}

impl Default for AutoScalpConfig {
    fn default() -> Self {
        Self {
            settings: AutoScalpSettings::default(),
            monitor_interval_secs: 5,
            notional_usdt: 100.0,
            user_id: "operator".to_string(),
            real_trading: false,
            leverage: 5,
        }
    }
}

impl AutoScalpConfig {
    pub fn trading_config(&self) -> TradingConfig {
        TradingConfig {
            trade_amount_usdt: self.notional_usdt,
            leverage: self.leverage,
            enable_real_trading: self.real_trading,
            default_stop_loss_pct: self.settings.stop_loss_pct,
            ..TradingConfig::for_user(&self.user_id)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for auto-scalp positions; in-memory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "screener": { "scan_interval_secs": 30 },
                "auto_scalp": { "settings": { "enabled": true } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.screener.scan_interval_secs, 30);
        assert_eq!(config.screener.max_concurrency, 10);
        assert!(config.auto_scalp.settings.enabled);
        assert_eq!(config.auto_scalp.settings.max_concurrent_trades, 3);
        assert_eq!(config.auto_scalp.monitor_interval_secs, 5);
        assert_eq!(config.notifications.cooldown_secs, 300);
        assert!(config.storage.db_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_API_SECRET", "secret"),
            ("BINANCE_TESTNET", "true"),
            ("SCREENER_DB_PATH", "/tmp/screener.db"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert!(config.exchange.testnet);
        assert_eq!(config.storage.db_path.as_deref(), Some("/tmp/screener.db"));

        let creds = config.exchange.credentials_for("op").unwrap();
        assert_eq!(creds.api_key, "key");
        assert!(creds.testnet);
        assert!(creds.enabled);
    }

    #[test]
    fn test_no_credentials_without_secret() {
        let config = ExchangeConfig {
            api_key: Some("key".into()),
            ..Default::default()
        };
        assert!(config.credentials_for("op").is_none());
    }

    #[test]
    fn test_trading_config_follows_auto_scalp() {
        let auto = AutoScalpConfig {
            real_trading: true,
            notional_usdt: 50.0,
            ..Default::default()
        };
        let tc = auto.trading_config();
        assert_eq!(tc.user_id, "operator");
        assert!(tc.enable_real_trading);
        assert_eq!(tc.trade_amount_usdt, 50.0);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = Config::load_or_default("does/not/exist.json").unwrap();
        assert_eq!(config.screener, ScreenerConfig::default());
    }
}
