use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AutoScalpError;

/// Process-wide auto-scalp parameters. Percentages are in percent units
/// (0.4 means 0.4%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoScalpSettings {
    pub enabled: bool,
    pub max_concurrent_trades: usize,
    pub min_entry_score: f64,
    pub stop_loss_pct: f64,
    /// Peak profit needed before the trailing stop is armed
    pub min_profit_pct: f64,
    pub trailing_stop_pct: f64,
    pub max_hold_secs: u64,
}

impl Default for AutoScalpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent_trades: 3,
            min_entry_score: 75.0,
            stop_loss_pct: 0.4,
            min_profit_pct: 0.3,
            trailing_stop_pct: 0.15,
            max_hold_secs: 1800,
        }
    }
}

impl AutoScalpSettings {
    pub fn validate(&self) -> Result<(), AutoScalpError> {
        let positive = [
            ("stop_loss_pct", self.stop_loss_pct),
            ("min_profit_pct", self.min_profit_pct),
            ("trailing_stop_pct", self.trailing_stop_pct),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AutoScalpError::InvalidSettings(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.min_entry_score) {
            return Err(AutoScalpError::InvalidSettings(format!(
                "min_entry_score must be within 0..=100, got {}",
                self.min_entry_score
            )));
        }
        if self.max_concurrent_trades == 0 {
            return Err(AutoScalpError::InvalidSettings(
                "max_concurrent_trades must be >= 1".to_string(),
            ));
        }
        if self.max_hold_secs == 0 {
            return Err(AutoScalpError::InvalidSettings(
                "max_hold_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared settings; last write wins
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<AutoScalpSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: AutoScalpSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn get(&self) -> AutoScalpSettings {
        self.inner.read().clone()
    }

    pub fn update(&self, settings: AutoScalpSettings) -> Result<(), AutoScalpError> {
        settings.validate()?;
        *self.inner.write() = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AutoScalpSettings::default();
        assert!(settings.validate().is_ok());
        assert!(!settings.enabled);
        assert_eq!(settings.max_concurrent_trades, 3);
    }

    #[test]
    fn test_rejects_non_positive_percentages() {
        let settings = AutoScalpSettings {
            trailing_stop_pct: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(AutoScalpError::InvalidSettings(msg)) if msg.contains("trailing_stop_pct")
        ));
    }

    #[test]
    fn test_update_keeps_previous_on_error() {
        let handle = SettingsHandle::default();
        let bad = AutoScalpSettings {
            max_concurrent_trades: 0,
            ..Default::default()
        };
        assert!(handle.update(bad).is_err());
        assert_eq!(handle.get(), AutoScalpSettings::default());

        let good = AutoScalpSettings {
            enabled: true,
            ..Default::default()
        };
        handle.update(good.clone()).unwrap();
        assert_eq!(handle.get(), good);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: AutoScalpSettings =
            serde_json::from_str(r#"{"enabled": true, "stop_loss_pct": 0.5}"#).unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.stop_loss_pct, 0.5);
        assert_eq!(settings.max_hold_secs, 1800);
    }
}
