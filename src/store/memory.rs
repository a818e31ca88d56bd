use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{
    AutoScalpStore, BrokerCredentials, CredentialStore, TradeJournalStore, TradingConfig,
};
use crate::autoscalp::AutoScalpPosition;
use crate::error::StoreError;
use crate::journal::TradeEntry;

/// Positions keyed by id
#[derive(Debug, Default)]
pub struct InMemoryAutoScalpStore {
    entries: RwLock<HashMap<String, AutoScalpPosition>>,
}

impl InMemoryAutoScalpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AutoScalpStore for InMemoryAutoScalpStore {
    fn create_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        let duplicate = entries
            .values()
            .any(|p| p.is_active() && p.symbol == position.symbol);
        if position.is_active() && duplicate {
            return Err(StoreError::DuplicateActive(position.symbol.to_string()));
        }
        entries.insert(position.id.clone(), position.clone());
        Ok(())
    }

    fn update_entry(&self, position: &AutoScalpPosition) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(&position.id) {
            Some(existing) => {
                *existing = position.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(position.id.clone())),
        }
    }

    fn get_active_entries(&self) -> Result<Vec<AutoScalpPosition>, StoreError> {
        let mut active: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|p| p.entry_time);
        Ok(active)
    }

    fn get_entry(&self, id: &str) -> Result<AutoScalpPosition, StoreError> {
        self.entries
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn get_history(&self, since: DateTime<Utc>) -> Result<Vec<AutoScalpPosition>, StoreError> {
        let mut closed: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|p| !p.is_active() && p.exit_time.is_some_and(|t| t >= since))
            .cloned()
            .collect();
        closed.sort_by(|a, b| b.exit_time.cmp(&a.exit_time));
        Ok(closed)
    }

    fn delete_entry(&self, id: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, BrokerCredentials>>,
    configs: RwLock<HashMap<String, TradingConfig>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_credentials(&self, credentials: &BrokerCredentials) -> Result<(), StoreError> {
        self.credentials
            .write()
            .insert(credentials.user_id.clone(), credentials.clone());
        Ok(())
    }

    fn get_credentials(&self, user_id: &str) -> Result<BrokerCredentials, StoreError> {
        self.credentials
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }

    fn delete_credentials(&self, user_id: &str) -> Result<(), StoreError> {
        self.credentials
            .write()
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }

    fn save_trading_config(&self, config: &TradingConfig) -> Result<(), StoreError> {
        self.configs
            .write()
            .insert(config.user_id.clone(), config.clone());
        Ok(())
    }

    fn get_trading_config(&self, user_id: &str) -> Result<TradingConfig, StoreError> {
        Ok(self
            .configs
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| TradingConfig::for_user(user_id)))
    }
}

/// Journal entries keyed by id
#[derive(Debug, Default)]
pub struct InMemoryTradeJournal {
    trades: RwLock<HashMap<String, TradeEntry>>,
}

impl InMemoryTradeJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeJournalStore for InMemoryTradeJournal {
    fn create_trade(&self, entry: &TradeEntry) -> Result<(), StoreError> {
        let mut trades = self.trades.write();
        if trades.contains_key(&entry.id) {
            return Err(StoreError::AlreadyExists(entry.id.clone()));
        }
        trades.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn get_open_trades(&self) -> Result<Vec<TradeEntry>, StoreError> {
        let mut open: Vec<_> = self
            .trades
            .read()
            .values()
            .filter(|t| t.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.entry_time);
        Ok(open)
    }

    fn get_trade(&self, id: &str) -> Result<TradeEntry, StoreError> {
        self.trades
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update_trade(&self, entry: &TradeEntry) -> Result<(), StoreError> {
        match self.trades.write().get_mut(&entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(entry.id.clone())),
        }
    }

    fn get_trade_history(&self) -> Result<Vec<TradeEntry>, StoreError> {
        let mut history: Vec<_> = self
            .trades
            .read()
            .values()
            .filter(|t| !t.is_open())
            .cloned()
            .collect();
        history.sort_by(|a, b| b.exit_time.cmp(&a.exit_time));
        Ok(history)
    }

    fn delete_trade(&self, id: &str) -> Result<(), StoreError> {
        self.trades
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoscalp::{AutoScalpSettings, ExitReason};
    use crate::journal::{TradeStatus, TradeUpdate};
    use crate::scoring::Direction;
    use crate::types::Symbol;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn open(symbol: &str, at: DateTime<Utc>) -> AutoScalpPosition {
        AutoScalpPosition::open(
            Symbol::new(symbol),
            100.0,
            80.0,
            100.0,
            &AutoScalpSettings::default(),
            at,
        )
    }

    #[test]
    fn test_one_active_position_per_symbol() {
        let store = InMemoryAutoScalpStore::new();
        store.create_entry(&open("WIFUSDT", t0())).unwrap();

        let err = store
            .create_entry(&open("WIFUSDT", t0() + Duration::seconds(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateActive(s) if s == "WIFUSDT"));

        store.create_entry(&open("BONKUSDT", t0())).unwrap();
        assert_eq!(store.get_active_entries().unwrap().len(), 2);
    }

    #[test]
    fn test_symbol_reopens_after_close() {
        let store = InMemoryAutoScalpStore::new();
        let mut first = open("WIFUSDT", t0());
        store.create_entry(&first).unwrap();

        first.close(99.0, ExitReason::Manual, t0() + Duration::seconds(30));
        store.update_entry(&first).unwrap();

        store
            .create_entry(&open("WIFUSDT", t0() + Duration::seconds(60)))
            .unwrap();
        assert_eq!(store.get_active_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_history_window() {
        let store = InMemoryAutoScalpStore::new();
        let mut old = open("AUSDT", t0());
        let mut recent = open("BUSDT", t0());
        store.create_entry(&old).unwrap();
        store.create_entry(&recent).unwrap();

        old.close(99.0, ExitReason::MaxTime, t0() + Duration::hours(1));
        recent.close(101.0, ExitReason::SlHit, t0() + Duration::hours(5));
        store.update_entry(&old).unwrap();
        store.update_entry(&recent).unwrap();

        let history = store.get_history(t0() + Duration::hours(2)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].symbol.as_str(), "BUSDT");
    }

    #[test]
    fn test_update_and_delete_missing_entry() {
        let store = InMemoryAutoScalpStore::new();
        let pos = open("AUSDT", t0());
        assert!(matches!(
            store.update_entry(&pos),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_entry("nope"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_trading_config_defaults_when_unset() {
        let store = InMemoryCredentialStore::new();
        let config = store.get_trading_config("op").unwrap();
        assert_eq!(config.user_id, "op");
        assert!(!config.enable_real_trading);
        assert_eq!(config.leverage, 5);

        assert!(matches!(
            store.get_credentials("op"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_journal_lifecycle() {
        let journal = InMemoryTradeJournal::new();
        let mut trade = TradeEntry::new(
            Symbol::new("WIFUSDT"),
            Direction::Short,
            2.5,
            2.6,
            &[2.4, 2.3, 2.2],
            "",
            t0(),
        );
        journal.create_trade(&trade).unwrap();
        assert!(matches!(
            journal.create_trade(&trade),
            Err(StoreError::AlreadyExists(_))
        ));

        trade.apply(
            TradeUpdate {
                status: Some(TradeStatus::Tp2Hit),
                ..Default::default()
            },
            t0() + Duration::minutes(10),
        );
        journal.update_trade(&trade).unwrap();
        assert_eq!(journal.get_open_trades().unwrap().len(), 1);
        assert!(journal.get_trade_history().unwrap().is_empty());

        trade.apply(
            TradeUpdate {
                status: Some(TradeStatus::Closed),
                exit_price: Some(2.3),
                ..Default::default()
            },
            t0() + Duration::minutes(20),
        );
        journal.update_trade(&trade).unwrap();
        assert!(journal.get_open_trades().unwrap().is_empty());
        let history = journal.get_trade_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TradeStatus::Closed);

        journal.delete_trade(&trade.id).unwrap();
        assert!(matches!(
            journal.get_trade(&trade.id),
            Err(StoreError::NotFound(_))
        ));
    }
}
