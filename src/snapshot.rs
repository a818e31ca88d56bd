//! Ranked snapshot of the latest scan cycle
//!
//! Readers always see one complete cycle: publication swaps an `Arc` under a
//! short write lock and readers clone the `Arc`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::signal::CoinSignal;
use crate::types::Symbol;

#[derive(Debug, Default)]
struct Published {
    coins: Arc<Vec<CoinSignal>>,
    published_at: Option<DateTime<Utc>>,
    cycle: u64,
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<Published>,
}

/// Score-descending order; NaN never reaches here but sorts last if it does
pub fn rank(coins: &mut [CoinSignal]) {
    coins.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot. The list is ranked before it becomes visible.
    pub fn publish(&self, mut coins: Vec<CoinSignal>, at: DateTime<Utc>) -> u64 {
        rank(&mut coins);
        let coins = Arc::new(coins);

        let mut inner = self.inner.write();
        inner.coins = coins;
        inner.published_at = Some(at);
        inner.cycle += 1;
        inner.cycle
    }

    /// Latest ranked list
    pub fn latest(&self) -> Arc<Vec<CoinSignal>> {
        Arc::clone(&self.inner.read().coins)
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().published_at
    }

    /// Number of completed publications
    pub fn cycle(&self) -> u64 {
        self.inner.read().cycle
    }

    pub fn get(&self, symbol: &Symbol) -> Option<CoinSignal> {
        self.latest().iter().find(|c| &c.symbol == symbol).cloned()
    }

    pub fn top(&self, n: usize) -> Vec<CoinSignal> {
        self.latest().iter().take(n).cloned().collect()
    }
}
