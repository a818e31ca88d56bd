//! Per-symbol scan results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::features::MarketFeatures;
use crate::scoring::{
    AuxiliaryView, BreakoutStatus, CoreOutcome, CoreStatus, IntradayStatus, PullbackStatus,
    TimeframeScore,
};
use crate::types::{Symbol, Ticker24h, Timeframe};

/// One symbol's result for one scan cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinSignal {
    pub symbol: Symbol,
    pub price: f64,
    pub pct_change_24h: f64,
    pub quote_volume: f64,
    pub funding_rate: f64,
    /// Combined core confluence score in [0, 100]
    pub score: f64,
    pub confluence_count: usize,
    pub status: Option<CoreStatus>,
    pub primary_timeframe: Timeframe,
    /// Features of the primary timeframe
    pub features: MarketFeatures,
    pub timeframe_scores: Vec<TimeframeScore>,
    pub timeframe_features: BTreeMap<Timeframe, MarketFeatures>,
    pub intraday: Option<AuxiliaryView<IntradayStatus>>,
    pub pullback: Option<AuxiliaryView<PullbackStatus>>,
    pub breakout: Option<AuxiliaryView<BreakoutStatus>>,
    pub updated_at: DateTime<Utc>,
}

impl CoinSignal {
    pub fn from_core(
        symbol: Symbol,
        ticker: &Ticker24h,
        funding_rate: f64,
        core: CoreOutcome,
        timeframe_features: BTreeMap<Timeframe, MarketFeatures>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            price: ticker.price,
            pct_change_24h: ticker.pct_change_24h,
            quote_volume: ticker.quote_volume,
            funding_rate,
            score: core.score,
            confluence_count: core.confluence_count,
            status: core.status,
            primary_timeframe: core.primary_timeframe,
            features: core.features,
            timeframe_scores: core.timeframe_scores,
            timeframe_features,
            intraday: None,
            pullback: None,
            breakout: None,
            updated_at,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.status == Some(CoreStatus::Trigger)
    }

    pub fn breakout_status(&self) -> Option<BreakoutStatus> {
        self.breakout.as_ref().and_then(|view| view.status)
    }
}
