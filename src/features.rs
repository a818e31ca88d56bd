//! Feature extraction
//!
//! Turns one candle series plus ticker/funding context into a
//! [`MarketFeatures`] snapshot for a single (symbol, timeframe).

use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::indicators::{self, MomentumSignals};
use crate::types::{CandleSeries, Ticker24h};

pub const DEFAULT_MIN_CANDLES: usize = 50;

const EMA_FAST: usize = 20;
const EMA_SLOW: usize = 50;
const RSI_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;
const BB_PERIOD: usize = 20;
const BB_STD: f64 = 2.0;
const PIVOT_LEFT: usize = 5;
const PIVOT_RIGHT: usize = 2;
const BREAKDOWN_ATR_FACTOR: f64 = 0.1;
const RETEST_ATR_FACTOR: f64 = 0.2;
const VOLUME_LOOKBACK: usize = 20;
const STRUCTURE_LOOKBACK: usize = 15;
const HIGHER_HIGH_LOOKBACK: usize = 10;
const EXTREME_LOOKBACK: usize = 20;

/// Per-symbol context shared by every timeframe of a cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketContext {
    pub ticker: Ticker24h,
    pub funding_rate: f64,
    pub open_interest_delta: f64,
}

/// Derived technical snapshot for one (symbol, timeframe, cycle)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFeatures {
    pub price: f64,
    pub pct_change_24h: f64,
    /// (close - EMA50) / EMA50
    pub over_ext_ema: f64,
    /// (close - VWAP) / VWAP
    pub over_ext_vwap: f64,
    pub rsi: f64,
    pub is_above_upper_band: bool,
    /// (high - close) / (high - low) of the last candle
    pub rejection_wick_ratio: f64,
    pub funding_rate: f64,
    pub open_interest_delta: f64,
    pub nearest_support: Option<f64>,
    /// (close - support) / ATR
    pub dist_to_support_atr: Option<f64>,
    pub is_breakdown: bool,
    pub is_retest: bool,
    pub momentum: MomentumSignals,

    pub ema_fast: f64,
    pub ema_slow: f64,
    /// Last volume over the mean of the prior 20 candles
    pub volume_ratio: f64,
    /// Close below the lowest low of the prior 15 candles
    pub is_break_of_structure: bool,
    /// Last high above the high 10 candles back
    pub is_higher_high: bool,
    /// (close - prior 20-candle high) / high
    pub dist_to_high: f64,
    /// (close - prior 20-candle low) / low
    pub dist_to_low: f64,
}

impl Default for MarketFeatures {
    fn default() -> Self {
        Self {
            price: 0.0,
            pct_change_24h: 0.0,
            over_ext_ema: 0.0,
            over_ext_vwap: 0.0,
            rsi: 50.0,
            is_above_upper_band: false,
            rejection_wick_ratio: 0.0,
            funding_rate: 0.0,
            open_interest_delta: 0.0,
            nearest_support: None,
            dist_to_support_atr: None,
            is_breakdown: false,
            is_retest: false,
            momentum: MomentumSignals::default(),
            ema_fast: 0.0,
            ema_slow: 0.0,
            volume_ratio: 1.0,
            is_break_of_structure: false,
            is_higher_high: false,
            dist_to_high: 0.0,
            dist_to_low: 0.0,
        }
    }
}

impl MarketFeatures {
    /// EMA20 at or above EMA50
    pub fn is_trend_up(&self) -> bool {
        self.ema_fast >= self.ema_slow
    }

    /// Close above EMA20 above EMA50
    pub fn is_strong_uptrend(&self) -> bool {
        self.price > self.ema_fast && self.ema_fast > self.ema_slow
    }
}

fn ratio_over(value: f64, reference: f64) -> f64 {
    if reference > 0.0 {
        (value - reference) / reference
    } else {
        0.0
    }
}

/// Extract features from the most recent candle of `series`
///
/// Fails with [`FeatureError::InsufficientData`] below `min_candles`.
pub fn extract_features(
    series: &CandleSeries,
    context: &MarketContext,
    min_candles: usize,
) -> Result<MarketFeatures, FeatureError> {
    let required = min_candles.max(EMA_SLOW);
    let n = series.len();
    if n < required {
        return Err(FeatureError::InsufficientData {
            required,
            actual: n,
        });
    }

    let closes = series.closes();
    let highs = series.highs();
    let lows = series.lows();
    let volumes = series.volumes();

    let last = n - 1;
    let close = closes[last];
    let high = highs[last];
    let low = lows[last];

    let ema_fast = indicators::last_value(&indicators::ema(closes, EMA_FAST)).unwrap_or(close);
    let ema_slow = indicators::last_value(&indicators::ema(closes, EMA_SLOW)).unwrap_or(close);
    let vwap = indicators::last_value(&indicators::vwap(highs, lows, closes, volumes));

    let rsi_values = indicators::rsi(closes, RSI_PERIOD);
    let rsi = indicators::last_value(&rsi_values).unwrap_or(50.0);

    let bands = indicators::bollinger_bands(closes, BB_PERIOD, BB_STD);
    let is_above_upper_band = indicators::last_value(&bands.upper)
        .map(|upper| close > upper)
        .unwrap_or(false);

    let range = high - low;
    let rejection_wick_ratio = if range > 0.0 {
        (high - close) / range
    } else {
        0.0
    };

    let atr = indicators::last_value(&indicators::atr(highs, lows, closes, ATR_PERIOD));
    let pivots = indicators::pivot_lows(lows, PIVOT_LEFT, PIVOT_RIGHT);
    let support = indicators::nearest_support(&pivots, last).map(|p| p.price);

    let (dist_to_support_atr, is_breakdown, is_retest) = match (support, atr) {
        (Some(s), Some(a)) if a > 0.0 => (
            Some((close - s) / a),
            indicators::is_breakdown(close, s, a, BREAKDOWN_ATR_FACTOR),
            indicators::is_in_retest_zone(high, low, s, a, RETEST_ATR_FACTOR),
        ),
        _ => (None, false, false),
    };

    let momentum = indicators::detect_momentum_loss(closes, highs, volumes, &rsi_values);

    let prior_volume = indicators::mean(&volumes[last - VOLUME_LOOKBACK..last]);
    let volume_ratio = if prior_volume > 0.0 {
        volumes[last] / prior_volume
    } else {
        1.0
    };

    let structure_low = lows[last - STRUCTURE_LOOKBACK..last]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let rolling_high = highs[last - EXTREME_LOOKBACK..last]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let rolling_low = lows[last - EXTREME_LOOKBACK..last]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    Ok(MarketFeatures {
        price: close,
        pct_change_24h: context.ticker.pct_change_24h,
        over_ext_ema: ratio_over(close, ema_slow),
        over_ext_vwap: vwap.map(|v| ratio_over(close, v)).unwrap_or(0.0),
        rsi,
        is_above_upper_band,
        rejection_wick_ratio,
        funding_rate: context.funding_rate,
        open_interest_delta: context.open_interest_delta,
        nearest_support: support,
        dist_to_support_atr,
        is_breakdown,
        is_retest,
        momentum,
        ema_fast,
        ema_slow,
        volume_ratio,
        is_break_of_structure: close < structure_low,
        is_higher_high: high > highs[last - HIGHER_HIGH_LOOKBACK],
        dist_to_high: ratio_over(close, rolling_high),
        dist_to_low: ratio_over(close, rolling_low),
    })
}
