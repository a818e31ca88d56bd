//! Core data types shared by the screener, scorer and auto-scalp engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(datetime, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (exchange rows are trusted)
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        Ok(())
    }

    /// High-low range of the candle
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Ordered OHLCV samples for one (symbol, timeframe), oldest first.
///
/// Immutable once built. Column views are extracted once so every indicator
/// works on plain slices.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        let opens = candles.iter().map(|c| c.open).collect();
        let highs = candles.iter().map(|c| c.high).collect();
        let lows = candles.iter().map(|c| c.low).collect();
        let closes = candles.iter().map(|c| c.close).collect();
        let volumes = candles.iter().map(|c| c.volume).collect();

        Self {
            candles,
            opens,
            highs,
            lows,
            closes,
            volumes,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn opens(&self) -> &[f64] {
        &self.opens
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }
}

impl From<Vec<Candle>> for CandleSeries {
    fn from(candles: Vec<Candle>) -> Self {
        Self::new(candles)
    }
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every task, signal and position, so clones must not
/// allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset without the quote suffix ("BTCUSDT" -> "BTC")
    pub fn base_asset(&self) -> &str {
        self.0.strip_suffix("USDT").unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Candle duration supported by the futures kline endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported timeframe: {0}")]
pub struct ParseTimeframeError(String);

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            other => Err(ParseTimeframeError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseTimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// 24h rolling ticker statistics for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ticker24h {
    pub price: f64,
    pub pct_change_24h: f64,
    pub quote_volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new_unchecked(Utc::now(), open, high, low, close, 10.0)
    }

    #[test]
    fn test_candle_validation() {
        assert!(candle(10.0, 11.0, 9.0, 10.5).validate().is_ok());
        assert!(matches!(
            candle(10.0, 9.0, 11.0, 10.0).validate(),
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
        assert!(matches!(
            candle(0.0, 1.0, 0.5, 1.0).validate(),
            Err(CandleValidationError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn test_series_columns() {
        let series = CandleSeries::new(vec![
            candle(1.0, 2.0, 0.5, 1.5),
            candle(1.5, 3.0, 1.0, 2.5),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), &[1.5, 2.5]);
        assert_eq!(series.highs(), &[2.0, 3.0]);
        assert_eq!(series.last().map(|c| c.close), Some(2.5));
    }

    #[test]
    fn test_symbol_base_asset() {
        assert_eq!(Symbol::new("BTCUSDT").base_asset(), "BTC");
        assert_eq!(Symbol::new("BTCBUSD").base_asset(), "BTCBUSD");
    }

    #[test]
    fn test_timeframe_round_trip_through_json() {
        let tfs: Vec<Timeframe> = serde_json::from_str(r#"["1m","15m","1h"]"#).unwrap();
        assert_eq!(tfs, vec![Timeframe::M1, Timeframe::M15, Timeframe::H1]);
        assert_eq!(serde_json::to_string(&Timeframe::M5).unwrap(), r#""5m""#);
        assert!("2m".parse::<Timeframe>().is_err());
    }
}
