//! Error types

use thiserror::Error;

use crate::common::RetryableError;

/// Feature extraction failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("insufficient data: need {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },
}

/// Market data gateway failures. Always treated as transient by the screener.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("circuit breaker is open, rejecting request")]
    CircuitOpen,

    #[error("symbol not found: {0}")]
    UnknownSymbol(String),
}

impl RetryableError for GatewayError {
    fn circuit_open() -> Self {
        GatewayError::CircuitOpen
    }

    /// Network failures, rate limiting and server errors
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Http(_) => true,
            GatewayError::Api { status, .. } => *status == 418 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Binance error code returned when positionSide does not match the account mode
pub const POSITION_SIDE_MISMATCH_CODE: i64 = -4061;

/// Signed broker request failures
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Binance API error (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
        body: String,
    },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("circuit breaker is open, rejecting request")]
    CircuitOpen,
}

impl BrokerError {
    pub fn code(&self) -> Option<i64> {
        match self {
            BrokerError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Order rejected because hedge/one-way mode disagrees with positionSide
    pub fn is_position_side_mismatch(&self) -> bool {
        self.code() == Some(POSITION_SIDE_MISMATCH_CODE)
    }
}

impl RetryableError for BrokerError {
    fn circuit_open() -> Self {
        BrokerError::CircuitOpen
    }

    /// Only requests that never reached the exchange. A timed-out order may
    /// have been accepted, so it is never resent.
    fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Http(e) if e.is_connect())
    }
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("an active position already exists for {0}")]
    DuplicateActive(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),
}

/// Real-order placement failures surfaced to the caller
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("real trading is disabled for user {0}")]
    RealTradingDisabled(String),

    #[error("no enabled broker credentials for user {0}")]
    MissingCredentials(String),

    #[error("insufficient available balance: {0:.4} USDT")]
    InsufficientBalance(f64),

    #[error("computed order quantity is zero for {symbol} at {price}")]
    InvalidQuantity { symbol: String, price: f64 },

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("CRITICAL: entry order {entry_order_id} filled but protective stop failed: {source}")]
    ProtectiveStopFailed {
        entry_order_id: i64,
        quantity: f64,
        #[source]
        source: BrokerError,
    },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Alert delivery failures
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Auto-scalp administrative failures
#[derive(Debug, Error)]
pub enum AutoScalpError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("position {0} is not active")]
    NotActive(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("exchange close failed: {0}")]
    Trading(#[from] TradingError),
}
