//! Binance USDⓈ-M futures access
//!
//! Two seams: [`MarketDataGateway`] for public market data consumed by the
//! screener, and [`BrokerGateway`] for signed order placement consumed by the
//! trade executor. Both REST implementations share the retry, rate limiting
//! and circuit breaker plumbing in `crate::common`.

pub mod auth;
pub mod market;
pub mod trading;
pub mod types;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
use crate::error::{BrokerError, GatewayError};
use crate::store::BrokerCredentials;
use crate::types::{Candle, Symbol, Ticker24h, Timeframe};

pub use auth::Credentials;
pub use market::BinanceFuturesClient;
pub use trading::{BinanceConnector, BinanceTrader};
pub use types::{
    AccountSnapshot, OpenPosition, OrderFill, OrderRequest, OrderSide, OrderType, PositionSide,
    ProtectiveStop,
};

/// Production futures REST host
pub const FAPI_BASE_URL: &str = "https://fapi.binance.com";

/// Futures testnet REST host
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

/// Public market data source for the screener
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    /// Symbols currently in TRADING status
    async fn get_active_symbols(&self) -> Result<Vec<Symbol>, GatewayError>;

    async fn get_24h_tickers(&self) -> Result<HashMap<Symbol, Ticker24h>, GatewayError>;

    /// Oldest-first candles
    async fn get_klines(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    async fn get_funding_rate(&self, symbol: &Symbol) -> Result<f64, GatewayError>;
}

/// Signed order placement for one account
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), BrokerError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill, BrokerError>;

    /// Returns the stop order id
    async fn place_protective_stop(&self, stop: &ProtectiveStop) -> Result<i64, BrokerError>;

    async fn get_account_snapshot(&self) -> Result<AccountSnapshot, BrokerError>;

    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> Result<(), BrokerError>;
}

/// Builds a broker session from stored credentials
pub trait BrokerConnector: Send + Sync {
    fn connect(
        &self,
        credentials: &BrokerCredentials,
    ) -> Result<Arc<dyn BrokerGateway>, BrokerError>;
}

/// HTTP client configuration shared by both REST clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: FAPI_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            rate_limiter: RateLimiterConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests per second
    pub fn with_rate_limit(mut self, requests_per_second: usize) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_failure_threshold(threshold);
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::default()
            .with_base_url("https://testnet.binancefuture.com/")
            .with_max_retries(4)
            .with_timeout(Duration::from_secs(5))
            .with_rate_limit(8)
            .with_circuit_breaker_threshold(3);

        assert_eq!(config.base_url, TESTNET_BASE_URL);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limiter.max_requests_per_second, 8);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }
}
