//! Public market data over the futures REST API
//!
//! No API key required.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::types::{BinanceKline, ExchangeInfo, PremiumIndex, Ticker24hResponse};
use super::{ClientConfig, MarketDataGateway};
use crate::common::RequestGuard;
use crate::error::GatewayError;
use crate::types::{Candle, Symbol, Ticker24h, Timeframe};

/// Binance caps a kline request at this many rows
const MAX_KLINES_PER_REQUEST: usize = 1500;

#[derive(Debug, Clone)]
pub struct BinanceFuturesClient {
    http: reqwest::Client,
    base_url: String,
    guard: RequestGuard,
}

impl BinanceFuturesClient {
    pub fn new(config: ClientConfig) -> Result<Self, GatewayError> {
        let http = config.http_client()?;
        Ok(Self {
            http,
            guard: RequestGuard::new(
                config.retry.clone(),
                config.rate_limiter.clone(),
                config.circuit_breaker.clone(),
            ),
            base_url: config.base_url,
        })
    }

    /// GET `path` with `query` and decode the JSON body
    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.guard
            .execute(|| async {
                let response = self.http.get(&url).query(query).send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(GatewayError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                response
                    .json::<T>()
                    .await
                    .map_err(|e| GatewayError::Parse(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl MarketDataGateway for BinanceFuturesClient {
    async fn get_active_symbols(&self) -> Result<Vec<Symbol>, GatewayError> {
        let info: ExchangeInfo = self.get_json("/fapi/v1/exchangeInfo", &[]).await?;
        Ok(info
            .symbols
            .into_iter()
            .filter(|s| s.is_trading())
            .map(|s| Symbol::new(&s.symbol))
            .collect())
    }

    async fn get_24h_tickers(&self) -> Result<HashMap<Symbol, Ticker24h>, GatewayError> {
        let tickers: Vec<Ticker24hResponse> = self.get_json("/fapi/v1/ticker/24hr", &[]).await?;
        Ok(tickers.into_iter().map(Ticker24hResponse::into_entry).collect())
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        debug!(
            "Fetching klines: symbol={}, interval={}, limit={}",
            symbol, timeframe, limit
        );

        let raw: Vec<Vec<serde_json::Value>> = self
            .get_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(raw
            .iter()
            .filter_map(|row| BinanceKline::from_raw(row))
            .filter_map(BinanceKline::into_candle)
            .collect())
    }

    async fn get_funding_rate(&self, symbol: &Symbol) -> Result<f64, GatewayError> {
        let index: PremiumIndex = self
            .get_json("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
            .await?;
        Ok(index.last_funding_rate)
    }
}
