//! Signed futures REST client for one account

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

use super::auth::{Credentials, API_KEY_HEADER};
use super::types::{
    AccountResponse, AccountSnapshot, ApiErrorBody, OrderFill, OrderRequest, OrderResponse,
    ProtectiveStop,
};
use super::{BrokerConnector, BrokerGateway, ClientConfig, FAPI_BASE_URL, TESTNET_BASE_URL};
use crate::common::RequestGuard;
use crate::error::BrokerError;
use crate::store::BrokerCredentials;
use crate::types::Symbol;

#[derive(Debug, Clone)]
pub struct BinanceTrader {
    credentials: Credentials,
    http: reqwest::Client,
    base_url: String,
    guard: RequestGuard,
}

impl BinanceTrader {
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self, BrokerError> {
        let http = config.http_client()?;
        Ok(Self {
            credentials,
            http,
            guard: RequestGuard::new(
                config.retry.clone(),
                config.rate_limiter.clone(),
                config.circuit_breaker.clone(),
            ),
            base_url: config.base_url,
        })
    }

    /// Sign `params` with a fresh timestamp per attempt and decode the body
    async fn signed_request<T>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BrokerError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.guard
            .execute(|| {
                let method = method.clone();
                async move {
                    let query = self
                        .credentials
                        .signed_query(params, Utc::now().timestamp_millis());
                    let url = format!("{}{}?{}", self.base_url, path, query);
                    debug!("{} {}", method, path);

                    let response = self
                        .http
                        .request(method, &url)
                        .header(API_KEY_HEADER, self.credentials.api_key())
                        .send()
                        .await?;

                    let status = response.status();
                    let body = response.text().await?;
                    if !status.is_success() {
                        return Err(parse_api_error(status.as_u16(), body));
                    }
                    serde_json::from_str(&body).map_err(|e| BrokerError::Parse(e.to_string()))
                }
            })
            .await
    }
}

fn parse_api_error(status: u16, body: String) -> BrokerError {
    let parsed = serde_json::from_str::<ApiErrorBody>(&body).unwrap_or(ApiErrorBody {
        code: 0,
        msg: String::new(),
    });
    BrokerError::Api {
        status,
        code: parsed.code,
        message: parsed.msg,
        body,
    }
}

#[async_trait]
impl BrokerGateway for BinanceTrader {
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<(), BrokerError> {
        let _: serde_json::Value = self
            .signed_request(
                Method::POST,
                "/fapi/v1/leverage",
                &[
                    ("symbol", symbol.to_string()),
                    ("leverage", leverage.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderFill, BrokerError> {
        let response: OrderResponse = self
            .signed_request(Method::POST, "/fapi/v1/order", &order.to_params())
            .await?;
        Ok(response.into())
    }

    async fn place_protective_stop(&self, stop: &ProtectiveStop) -> Result<i64, BrokerError> {
        let response: OrderResponse = self
            .signed_request(Method::POST, "/fapi/v1/order", &stop.to_params())
            .await?;
        Ok(response.order_id)
    }

    async fn get_account_snapshot(&self) -> Result<AccountSnapshot, BrokerError> {
        let response: AccountResponse = self
            .signed_request(Method::GET, "/fapi/v2/account", &[])
            .await?;
        Ok(response.into())
    }

    async fn cancel_order(&self, symbol: &Symbol, order_id: i64) -> Result<(), BrokerError> {
        let _: serde_json::Value = self
            .signed_request(
                Method::DELETE,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Connects with production or testnet host depending on the credentials
#[derive(Debug, Clone, Default)]
pub struct BinanceConnector {
    config: ClientConfig,
}

impl BinanceConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl BrokerConnector for BinanceConnector {
    fn connect(
        &self,
        credentials: &BrokerCredentials,
    ) -> Result<Arc<dyn BrokerGateway>, BrokerError> {
        let base_url = if credentials.testnet {
            TESTNET_BASE_URL
        } else {
            FAPI_BASE_URL
        };
        let trader = BinanceTrader::new(
            Credentials::new(&credentials.api_key, &credentials.secret_key),
            self.config.clone().with_base_url(base_url),
        )?;
        Ok(Arc::new(trader))
    }
}
