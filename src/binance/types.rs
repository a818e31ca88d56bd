//! Request and response types for the Binance USDⓈ-M futures REST API
//!
//! Binance encodes most decimals as JSON strings; the `string_f64`
//! deserializer accepts either form.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Candle, Symbol, Ticker24h};

/// Kline row: [open_time, open, high, low, close, volume, close_time,
///             quote_volume, trades, taker_buy_base, taker_buy_quote, ignore]
#[derive(Debug, Clone)]
pub struct BinanceKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl BinanceKline {
    /// Parse from raw JSON array returned by Binance API
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }

        Some(BinanceKline {
            open_time: raw[0].as_i64()?,
            open: value_f64(&raw[1])?,
            high: value_f64(&raw[2])?,
            low: value_f64(&raw[3])?,
            close: value_f64(&raw[4])?,
            volume: value_f64(&raw[5])?,
            close_time: raw[6].as_i64()?,
        })
    }

    pub fn into_candle(self) -> Option<Candle> {
        let datetime = DateTime::from_timestamp_millis(self.open_time)?;
        Some(Candle::new_unchecked(
            datetime, self.open, self.high, self.low, self.close, self.volume,
        ))
    }
}

fn value_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        other => other.as_f64(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// Entry of `/fapi/v1/ticker/24hr`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hResponse {
    pub symbol: String,
    #[serde(deserialize_with = "string_f64")]
    pub price_change_percent: f64,
    #[serde(deserialize_with = "string_f64")]
    pub last_price: f64,
    #[serde(deserialize_with = "string_f64")]
    pub quote_volume: f64,
}

impl Ticker24hResponse {
    pub fn into_entry(self) -> (Symbol, Ticker24h) {
        (
            Symbol::new(&self.symbol),
            Ticker24h {
                price: self.last_price,
                pct_change_24h: self.price_change_percent,
                quote_volume: self.quote_volume,
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    pub symbol: String,
    /// Unparseable or empty rates read as zero
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_funding_rate: f64,
}

/// Error body Binance returns with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

/// Hedge mode uses LONG/SHORT, one-way mode only accepts BOTH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Both => "BOTH",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub position_side: Option<PositionSide>,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Only sent for LIMIT orders
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol,
            side,
            position_side: None,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = Some(position_side);
        self
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.to_string()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
            ("quantity", format!("{:.8}", self.quantity)),
        ];
        if let Some(position_side) = self.position_side {
            params.push(("positionSide", position_side.as_str().to_string()));
        }
        if let (OrderType::Limit, Some(price)) = (self.order_type, self.price) {
            if price > 0.0 {
                params.push(("price", format!("{:.8}", price)));
                params.push(("timeInForce", "GTC".to_string()));
            }
        }
        params
    }
}

/// Reduce-only STOP_MARKET that closes the whole position on mark price
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveStop {
    pub symbol: Symbol,
    pub quantity: f64,
    pub stop_price: f64,
    pub position_side: PositionSide,
}

impl ProtectiveStop {
    /// A short is closed by buying
    pub fn side(&self) -> OrderSide {
        match self.position_side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short | PositionSide::Both => OrderSide::Buy,
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.to_string()),
            ("side", self.side().as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", format!("{:.8}", self.stop_price)),
            ("closePosition", "true".to_string()),
            ("workingType", "MARK_PRICE".to_string()),
            ("priceProtect", "true".to_string()),
            ("positionSide", self.position_side.as_str().to_string()),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub executed_qty: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_price: f64,
}

/// Result of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub order_id: i64,
    pub status: String,
    pub executed_qty: f64,
    /// Zero when the exchange did not report a fill price
    pub avg_price: f64,
}

impl From<OrderResponse> for OrderFill {
    fn from(resp: OrderResponse) -> Self {
        Self {
            order_id: resp.order_id,
            status: resp.status,
            executed_qty: resp.executed_qty,
            avg_price: resp.avg_price,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_wallet_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub available_balance: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_unrealized_profit: f64,
    #[serde(default)]
    pub positions: Vec<PositionResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub symbol: String,
    #[serde(default = "default_position_side")]
    pub position_side: PositionSide,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub position_amt: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub unrealized_profit: f64,
}

fn default_position_side() -> PositionSide {
    PositionSide::Both
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub symbol: Symbol,
    pub position_side: PositionSide,
    /// Signed: negative for shorts in one-way mode
    pub amount: f64,
    pub entry_price: f64,
    pub unrealized_profit: f64,
}

impl OpenPosition {
    /// Market order that flattens this position
    pub fn closing_order(&self) -> OrderRequest {
        let side = match self.position_side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
            PositionSide::Both if self.amount < 0.0 => OrderSide::Buy,
            PositionSide::Both => OrderSide::Sell,
        };
        OrderRequest::market(self.symbol.clone(), side, self.amount.abs())
            .with_position_side(self.position_side)
    }
}

/// Balances plus non-empty positions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountSnapshot {
    pub total_balance: f64,
    pub available_balance: f64,
    pub total_unrealized_pnl: f64,
    pub positions: Vec<OpenPosition>,
}

impl From<AccountResponse> for AccountSnapshot {
    fn from(resp: AccountResponse) -> Self {
        let positions = resp
            .positions
            .into_iter()
            .filter(|p| p.position_amt != 0.0)
            .map(|p| OpenPosition {
                symbol: Symbol::new(&p.symbol),
                position_side: p.position_side,
                amount: p.position_amt,
                entry_price: p.entry_price,
                unrealized_profit: p.unrealized_profit,
            })
            .collect();

        Self {
            total_balance: resp.total_wallet_balance,
            available_balance: resp.available_balance,
            total_unrealized_pnl: resp.total_unrealized_profit,
            positions,
        }
    }
}

/// Deserialize a decimal sent as string or number
fn string_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct StringOrNumber;

    impl<'de> Visitor<'de> for StringOrNumber {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a decimal string or a number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.trim().parse().map_err(E::custom)
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v as f64)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v as f64)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Like `string_f64` but reads garbage as zero
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value_f64(&value).unwrap_or(0.0))
}
