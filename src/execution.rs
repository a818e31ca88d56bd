//! Real order placement for auto-scalp shorts
//!
//! Entry is a SELL MARKET followed immediately by a STOP_MARKET that closes
//! the position on the exchange. Once the entry has filled nothing here
//! tries to undo it: a missing stop is reported loudly and left to the
//! operator.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::binance::{
    BrokerConnector, BrokerGateway, OrderRequest, OrderSide, PositionSide, ProtectiveStop,
};
use crate::error::TradingError;
use crate::store::{CredentialStore, TradingConfig};
use crate::types::Symbol;

pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 20;

/// Short entry to place for a user
#[derive(Debug, Clone, PartialEq)]
pub struct ShortEntry {
    pub user_id: String,
    pub symbol: Symbol,
    pub entry_price: f64,
    pub stop_price: f64,
    /// Overrides the user's configured trade amount
    pub notional_usdt: Option<f64>,
    /// Overrides the user's configured leverage
    pub leverage: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedShort {
    pub entry_order_id: i64,
    pub stop_order_id: i64,
    pub quantity: f64,
    pub leverage: u32,
    /// Reported average fill, or the requested entry price when none was reported
    pub fill_price: f64,
    pub position_side: PositionSide,
}

/// Round down to `decimals` places
pub fn floor_to(value: f64, decimals: i32) -> f64 {
    let p = 10f64.powi(decimals);
    (value * p).floor() / p
}

pub struct TradeExecutor {
    credentials: Arc<dyn CredentialStore>,
    connector: Arc<dyn BrokerConnector>,
}

impl TradeExecutor {
    pub fn new(credentials: Arc<dyn CredentialStore>, connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            credentials,
            connector,
        }
    }

    /// Trading config and a connected broker, or the typed reason there is none
    fn session(
        &self,
        user_id: &str,
    ) -> Result<(TradingConfig, Arc<dyn BrokerGateway>), TradingError> {
        let config = self.credentials.get_trading_config(user_id)?;
        if !config.enable_real_trading {
            return Err(TradingError::RealTradingDisabled(user_id.to_string()));
        }

        let credentials = self
            .credentials
            .get_credentials(user_id)
            .map_err(|_| TradingError::MissingCredentials(user_id.to_string()))?;
        if !credentials.enabled {
            return Err(TradingError::MissingCredentials(user_id.to_string()));
        }

        let broker = self.connector.connect(&credentials)?;
        Ok((config, broker))
    }

    pub async fn place_short_with_stop_loss(
        &self,
        entry: &ShortEntry,
    ) -> Result<PlacedShort, TradingError> {
        let (config, broker) = self.session(&entry.user_id)?;

        let leverage = entry
            .leverage
            .unwrap_or(config.leverage)
            .clamp(MIN_LEVERAGE, MAX_LEVERAGE);
        let notional = entry
            .notional_usdt
            .filter(|n| *n > 0.0)
            .unwrap_or(config.trade_amount_usdt);

        broker.set_leverage(&entry.symbol, leverage).await?;

        let account = broker.get_account_snapshot().await?;
        if account.available_balance <= 0.0 {
            return Err(TradingError::InsufficientBalance(account.available_balance));
        }

        let quantity = if entry.entry_price > 0.0 {
            floor_to(notional * leverage as f64 / entry.entry_price, 3)
        } else {
            0.0
        };
        if quantity <= 0.0 {
            return Err(TradingError::InvalidQuantity {
                symbol: entry.symbol.to_string(),
                price: entry.entry_price,
            });
        }

        let mut position_side = PositionSide::Short;
        let order = OrderRequest::market(entry.symbol.clone(), OrderSide::Sell, quantity);
        let fill = match broker
            .place_order(&order.clone().with_position_side(position_side))
            .await
        {
            Ok(fill) => fill,
            Err(e) if e.is_position_side_mismatch() => {
                warn!(
                    "{}: account is in one-way mode, retrying entry with positionSide=BOTH",
                    entry.symbol
                );
                position_side = PositionSide::Both;
                broker
                    .place_order(&order.with_position_side(position_side))
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        let fill_price = if fill.avg_price > 0.0 {
            fill.avg_price
        } else {
            entry.entry_price
        };

        let stop = ProtectiveStop {
            symbol: entry.symbol.clone(),
            quantity,
            stop_price: entry.stop_price,
            position_side,
        };
        let stop_order_id = match broker.place_protective_stop(&stop).await {
            Ok(id) => id,
            Err(source) => {
                error!(
                    "CRITICAL: protective stop failed for {} entry_order={} qty={}: {}. \
                     Position is OPEN without a stop, manual intervention required",
                    entry.symbol, fill.order_id, quantity, source
                );
                return Err(TradingError::ProtectiveStopFailed {
                    entry_order_id: fill.order_id,
                    quantity,
                    source,
                });
            }
        };

        info!(
            "Short placed: {} qty={} lev={}x fill={:.6} stop={:.6} (entry={}, stop={})",
            entry.symbol,
            quantity,
            leverage,
            fill_price,
            entry.stop_price,
            fill.order_id,
            stop_order_id
        );

        Ok(PlacedShort {
            entry_order_id: fill.order_id,
            stop_order_id,
            quantity,
            leverage,
            fill_price,
            position_side,
        })
    }

    /// Buy back a short opened by [`place_short_with_stop_loss`](Self::place_short_with_stop_loss)
    /// and cancel its resting stop
    pub async fn close_short(
        &self,
        user_id: &str,
        symbol: &Symbol,
        quantity: f64,
        stop_order_id: Option<i64>,
    ) -> Result<(), TradingError> {
        let (_, broker) = self.session(user_id)?;

        if let Some(stop_id) = stop_order_id {
            if let Err(e) = broker.cancel_order(symbol, stop_id).await {
                // an already triggered stop cannot be cancelled
                warn!("{}: failed to cancel stop order {}: {}", symbol, stop_id, e);
            }
        }

        let account = broker.get_account_snapshot().await?;
        let Some(open) = account
            .positions
            .iter()
            .find(|p| &p.symbol == symbol && p.amount < 0.0)
        else {
            info!("{}: no open short left to close", symbol);
            return Ok(());
        };

        let mut order = open.closing_order();
        order.quantity = order.quantity.min(quantity);
        broker.place_order(&order).await?;
        info!("{}: short closed, qty={}", symbol, order.quantity);
        Ok(())
    }

    /// Market-close every open position. Returns how many closes were sent;
    /// individual failures are logged and skipped.
    pub async fn emergency_close_all(
        &self,
        user_id: &str,
        reason: &str,
    ) -> Result<usize, TradingError> {
        let (_, broker) = self.session(user_id)?;
        let account = broker.get_account_snapshot().await?;

        warn!(
            "EMERGENCY STOP user={} positions={} reason={}",
            user_id,
            account.positions.len(),
            reason
        );

        let mut closed = 0;
        for position in &account.positions {
            let order = position.closing_order();
            match broker.place_order(&order).await {
                Ok(_) => closed += 1,
                Err(e) => error!("Failed to close position {}: {}", position.symbol, e),
            }
        }
        Ok(closed)
    }
}
