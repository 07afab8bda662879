//! Order Lifecycle Manager
//!
//! Opens and closes positions for one bot, in paper or real mode.
//!
//! In real mode an open is a sequence of exchange calls with two failure
//! classes. The market order is fatal: its error propagates and nothing is
//! opened. Leverage, stop-loss and take-profit are best-effort: failures are
//! logged and the position proceeds without them.

use futures_util::future::{join, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::sources::asterdex::clamp_leverage;
use crate::types::{
    liquidation_price, AiAction, AiDecision, BotState, CloseReason, Order, OrderType, Portfolio,
    Position, SymbolPrecisionInfo, TradingMode,
};

/// Why a decision was not carried out.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid decision: {0}")]
    Validation(String),

    #[error("{symbol} is cooling down until {until}")]
    CoolingDown { symbol: String, until: i64 },

    #[error("Insufficient balance: need ${needed:.2}, have ${available:.2}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("No market price for {0}")]
    MissingPrice(String),

    #[error(transparent)]
    Exchange(#[from] AppError),
}

impl TradeError {
    /// Fatal-step failure on the exchange, as opposed to a dropped decision.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradeError::Exchange(_))
    }
}

/// Exchange order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    StopMarket,
    TakeProfitMarket,
}

/// Parameters of `POST /fapi/v1/order`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: &'static str,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub close_position: bool,
    pub reduce_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<&'static str>,
}

impl OrderRequest {
    /// Market order opening `side`.
    pub fn open_market(symbol: &str, side: OrderType, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.open_side(),
            kind: OrderKind::Market,
            quantity: Some(quantity),
            stop_price: None,
            close_position: false,
            reduce_only: false,
            time_in_force: None,
        }
    }

    /// Reduce-only market order flattening a `side` position.
    pub fn close_market(symbol: &str, side: OrderType, quantity: f64) -> Self {
        Self {
            side: side.close_side(),
            reduce_only: true,
            ..Self::open_market(symbol, side, quantity)
        }
    }

    /// Conditional order closing a `side` position when `stop_price` trades.
    pub fn conditional(symbol: &str, side: OrderType, kind: OrderKind, stop_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.close_side(),
            kind,
            quantity: None,
            stop_price: Some(stop_price),
            close_position: true,
            reduce_only: true,
            time_in_force: Some("GTE_GTC"),
        }
    }

    pub fn to_params(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Authenticated exchange operations used by the lifecycle.
pub trait ExchangeGateway: Send + Sync {
    fn set_leverage<'a>(
        &'a self,
        bot_id: &'a str,
        symbol: &'a str,
        leverage: f64,
    ) -> BoxFuture<'a, Result<()>>;

    /// Submit an order, returning the exchange order id.
    fn place_order<'a>(
        &'a self,
        bot_id: &'a str,
        order: &'a OrderRequest,
    ) -> BoxFuture<'a, Result<String>>;

    fn cancel_order<'a>(
        &'a self,
        bot_id: &'a str,
        symbol: &'a str,
        order_id: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn account_state<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, Result<Portfolio>>;

    fn trade_history<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, Result<Vec<Order>>>;
}

/// A validated, rounded open request.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPlan {
    pub symbol: String,
    pub side: OrderType,
    pub quantity: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Lifecycle settings.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Pause between sequential exchange calls.
    pub step_delay: Duration,
    pub cooldown: Duration,
    /// Per-side paper fee, as a fraction of margin.
    pub paper_fee_rate: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(100),
            cooldown: Duration::from_secs(30 * 60),
            paper_fee_rate: 0.03,
        }
    }
}

/// Executes decisions against the exchange or the paper book.
pub struct OrderLifecycleManager {
    gateway: Arc<dyn ExchangeGateway>,
    config: LifecycleConfig,
}

impl OrderLifecycleManager {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: LifecycleConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn ExchangeGateway> {
        &self.gateway
    }

    /// Check and round an open decision. Nothing is touched on failure.
    pub fn validate(
        &self,
        decision: &AiDecision,
        precision: &HashMap<String, SymbolPrecisionInfo>,
    ) -> std::result::Result<OpenPlan, TradeError> {
        let side = match decision.action {
            AiAction::Long => OrderType::Long,
            AiAction::Short => OrderType::Short,
            other => {
                return Err(TradeError::Validation(format!(
                    "{:?} is not an open action",
                    other
                )))
            }
        };

        let symbol = decision
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TradeError::Validation("missing symbol".to_string()))?;
        let size = positive(decision.size, "size")?;
        let stop_loss = positive(decision.stop_loss, "stopLoss")?;
        let take_profit = positive(decision.take_profit, "takeProfit")?;

        let info = precision
            .get(symbol)
            .copied()
            .unwrap_or(SymbolPrecisionInfo::FALLBACK);
        let quantity = info.round_quantity(size);
        if quantity <= 0.0 {
            return Err(TradeError::Validation(format!(
                "size {} rounds to zero for {}",
                size, symbol
            )));
        }

        Ok(OpenPlan {
            symbol: symbol.to_string(),
            side,
            quantity,
            leverage: clamp_leverage(decision.leverage.unwrap_or(1.0)),
            stop_loss: info.round_price(stop_loss),
            take_profit: info.round_price(take_profit),
        })
    }

    /// Open a position for `decision`.
    ///
    /// An existing position on the same symbol is torn down first and removed
    /// from `existing_positions`, whatever the outcome of the open.
    pub async fn execute(
        &self,
        bot_id: &str,
        decision: &AiDecision,
        market_price: f64,
        precision: &HashMap<String, SymbolPrecisionInfo>,
        mode: TradingMode,
        existing_positions: &mut Vec<Position>,
    ) -> std::result::Result<Position, TradeError> {
        let plan = self.validate(decision, precision)?;
        if market_price.is_nan() || market_price <= 0.0 {
            return Err(TradeError::MissingPrice(plan.symbol));
        }

        if let Some(idx) = existing_positions.iter().position(|p| p.symbol == plan.symbol) {
            let old = existing_positions.remove(idx);
            if mode.is_real() {
                self.cancel_conditional_orders(bot_id, &old).await;
            }
            info!("[{}] Replacing {} {} position {}", bot_id, old.side, old.symbol, old.id);
        }

        match mode {
            TradingMode::Paper => Ok(self.open_paper(&plan, market_price)),
            TradingMode::Real => self.open_real(bot_id, &plan, market_price).await,
        }
    }

    fn open_paper(&self, plan: &OpenPlan, market_price: f64) -> Position {
        let position = build_position(
            format!("sim_{}_{}", plan.symbol, now_ms()),
            plan,
            market_price,
            TradingMode::Paper,
            None,
            None,
        );
        info!(
            "[PAPER] {} {} @ {} | SL: {} | TP: {}",
            plan.side, plan.symbol, market_price, plan.stop_loss, plan.take_profit
        );
        position
    }

    async fn open_real(
        &self,
        bot_id: &str,
        plan: &OpenPlan,
        market_price: f64,
    ) -> std::result::Result<Position, TradeError> {
        if let Err(e) = self
            .gateway
            .set_leverage(bot_id, &plan.symbol, plan.leverage)
            .await
        {
            warn!("[{}] Leverage set failed, continuing: {}", bot_id, e);
        }
        self.pace().await;

        let open = OrderRequest::open_market(&plan.symbol, plan.side, plan.quantity);
        if let Err(e) = self.gateway.place_order(bot_id, &open).await {
            error!("[{}] Failed to open position: {}", bot_id, e);
            return Err(e.into());
        }
        self.pace().await;

        let stop = OrderRequest::conditional(&plan.symbol, plan.side, OrderKind::StopMarket, plan.stop_loss);
        let stop_loss_order_id = match self.gateway.place_order(bot_id, &stop).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("[{}] SL failed, continuing without: {}", bot_id, e);
                None
            }
        };
        self.pace().await;

        let take = OrderRequest::conditional(
            &plan.symbol,
            plan.side,
            OrderKind::TakeProfitMarket,
            plan.take_profit,
        );
        let take_profit_order_id = match self.gateway.place_order(bot_id, &take).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("[{}] TP failed, continuing without: {}", bot_id, e);
                None
            }
        };

        info!(
            "[{}] {} {} qty {} @ {} | SL: {} | TP: {}",
            bot_id, plan.side, plan.symbol, plan.quantity, market_price, plan.stop_loss, plan.take_profit
        );
        Ok(build_position(
            format!("{}_{}", plan.symbol, now_ms()),
            plan,
            market_price,
            TradingMode::Real,
            stop_loss_order_id,
            take_profit_order_id,
        ))
    }

    /// Close `position`. Paper mode has no network effect.
    pub async fn close(
        &self,
        bot_id: &str,
        position: &Position,
        market_price: f64,
        mode: TradingMode,
    ) -> std::result::Result<(), TradeError> {
        if !mode.is_real() {
            info!(
                "[PAPER] [{}] Closed {} {} @ {}",
                bot_id, position.side, position.symbol, market_price
            );
            return Ok(());
        }

        self.cancel_conditional_orders(bot_id, position).await;

        let quantity = position.quantity.unwrap_or(position.size);
        let order = OrderRequest::close_market(&position.symbol, position.side, quantity);
        if let Err(e) = self.gateway.place_order(bot_id, &order).await {
            error!("[{}] Failed to close position: {}", bot_id, e);
            return Err(e.into());
        }
        info!(
            "[{}] Closed {} {} @ {}",
            bot_id, position.side, position.symbol, market_price
        );
        Ok(())
    }

    /// Cancel a position's stop-loss and take-profit orders in parallel.
    pub async fn cancel_conditional_orders(&self, bot_id: &str, position: &Position) -> (bool, bool) {
        join(
            self.cancel_conditional_order(bot_id, &position.symbol, position.stop_loss_order_id.as_deref()),
            self.cancel_conditional_order(bot_id, &position.symbol, position.take_profit_order_id.as_deref()),
        )
        .await
    }

    /// Cancel one conditional order. Best-effort: returns whether it was cancelled.
    pub async fn cancel_conditional_order(
        &self,
        bot_id: &str,
        symbol: &str,
        order_id: Option<&str>,
    ) -> bool {
        let Some(order_id) = order_id else {
            return false;
        };
        match self.gateway.cancel_order(bot_id, symbol, order_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] Failed to cancel order {} for {}: {}", bot_id, order_id, symbol, e);
                false
            }
        }
    }

    /// Refuse to open `symbol` while its cooldown is running.
    pub fn ensure_not_cooling(
        &self,
        state: &BotState,
        symbol: &str,
        now_ms: i64,
    ) -> std::result::Result<(), TradeError> {
        match state.cooldown_until(symbol, now_ms) {
            Some(until) => Err(TradeError::CoolingDown {
                symbol: symbol.to_string(),
                until,
            }),
            None => Ok(()),
        }
    }

    /// Cooldown expiry for a close at `now_ms`.
    pub fn cooldown_expiry(&self, now_ms: i64) -> i64 {
        now_ms + self.config.cooldown.as_millis() as i64
    }

    /// Paper fee for one side of a position.
    pub fn paper_fee(&self, position: &Position) -> f64 {
        position.size * self.config.paper_fee_rate
    }

    /// Paper mode: refuse an open the balance cannot fund.
    ///
    /// A position being replaced is settled first, so its margin counts.
    pub fn ensure_affordable(
        &self,
        balance: f64,
        plan: &OpenPlan,
        replaced: Option<(&Position, f64)>,
    ) -> std::result::Result<(), TradeError> {
        let released = replaced
            .map(|(p, price)| {
                let order = self.settle(p, price, TradingMode::Paper, CloseReason::Replaced, 0);
                p.size + order.pnl
            })
            .unwrap_or(0.0);
        let available = balance + released;
        if plan.quantity > available {
            return Err(TradeError::InsufficientBalance {
                needed: plan.quantity,
                available,
            });
        }
        Ok(())
    }

    /// Closed-trade record for `position` exiting at `exit_price`.
    ///
    /// Paper trades pay the fee on both sides; a liquidation loses at most the
    /// margin. Real trades are recorded gross, the exchange accounts fees.
    pub fn settle(
        &self,
        position: &Position,
        exit_price: f64,
        mode: TradingMode,
        reason: CloseReason,
        timestamp: i64,
    ) -> Order {
        let mut gross = position.pnl_at(exit_price);
        if reason == CloseReason::Liquidation {
            gross = gross.max(-position.size);
        }
        let fee = if mode.is_real() {
            0.0
        } else {
            self.paper_fee(position) * 2.0
        };
        let (was_stop_loss, was_take_profit) = match reason {
            CloseReason::StopLoss => (Some(true), Some(false)),
            CloseReason::TakeProfit => (Some(false), Some(true)),
            CloseReason::Liquidation | CloseReason::External => (Some(false), Some(false)),
            CloseReason::Decision | CloseReason::Replaced => (None, None),
        };

        Order {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: position.symbol.clone(),
            side: position.side,
            size: position.size,
            leverage: position.leverage,
            pnl: gross - fee,
            fee,
            timestamp,
            entry_price: position.entry_price,
            exit_price,
            was_stop_loss,
            was_take_profit,
        }
    }

    async fn pace(&self) {
        if !self.config.step_delay.is_zero() {
            tokio::time::sleep(self.config.step_delay).await;
        }
    }
}

fn positive(value: Option<f64>, field: &str) -> std::result::Result<f64, TradeError> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| TradeError::Validation(format!("missing or non-positive {}", field)))
}

/// Paper sizes are USD margin. A live order buys `quantity` contracts, so its
/// margin is derived from the fill estimate.
fn build_position(
    id: String,
    plan: &OpenPlan,
    entry_price: f64,
    mode: TradingMode,
    stop_loss_order_id: Option<String>,
    take_profit_order_id: Option<String>,
) -> Position {
    let (size, quantity) = match mode {
        TradingMode::Paper => (plan.quantity, None),
        TradingMode::Real => (plan.quantity * entry_price / plan.leverage, Some(plan.quantity)),
    };
    Position {
        id,
        symbol: plan.symbol.clone(),
        side: plan.side,
        entry_price,
        size,
        quantity,
        leverage: plan.leverage,
        liquidation_price: liquidation_price(entry_price, plan.leverage, plan.side),
        stop_loss: plan.stop_loss,
        take_profit: plan.take_profit,
        stop_loss_order_id,
        take_profit_order_id,
        pnl: 0.0,
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
