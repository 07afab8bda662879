//! Trading Types
//!
//! Positions, portfolios and the closed-trade ledger kept by each bot.

use serde::{Deserialize, Serialize};

/// Maintenance buffer applied on top of the initial margin when estimating
/// liquidation prices (0.5%).
pub const MAINTENANCE_BUFFER: f64 = 0.005;

/// Direction of an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Long,
    Short,
}

impl OrderType {
    /// Exchange side that opens this direction.
    pub fn open_side(&self) -> &'static str {
        match self {
            OrderType::Long => "BUY",
            OrderType::Short => "SELL",
        }
    }

    /// Exchange side that reduces this direction.
    pub fn close_side(&self) -> &'static str {
        match self {
            OrderType::Long => "SELL",
            OrderType::Short => "BUY",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Long => write!(f, "LONG"),
            OrderType::Short => write!(f, "SHORT"),
        }
    }
}

/// Estimated liquidation price for an isolated position.
///
/// This is a display/risk estimate, not the exchange's own value.
pub fn liquidation_price(entry: f64, leverage: f64, side: OrderType) -> f64 {
    match side {
        OrderType::Long => entry * (1.0 - 1.0 / leverage - MAINTENANCE_BUFFER),
        OrderType::Short => entry * (1.0 + 1.0 / leverage + MAINTENANCE_BUFFER),
    }
}

/// An open exposure owned by one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: OrderType,
    pub entry_price: f64,
    /// Margin committed, in USD.
    pub size: f64,
    pub leverage: f64,
    pub liquidation_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Broker-side STOP_MARKET order id, when one was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_order_id: Option<String>,
    /// Broker-side TAKE_PROFIT_MARKET order id, when one was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_order_id: Option<String>,
    #[serde(default)]
    pub pnl: f64,
    /// Contract quantity held on the exchange. Live positions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

impl Position {
    /// Unrealized PnL at `mark`, on the leveraged notional.
    pub fn pnl_at(&self, mark: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        let notional = self.size * self.leverage;
        let change = (mark - self.entry_price) / self.entry_price;
        match self.side {
            OrderType::Long => change * notional,
            OrderType::Short => -change * notional,
        }
    }

    /// Check if the stop loss is crossed at `mark`.
    pub fn should_stop_loss(&self, mark: f64) -> bool {
        match self.side {
            OrderType::Long => mark <= self.stop_loss,
            OrderType::Short => mark >= self.stop_loss,
        }
    }

    /// Check if the take profit is crossed at `mark`.
    pub fn should_take_profit(&self, mark: f64) -> bool {
        match self.side {
            OrderType::Long => mark >= self.take_profit,
            OrderType::Short => mark <= self.take_profit,
        }
    }

    /// Check if the estimated liquidation price is crossed at `mark`.
    pub fn should_liquidate(&self, mark: f64) -> bool {
        match self.side {
            OrderType::Long => mark <= self.liquidation_price,
            OrderType::Short => mark >= self.liquidation_price,
        }
    }

    /// One-line description used in prompts.
    pub fn describe(&self) -> String {
        format!(
            " - ID: {} | {} {} | Size: ${} | Lev: {}x | Entry: ${:.4} | SL: ${:.4} | TP: ${:.4}",
            self.id,
            self.side,
            self.symbol,
            self.size,
            self.leverage,
            self.entry_price,
            self.stop_loss,
            self.take_profit
        )
    }
}

/// Cash, exposure and aggregate PnL of one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// Available balance for new positions.
    pub balance: f64,
    /// Aggregate unrealized PnL.
    pub pnl: f64,
    pub total_value: f64,
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            pnl: 0.0,
            total_value: balance,
            positions: Vec::new(),
        }
    }

    /// The zeroed portfolio substituted when an account cannot be read.
    pub fn zeroed() -> Self {
        Self::new(0.0)
    }

    /// Margin committed across open positions.
    pub fn margin_in_use(&self) -> f64 {
        self.positions.iter().map(|p| p.size).sum()
    }

    /// Recompute `pnl` and `total_value` from the positions' stored PnL.
    pub fn recompute(&mut self) {
        self.pnl = self.positions.iter().map(|p| p.pnl).sum();
        self.total_value = self.balance + self.margin_in_use() + self.pnl;
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn position_for_symbol(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Remove and return a position by id.
    pub fn take_position(&mut self, id: &str) -> Option<Position> {
        let idx = self.positions.iter().position(|p| p.id == id)?;
        Some(self.positions.remove(idx))
    }
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Closed-trade record. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: OrderType,
    pub size: f64,
    pub leverage: f64,
    /// Realized PnL, net of fees.
    pub pnl: f64,
    pub fee: f64,
    /// Close time (ms).
    pub timestamp: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_stop_loss: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_take_profit: Option<bool>,
}

impl Order {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// CLOSE decision from the model
    Decision,
    /// Stop loss filled
    StopLoss,
    /// Take profit filled
    TakeProfit,
    /// Estimated liquidation price crossed
    Liquidation,
    /// Replaced by a new open on the same symbol
    Replaced,
    /// Closed on the exchange for a reason we could not observe
    External,
}

/// A point of the bot's total value series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueHistoryPoint {
    pub timestamp: i64,
    pub value: f64,
}
