//! Bot state as broadcast to spectators.
//!
//! `BotState` is a plain data record. Lifecycle operations live on
//! `services::arena::BotRuntime`, which owns it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{BotLog, Market, Order, Portfolio, ValueHistoryPoint};

/// Newest bot log entries kept per bot.
pub const MAX_BOT_LOGS: usize = 200;

/// Newest value-series points kept per bot.
pub const MAX_VALUE_HISTORY: usize = 2_000;

/// Model backend a persona consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Single-shot JSON-mode model
    Gemini,
    /// Tool-augmented chat model
    Grok,
}

/// Whether a bot places live orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Real,
    Paper,
}

impl TradingMode {
    pub fn is_real(&self) -> bool {
        matches!(self, TradingMode::Real)
    }
}

/// Serializable state of one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotState {
    pub id: String,
    pub name: String,
    /// Persona prompt template, placeholders unresolved.
    pub prompt: String,
    pub provider: ModelProvider,
    pub trading_mode: TradingMode,
    pub initial_balance: f64,
    pub portfolio: Portfolio,
    pub orders: Vec<Order>,
    pub bot_logs: Vec<BotLog>,
    pub value_history: Vec<ValueHistoryPoint>,
    pub is_loading: bool,
    pub is_paused: bool,
    pub realized_pnl: f64,
    pub trade_count: u64,
    pub win_rate: f64,
    /// Symbol -> cooldown expiry (ms).
    pub symbol_cooldowns: HashMap<String, i64>,
}

impl BotState {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt: impl Into<String>,
        provider: ModelProvider,
        trading_mode: TradingMode,
        initial_balance: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
            provider,
            trading_mode,
            initial_balance,
            portfolio: Portfolio::new(initial_balance),
            orders: Vec::new(),
            bot_logs: Vec::new(),
            value_history: Vec::new(),
            is_loading: false,
            is_paused: false,
            realized_pnl: 0.0,
            trade_count: 0,
            win_rate: 0.0,
            symbol_cooldowns: HashMap::new(),
        }
    }

    /// Whether `symbol` is still cooling down at `now_ms`.
    pub fn cooldown_until(&self, symbol: &str, now_ms: i64) -> Option<i64> {
        self.symbol_cooldowns
            .get(symbol)
            .copied()
            .filter(|until| now_ms <= *until)
    }

    /// Append a closed trade and refresh the derived statistics.
    pub fn record_order(&mut self, order: Order) {
        self.realized_pnl += order.pnl;
        self.orders.push(order);
        self.recompute_stats();
    }

    /// Recompute trade count and win rate from the order history.
    pub fn recompute_stats(&mut self) {
        self.trade_count = self.orders.len() as u64;
        let wins = self.orders.iter().filter(|o| o.is_win()).count();
        self.win_rate = if self.orders.is_empty() {
            0.0
        } else {
            wins as f64 / self.orders.len() as f64 * 100.0
        };
    }

    pub fn push_log(&mut self, log: BotLog) {
        self.bot_logs.push(log);
        if self.bot_logs.len() > MAX_BOT_LOGS {
            let excess = self.bot_logs.len() - MAX_BOT_LOGS;
            self.bot_logs.drain(..excess);
        }
    }

    pub fn push_value_point(&mut self, timestamp: i64) {
        self.value_history.push(ValueHistoryPoint {
            timestamp,
            value: self.portfolio.total_value,
        });
        if self.value_history.len() > MAX_VALUE_HISTORY {
            let excess = self.value_history.len() - MAX_VALUE_HISTORY;
            self.value_history.drain(..excess);
        }
    }

    /// Return on the starting balance, in percent.
    pub fn return_pct(&self) -> f64 {
        if self.initial_balance > 0.0 {
            (self.portfolio.total_value - self.initial_balance) / self.initial_balance * 100.0
        } else {
            0.0
        }
    }
}

/// Full snapshot published to spectators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaState {
    pub bots: Vec<BotState>,
    pub market_data: Vec<Market>,
}
