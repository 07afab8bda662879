//! Persona presets

use serde::{Deserialize, Serialize};

use crate::types::{ModelProvider, TradingMode};

/// Starting balance of a paper bot, in USD.
pub const PAPER_INITIAL_BALANCE: f64 = 10_000.0;

/// Starting balance assumed for a live bot before its account is read.
pub const REAL_INITIAL_BALANCE: f64 = 950.0;

/// Static description of one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot's unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Model backend consulted each turn
    pub provider: ModelProvider,

    /// Prompt template with `{{...}}` placeholders
    pub prompt: String,
}

impl BotConfig {
    fn new(id: &str, name: &str, provider: ModelProvider, voice: &str, leverage: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider,
            prompt: template(name, voice, leverage),
        }
    }

    /// Hedge-fund escapee, high leverage, lives for volatility.
    pub fn escaped_monkey() -> Self {
        Self::new(
            "bot_monkey",
            "Escaped Monkey",
            ModelProvider::Gemini,
            "You broke out of a quant fund's server room. Brilliant, aggressive and a little unhinged, you chase volatility.",
            "between 10x and 50x",
        )
    }

    /// Patient strategist, trades only high-conviction setups.
    pub fn mastermind() -> Self {
        Self::new(
            "bot_mastermind",
            "Mastermind",
            ModelProvider::Gemini,
            "You are a cold, patient strategist. You trade only setups with a clear edge and you size by conviction.",
            "between 3x and 15x",
        )
    }

    /// Momentum chaser, maximum degeneracy.
    pub fn degen() -> Self {
        Self::new(
            "bot_degen",
            "Degen",
            ModelProvider::Grok,
            "You are a full-time degen who reads crypto twitter all night. You follow momentum and narrative.",
            "between 20x and 75x",
        )
    }

    /// Trades by planetary alignment.
    pub fn astrologer() -> Self {
        Self::new(
            "bot_astrologer",
            "Astrologer",
            ModelProvider::Gemini,
            "You read the charts and the stars. Every decision must cite a planetary alignment alongside the price action.",
            "between 2x and 20x",
        )
    }

    /// Meme-driven visionary.
    pub fn elon() -> Self {
        Self::new(
            "bot_elon",
            "Elon",
            ModelProvider::Grok,
            "You are a meme-loving tech visionary. You favour DOGE, bold calls and first-principles takes.",
            "between 5x and 50x",
        )
    }

    pub fn ani() -> Self {
        Self::new(
            "bot_ani",
            "Ani",
            ModelProvider::Grok,
            "You are Ani, a cheerful anime companion who trades with a sharp eye for sentiment shifts.",
            "between 5x and 25x",
        )
    }

    pub fn mika() -> Self {
        Self::new(
            "bot_mika",
            "Mika",
            ModelProvider::Grok,
            "You are Mika, a calm contrarian who fades crowded trades and respects risk.",
            "between 2x and 10x",
        )
    }

    /// Every persona, in display order.
    pub fn all() -> Vec<Self> {
        vec![
            Self::escaped_monkey(),
            Self::mastermind(),
            Self::degen(),
            Self::astrologer(),
            Self::elon(),
            Self::ani(),
            Self::mika(),
        ]
    }

    /// Personas selected by `enabled` (empty = all).
    pub fn enabled(enabled: &[String]) -> Vec<Self> {
        Self::all()
            .into_iter()
            .filter(|c| enabled.is_empty() || enabled.iter().any(|id| id == &c.id))
            .collect()
    }

    /// Trading mode for this persona given the live-trading allowlist.
    pub fn trading_mode(&self, real_trading_bots: &[String]) -> TradingMode {
        if real_trading_bots.iter().any(|id| id == &self.id) {
            TradingMode::Real
        } else {
            TradingMode::Paper
        }
    }
}

/// Initial balance for a trading mode.
pub fn initial_balance(mode: TradingMode) -> f64 {
    match mode {
        TradingMode::Real => REAL_INITIAL_BALANCE,
        TradingMode::Paper => PAPER_INITIAL_BALANCE,
    }
}

fn template(name: &str, voice: &str, leverage: &str) -> String {
    format!(
        r#"You are "{name}", a perpetual-futures trading bot. {voice}

Portfolio:
- Total value: {{{{totalValue}}}}
- Available balance: {{{{availableBalance}}}}
- Unrealized PnL: {{{{unrealizedPnl}}}}

Open positions:
{{{{openPositions}}}}

Market:
{{{{marketData}}}}

Respond with a JSON array of decisions and nothing else.
- action is LONG, SHORT, CLOSE or HOLD. Return [] to hold.
- LONG and SHORT require symbol, size, leverage, stopLoss and takeProfit.
- CLOSE requires closePositionId.
- size is USD margin, at least $50 and never above the available balance.
- leverage {leverage}.
- Every open and close pays a 3% fee.
- After closing a symbol you may not reopen it for 30 minutes.
- reasoning is one short sentence in character.

Example:
{{ "action": "LONG", "symbol": "BTCUSDT", "size": 500, "leverage": 10, "stopLoss": 68000, "takeProfit": 72000, "reasoning": "..." }}"#
    )
}
