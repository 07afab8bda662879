//! Model decisions and the per-turn log.

use serde::{Deserialize, Deserializer, Serialize};

/// Action proposed by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AiAction {
    Long,
    Short,
    Close,
    Hold,
}

// Models are inconsistent about casing, so accept "long", "Long" and "LONG".
impl<'de> Deserialize<'de> for AiAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(AiAction::Long),
            "SHORT" => Ok(AiAction::Short),
            "CLOSE" => Ok(AiAction::Close),
            "HOLD" => Ok(AiAction::Hold),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["LONG", "SHORT", "CLOSE", "HOLD"],
            )),
        }
    }
}

/// One structured decision parsed from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiDecision {
    pub action: AiAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Margin in USD.
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub leverage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_position_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl AiDecision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: AiAction::Hold,
            symbol: None,
            size: None,
            leverage: None,
            stop_loss: None,
            take_profit: None,
            close_position_id: None,
            reasoning: reasoning.into(),
        }
    }

    pub fn close(position_id: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            close_position_id: Some(position_id.into()),
            action: AiAction::Close,
            ..Self::hold(reasoning)
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        action: AiAction,
        symbol: impl Into<String>,
        size: f64,
        leverage: f64,
        stop_loss: f64,
        take_profit: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            action,
            symbol: Some(symbol.into()),
            size: Some(size),
            leverage: Some(leverage),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            close_position_id: None,
            reasoning: reasoning.into(),
        }
    }
}

/// Accept numbers, numeric strings ("5000", "$5,000") and null.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',' | 'x' | ' ')).collect();
            cleaned.parse().ok()
        }
        _ => None,
    })
}

/// One entry of a bot's turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotLog {
    pub timestamp: i64,
    pub decisions: Vec<AiDecision>,
    pub prompt: String,
    /// Why decisions were dropped or failed, in readable form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}
