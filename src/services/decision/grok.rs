//! Tool-augmented chat backend.

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{parse_decisions, render_prompt, DecisionOutcome, DecisionProvider, ModelTransport};
use crate::error::{AppError, Result};
use crate::types::{Market, Portfolio};

pub const MODEL: &str = "grok-4-fast-latest";
pub const TEMPERATURE: f64 = 0.5;

/// Tool rounds allowed before the reply content is read as-is.
pub const MAX_TOOL_ROUNDS: usize = 2;

pub const PROMPT_SUFFIX: &str = "\n\nPrice data from AsterDEX. Use tools only for external signals. Output **only** JSON array of decisions.";

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Decoded arguments; `Null` when the model sent unparseable JSON.
    pub arguments: Value,
}

/// Answers tool calls on behalf of the model.
pub trait ToolResolver: Send + Sync {
    fn resolve<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, String>;
}

/// Resolver used when no search backend is wired in.
pub struct CannedToolResolver;

impl ToolResolver for CannedToolResolver {
    fn resolve<'a>(&'a self, call: &'a ToolCall) -> BoxFuture<'a, String> {
        let result = json!({
            "tool": call.name,
            "result": "No external signal available. Decide from price data only.",
        })
        .to_string();
        async move { result }.boxed()
    }
}

/// Tools advertised to the model.
pub fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "search_web",
                "description": "Search web for breaking crypto news, ETF flows, macro events, or on-chain signals.",
                "parameters": {
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "search_x",
                "description": "Search X for real-time sentiment, whale moves, or key account updates.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "usernames": { "type": "array", "items": { "type": "string" } },
                        "since": { "type": "string" }
                    },
                    "required": ["query"]
                }
            }
        }
    ])
}

/// Chat-completion backend with an optional tool round.
pub struct GrokDecisionProvider {
    transport: Arc<dyn ModelTransport>,
    resolver: Arc<dyn ToolResolver>,
}

impl GrokDecisionProvider {
    pub fn new(transport: Arc<dyn ModelTransport>, resolver: Arc<dyn ToolResolver>) -> Self {
        Self {
            transport,
            resolver,
        }
    }

    async fn decide(
        &self,
        portfolio: &Portfolio,
        market_data: &[Market],
        template: &str,
    ) -> DecisionOutcome {
        let prompt = format!(
            "{}{}",
            render_prompt(template, portfolio, market_data),
            PROMPT_SUFFIX
        );

        match self.converse(&prompt).await {
            Ok(content) => {
                let decisions = parse_decisions(&content);
                debug!("Grok returned {} actionable decisions", decisions.len());
                DecisionOutcome { prompt, decisions }
            }
            Err(e) => {
                error!("Grok request failed: {}", e);
                DecisionOutcome::empty(prompt)
            }
        }
    }

    /// Run the conversation until the model answers with plain content.
    async fn converse(&self, prompt: &str) -> Result<String> {
        let mut messages = vec![json!({ "role": "user", "content": prompt })];
        let mut tool_choice = "auto";

        for round in 0..=MAX_TOOL_ROUNDS {
            let payload = request_payload(&messages, tool_choice);
            let response = self.transport.chat_completion(&payload).await?;
            let message = response
                .pointer("/choices/0/message")
                .cloned()
                .ok_or_else(|| AppError::ExternalApi("chat response has no message".to_string()))?;

            let calls = tool_calls(&message);
            if calls.is_empty() || round == MAX_TOOL_ROUNDS {
                if !calls.is_empty() {
                    warn!("Model still requesting tools after {} rounds", MAX_TOOL_ROUNDS);
                }
                return Ok(content_of(&message));
            }

            debug!("Resolving {} tool calls (round {})", calls.len(), round + 1);
            messages.push(message);
            for call in &calls {
                let result = self.resolver.resolve(call).await;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": result,
                }));
            }
            tool_choice = "none";
        }

        Ok(String::new())
    }
}

impl DecisionProvider for GrokDecisionProvider {
    fn get_decision<'a>(
        &'a self,
        portfolio: &'a Portfolio,
        market_data: &'a [Market],
        template: &'a str,
    ) -> BoxFuture<'a, DecisionOutcome> {
        self.decide(portfolio, market_data, template).boxed()
    }
}

fn request_payload(messages: &[Value], tool_choice: &str) -> Value {
    json!({
        "messages": messages,
        "model": MODEL,
        "temperature": TEMPERATURE,
        "stream": false,
        "tools": tool_definitions(),
        "tool_choice": tool_choice,
    })
}

fn content_of(message: &Value) -> String {
    message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn tool_calls(message: &Value) -> Vec<ToolCall> {
    message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    let arguments = match function.get("arguments") {
                        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or(Value::Null),
                        Some(other) => other.clone(),
                        None => Value::Null,
                    };
                    Some(ToolCall {
                        id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                        name: function.get("name").and_then(Value::as_str)?.to_string(),
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
