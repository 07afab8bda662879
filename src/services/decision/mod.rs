//! Decision Provider
//!
//! Turns a portfolio and market snapshot into trading decisions by asking a
//! model. Two backends share one contract: a single-shot JSON-mode model and
//! a tool-augmented chat model.

pub mod gemini;
pub mod grok;
pub mod parse;
pub mod prompt;

pub use gemini::GeminiDecisionProvider;
pub use grok::{CannedToolResolver, GrokDecisionProvider, ToolResolver};
pub use parse::{extract_json_array, parse_decisions};
pub use prompt::render_prompt;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::sources::RelayClient;
use crate::types::{AiDecision, Market, ModelProvider, Portfolio};

/// Rendered prompt plus the actionable decisions parsed from the reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionOutcome {
    pub prompt: String,
    pub decisions: Vec<AiDecision>,
}

impl DecisionOutcome {
    /// A turn where the model produced nothing usable.
    pub fn empty(prompt: String) -> Self {
        Self {
            prompt,
            decisions: Vec::new(),
        }
    }
}

/// Source of trading decisions.
///
/// Implementations never fail: transport and parse errors yield an outcome
/// with no decisions.
pub trait DecisionProvider: Send + Sync {
    fn get_decision<'a>(
        &'a self,
        portfolio: &'a Portfolio,
        market_data: &'a [Market],
        template: &'a str,
    ) -> BoxFuture<'a, DecisionOutcome>;
}

/// Wire access to the model endpoints.
pub trait ModelTransport: Send + Sync {
    /// Single-shot JSON-mode generation: prompt in, text out.
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Chat-completion call with the full payload.
    fn chat_completion<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Value>>;
}

impl ModelTransport for RelayClient {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        RelayClient::generate(self, prompt).boxed()
    }

    fn chat_completion<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<Value>> {
        RelayClient::chat_completion(self, payload).boxed()
    }
}

/// Build the provider for a persona's backend.
pub fn provider_for(
    provider: ModelProvider,
    transport: Arc<dyn ModelTransport>,
) -> Arc<dyn DecisionProvider> {
    match provider {
        ModelProvider::Gemini => Arc::new(GeminiDecisionProvider::new(transport)),
        ModelProvider::Grok => Arc::new(GrokDecisionProvider::new(
            transport,
            Arc::new(CannedToolResolver),
        )),
    }
}
