use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, error};

use super::{parse_decisions, render_prompt, DecisionOutcome, DecisionProvider, ModelTransport};
use crate::types::{Market, Portfolio};

/// Single-shot JSON-mode backend.
pub struct GeminiDecisionProvider {
    transport: Arc<dyn ModelTransport>,
}

impl GeminiDecisionProvider {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self { transport }
    }

    async fn decide(
        &self,
        portfolio: &Portfolio,
        market_data: &[Market],
        template: &str,
    ) -> DecisionOutcome {
        let prompt = render_prompt(template, portfolio, market_data);

        let text = match self.transport.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!("Gemini request failed: {}", e);
                return DecisionOutcome::empty(prompt);
            }
        };

        let decisions = parse_decisions(&text);
        debug!("Gemini returned {} actionable decisions", decisions.len());
        DecisionOutcome { prompt, decisions }
    }
}

impl DecisionProvider for GeminiDecisionProvider {
    fn get_decision<'a>(
        &'a self,
        portfolio: &'a Portfolio,
        market_data: &'a [Market],
        template: &'a str,
    ) -> BoxFuture<'a, DecisionOutcome> {
        self.decide(portfolio, market_data, template).boxed()
    }
}
