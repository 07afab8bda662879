//! Client for the signing relay.
//!
//! Every exchange and model call leaves the process through the relay, which
//! holds the secrets. The core only knows the request/response contract.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, Result};

/// HTTP method forwarded to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeMethod {
    Get,
    Post,
    Delete,
}

/// Body of `POST /aster/trade`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest<'a> {
    pub method: TradeMethod,
    pub endpoint: &'a str,
    pub bot_id: &'a str,
    pub params: Value,
}

/// Relay REST client.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a new relay client. Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AppError::Config("relay URL is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent("Arena/1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Unauthenticated GET returning JSON, e.g. `/asterdex`.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalApi(format!(
                "relay GET {} returned {}",
                path, status
            )));
        }
        Ok(response.json().await?)
    }

    /// Signed exchange call forwarded under `bot_id`'s credentials.
    pub async fn trade(
        &self,
        method: TradeMethod,
        endpoint: &str,
        bot_id: &str,
        params: Value,
    ) -> Result<Value> {
        let url = format!("{}/aster/trade", self.base_url);
        let body = TradeRequest {
            method,
            endpoint,
            bot_id,
            params,
        };
        debug!("[{}] {:?} {}", bot_id, method, endpoint);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(exchange_error(endpoint, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Single-shot JSON-mode model: `{prompt}` in, `{text}` out.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/gemini", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "model endpoint returned {}: {}",
                status,
                truncate(&text, 200)
            )));
        }
        let body: Value = response.json().await?;
        body.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::ExternalApi("model response has no text".to_string()))
    }

    /// Chat-completion passthrough.
    pub async fn chat_completion(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/grok", self.base_url);
        let response = self.client.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "chat endpoint returned {}: {}",
                status,
                truncate(&text, 200)
            )));
        }
        Ok(response.json().await?)
    }
}

/// Build the error for a failed exchange call, preferring the exchange's `msg`.
pub fn exchange_error(endpoint: &str, status: StatusCode, body: &str) -> AppError {
    let msg = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("msg")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    match msg {
        Some(msg) => AppError::ExternalApi(format!("ASTER API Error ({}): {}", endpoint, msg)),
        None => AppError::ExternalApi(format!(
            "ASTER API Error ({}): {} - {}",
            endpoint,
            status.as_u16(),
            truncate(body, 100)
        )),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
