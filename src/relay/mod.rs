//! Signing Relay
//!
//! Small HTTP service that holds the exchange and model secrets. The arena
//! talks to it through `sources::RelayClient`; nothing else sees a key.

pub mod routes;
pub mod signer;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::config::RelayConfig;
use crate::error::{AppError, Result};

pub const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";
pub const GROK_URL: &str = "https://api.x.ai/v1/chat/completions";

/// State shared by the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub client: Client,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Arena-Relay/1.0")
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

/// Every relay failure renders as `{error}` with status 500.
#[derive(Debug)]
pub struct RelayError(pub AppError);

impl From<AppError> for RelayError {
    fn from(e: AppError) -> Self {
        RelayError(e)
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError(e.into())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError(e.into())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        error!("Relay error: {}", self.0);
        let message = match self.0 {
            AppError::Config(msg)
            | AppError::BadRequest(msg)
            | AppError::ExternalApi(msg)
            | AppError::Internal(msg) => msg,
            other => other.to_string(),
        };
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
            .into_response()
    }
}
