use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{signer, RelayError, RelayState, GEMINI_URL, GROK_URL};
use crate::error::AppError;
use crate::services::orders::now_ms;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeBody {
    pub method: String,
    pub endpoint: String,
    pub bot_id: Option<String>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub prompt: String,
}

pub fn router() -> Router<RelayState> {
    Router::new()
        .route("/asterdex", get(tickers))
        .route("/asterdex/exchangeInfo", get(exchange_info))
        .route("/aster/trade", post(trade))
        .route("/gemini", post(gemini))
        .route("/grok", post(grok))
        .fallback(not_found)
}

async fn not_found(uri: axum::http::Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Route not found for path: {}", uri.path()) })),
    )
        .into_response()
}

/// GET /asterdex
async fn tickers(State(state): State<RelayState>) -> Result<Response, RelayError> {
    let api_key = state
        .config
        .credentials
        .values()
        .next()
        .map(|c| c.api_key.clone())
        .ok_or_else(|| AppError::Config("exchange API key not configured".to_string()))?;

    let url = format!("{}/fapi/v1/ticker/24hr", state.config.exchange_base_url);
    let response = state
        .client
        .get(&url)
        .header("X-MBX-APIKEY", api_key)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(AppError::ExternalApi(format!("Asterdex API Error: {}", response.status())).into());
    }
    passthrough(response).await
}

/// GET /asterdex/exchangeInfo
async fn exchange_info(State(state): State<RelayState>) -> Result<Response, RelayError> {
    let url = format!("{}/fapi/v1/exchangeInfo", state.config.exchange_base_url);
    let response = state.client.get(&url).send().await?;
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AppError::ExternalApi(format!("Asterdex Exchange Info Error: {}", text)).into());
    }
    passthrough(response).await
}

/// POST /aster/trade
///
/// Signs the params with the bot's secret and forwards the call unchanged.
async fn trade(
    State(state): State<RelayState>,
    Json(body): Json<TradeBody>,
) -> Result<Response, RelayError> {
    let bot_id = body
        .bot_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Request to /aster/trade must include a 'botId'.".to_string()))?;
    let credentials = state.config.credentials_for(bot_id)?;
    let method = parse_method(&body.method)?;

    let query = signer::signed_query(&body.params, now_ms(), &credentials.api_secret)?;
    let url = format!("{}{}?{}", state.config.exchange_base_url, body.endpoint, query);
    debug!("[{}] {} {}", bot_id, method, body.endpoint);

    let response = state
        .client
        .request(method, &url)
        .header("X-MBX-APIKEY", &credentials.api_key)
        .send()
        .await?;
    passthrough(response).await
}

/// POST /gemini
async fn gemini(
    State(state): State<RelayState>,
    Json(body): Json<PromptBody>,
) -> Result<Json<Value>, RelayError> {
    let key = state
        .config
        .gemini_api_key
        .as_deref()
        .ok_or_else(|| AppError::Config("GEMINI_API_KEY not configured".to_string()))?;

    let response = state
        .client
        .post(GEMINI_URL)
        .query(&[("key", key)])
        .json(&json!({
            "contents": [{ "parts": [{ "text": body.prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" },
        }))
        .send()
        .await?;
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AppError::ExternalApi(format!("Gemini API Error: {}", text)).into());
    }

    let data: Value = response.json().await?;
    Ok(Json(json!({ "text": candidate_text(&data) })))
}

/// POST /grok
async fn grok(
    State(state): State<RelayState>,
    Json(payload): Json<Value>,
) -> Result<Response, RelayError> {
    let key = state
        .config
        .xai_api_key
        .as_deref()
        .ok_or_else(|| AppError::Config("XAI_API_KEY not configured".to_string()))?;

    let response = state
        .client
        .post(GROK_URL)
        .bearer_auth(key)
        .json(&payload)
        .send()
        .await?;
    passthrough(response).await
}

/// First candidate's text, `null` when absent.
pub fn candidate_text(data: &Value) -> Value {
    data.pointer("/candidates/0/content/parts/0/text")
        .cloned()
        .unwrap_or(Value::Null)
}

fn parse_method(raw: &str) -> Result<Method, AppError> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => Err(AppError::BadRequest(format!("unsupported method: {}", other))),
    }
}

/// Upstream body and status, as JSON.
async fn passthrough(response: reqwest::Response) -> Result<Response, RelayError> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let bytes = response.bytes().await?;
    info!("Upstream responded {} ({} bytes)", status, bytes.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes.to_vec()))
        .map_err(|e| RelayError(AppError::Internal(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotCredentials, RelayConfig};
    use axum::http::Request;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> RelayState {
        let mut credentials = HashMap::new();
        credentials.insert(
            "bot_degen".to_string(),
            BotCredentials {
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
        );
        RelayState::new(RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            exchange_base_url: "http://127.0.0.1:9".to_string(),
            gemini_api_key: None,
            xai_api_key: None,
            credentials,
            request_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    async fn call(request: Request<Body>) -> (StatusCode, Value) {
        let response = router().with_state(state()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_bot_is_an_error() {
        let (status, body) = call(post_json(
            "/aster/trade",
            json!({ "method": "POST", "endpoint": "/fapi/v1/order", "botId": "bot_nobody", "params": {} }),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "No API key configuration found for botId: bot_nobody");
    }

    #[tokio::test]
    async fn test_missing_bot_id() {
        let (status, body) = call(post_json(
            "/aster/trade",
            json!({ "method": "GET", "endpoint": "/fapi/v2/balance" }),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("botId"));
    }

    #[tokio::test]
    async fn test_unconfigured_model_keys() {
        let (status, body) = call(post_json("/gemini", json!({ "prompt": "hi" }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "GEMINI_API_KEY not configured");

        let (_, body) = call(post_json("/grok", json!({ "messages": [] }))).await;
        assert_eq!(body["error"], "XAI_API_KEY not configured");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let (status, body) = call(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found for path: /nope");
    }

    #[test]
    fn test_candidate_text() {
        let data = json!({ "candidates": [{ "content": { "parts": [{ "text": "[]" }] } }] });
        assert_eq!(candidate_text(&data), json!("[]"));
        assert_eq!(candidate_text(&json!({})), Value::Null);
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("delete").unwrap(), Method::DELETE);
        assert!(parse_method("PATCH").is_err());
    }
}
