//! Bot API endpoints
//!
//! Read access to each persona's state and per-bot pause control.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::require_secret;
use crate::error::AppError;
use crate::types::{BotState, ModelProvider, TradingMode};
use crate::AppState;

/// One row of the leaderboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSummary {
    pub id: String,
    pub name: String,
    pub provider: ModelProvider,
    pub trading_mode: TradingMode,
    pub is_paused: bool,
    pub total_value: f64,
    pub return_pct: f64,
    pub realized_pnl: f64,
    pub trade_count: u64,
    pub win_rate: f64,
    pub open_positions: usize,
}

impl From<&BotState> for BotSummary {
    fn from(bot: &BotState) -> Self {
        Self {
            id: bot.id.clone(),
            name: bot.name.clone(),
            provider: bot.provider,
            trading_mode: bot.trading_mode,
            is_paused: bot.is_paused,
            total_value: bot.portfolio.total_value,
            return_pct: bot.return_pct(),
            realized_pnl: bot.realized_pnl,
            trade_count: bot.trade_count,
            win_rate: bot.win_rate,
            open_positions: bot.portfolio.positions.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotsListResponse {
    pub bots: Vec<BotSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPauseResponse {
    pub bot_id: String,
    pub paused: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bots))
        .route("/:bot_id", get(get_bot))
        .route("/:bot_id/pause", post(pause_bot))
        .route("/:bot_id/resume", post(resume_bot))
}

/// List all bots, best total value first
///
/// GET /api/bots
async fn list_bots(State(state): State<AppState>) -> Json<BotsListResponse> {
    let snapshot = state.arena.snapshot().await;
    let mut bots: Vec<BotSummary> = snapshot.bots.iter().map(BotSummary::from).collect();
    bots.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
    let total = bots.len();
    Json(BotsListResponse { bots, total })
}

/// Full state of one bot
///
/// GET /api/bots/:bot_id
async fn get_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
) -> Result<Json<BotState>, AppError> {
    let bot = state
        .arena
        .bot(&bot_id)
        .ok_or_else(|| AppError::NotFound(format!("Bot not found: {}", bot_id)))?;
    Ok(Json(bot.snapshot().await))
}

/// POST /api/bots/:bot_id/pause
async fn pause_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BotPauseResponse>, AppError> {
    set_paused(state, bot_id, headers, true).await
}

/// POST /api/bots/:bot_id/resume
async fn resume_bot(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BotPauseResponse>, AppError> {
    set_paused(state, bot_id, headers, false).await
}

async fn set_paused(
    state: AppState,
    bot_id: String,
    headers: HeaderMap,
    paused: bool,
) -> Result<Json<BotPauseResponse>, AppError> {
    require_secret(&state, &headers)?;
    if !state.arena.set_paused(&bot_id, paused).await {
        return Err(AppError::NotFound(format!("Bot not found: {}", bot_id)));
    }
    Ok(Json(BotPauseResponse { bot_id, paused }))
}
