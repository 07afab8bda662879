//! Arena endpoints
//!
//! The latest published snapshot plus arena-wide pause control.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::require_secret;
use crate::error::AppError;
use crate::types::ArenaState;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseResponse {
    pub paused: bool,
    pub bots: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_arena))
        .route("/pause", post(pause_arena))
        .route("/resume", post(resume_arena))
}

/// Latest arena snapshot
///
/// GET /api/arena
async fn get_arena(State(state): State<AppState>) -> Json<ArenaState> {
    let broadcaster = state.arena.broadcaster();
    if broadcaster.has_snapshot() {
        Json(broadcaster.latest().state.clone())
    } else {
        Json(state.arena.snapshot().await)
    }
}

/// POST /api/arena/pause
async fn pause_arena(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PauseResponse>, AppError> {
    set_paused(state, headers, true).await
}

/// POST /api/arena/resume
async fn resume_arena(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PauseResponse>, AppError> {
    set_paused(state, headers, false).await
}

async fn set_paused(
    state: AppState,
    headers: HeaderMap,
    paused: bool,
) -> Result<Json<PauseResponse>, AppError> {
    require_secret(&state, &headers)?;
    state.arena.set_all_paused(paused).await;
    Ok(Json(PauseResponse {
        paused,
        bots: state.arena.bots().len(),
    }))
}
