pub mod arena;
pub mod bots;
pub mod health;

use axum::http::HeaderMap;
use axum::Router;

use crate::error::AppError;
use crate::relay::signer::secrets_match;
use crate::AppState;

/// Header carrying the shared control secret.
pub const SECRET_HEADER: &str = "x-broadcast-secret";

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/arena", arena::router())
        .nest("/api/bots", bots::router())
}

/// Gate for control endpoints. Without a configured secret they are disabled.
pub(crate) fn require_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.broadcast_secret.as_deref() else {
        return Err(AppError::Unauthorized("control endpoints are disabled".to_string()));
    };
    match headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        Some(given) if secrets_match(given, expected) => Ok(()),
        Some(_) => Err(AppError::Unauthorized("invalid secret".to_string())),
        None => Err(AppError::Unauthorized(format!("missing {} header", SECRET_HEADER))),
    }
}
