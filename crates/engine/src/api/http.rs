//! HTTP routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use chessroom_domain::GameId;

use super::websocket::ws_handler;
use crate::app::App;
use crate::session::{HubError, RoomSnapshot};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/game/ws/{game_id}", get(ws_handler))
        .route("/api/v1/game/{game_id}/state", get(game_state))
}

async fn health() -> &'static str {
    "ok"
}

async fn game_state(
    State(app): State<Arc<App>>,
    Path(game_id): Path<String>,
) -> Result<Json<RoomSnapshot>, ApiError> {
    let game_id = GameId::parse(game_id).map_err(|_| ApiError::NotFound)?;
    let snapshot = app.hub.snapshot(&game_id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(snapshot))
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Unavailable(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::Unavailable(_) => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable",
            )
                .into_response(),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::NotFound(_) => ApiError::NotFound,
            HubError::Store(_) | HubError::Closed => {
                tracing::warn!(error = %e, "Game lookup failed");
                ApiError::Unavailable(e.to_string())
            }
        }
    }
}
