use super::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate one)
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start the recording session
pub async fn start_session(
    State(state): State<AppState>,
    body: Option<Json<StartSessionRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    info!("Start requested (session_id: {:?})", req.session_id);

    match state.controller.start(req.session_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            let msg = e.to_string();
            let status = if msg.contains("already in progress") {
                StatusCode::CONFLICT
            } else {
                error!("Failed to start recording: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(ErrorResponse { error: msg })).into_response()
        }
    }
}

/// POST /session/stop
/// Stop the recording session (idempotent)
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            error!("Failed to stop recording: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/pause
pub async fn pause_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.pause().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /session/resume
pub async fn resume_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.resume().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /session/status
/// Current session state with a live-computed duration
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

/// GET /session/health
/// Current capture liveness
pub async fn get_session_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.health().await)
}

/// GET /health
/// Service health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
