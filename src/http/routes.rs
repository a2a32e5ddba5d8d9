use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Service health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/session/pause", post(handlers::pause_session))
        .route("/session/resume", post(handlers::resume_session))
        // Session queries
        .route("/session/status", get(handlers::get_session_status))
        .route("/session/health", get(handlers::get_session_health))
        // Request logging + cross-origin control clients
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
