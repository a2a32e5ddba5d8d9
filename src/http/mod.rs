//! HTTP API server for external control
//!
//! This module provides a REST API for controlling the recording session:
//! - POST /session/start - Start recording
//! - POST /session/stop - Stop recording (idempotent)
//! - POST /session/pause - Pause recording
//! - POST /session/resume - Resume recording
//! - GET /session/status - Query session state
//! - GET /session/health - Query capture liveness
//! - GET /health - Service health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
