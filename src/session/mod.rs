//! Recording session management
//!
//! This module provides the session state machine that:
//! - Resolves devices and reconciles sample rates before capture
//! - Drives one or two external capture processes
//! - Wires the dual-source mixer and the incrementally-valid WAV writer
//! - Publishes level/health/chunk events to subscribers
//! - Guarantees idempotent, single-path cleanup under errors

mod config;
mod controller;
mod events;
mod state;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use events::{ChunkEvent, FeedSource, SessionEvents};
pub use state::{
    PauseOutcome, RecordingStatus, ResumeOutcome, SessionState, SessionStatus, StartOutcome,
    StopOutcome,
};
