use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Recording session lifecycle
///
/// `idle → recording ⇄ paused → stopping → idle`, with a direct
/// `recording → idle` edge taken by error-triggered auto-stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Paused,
    Stopping,
}

/// The single mutable session record, owned by the controller
///
/// Mutated only through controller transition methods; reset to idle on
/// stop or fatal cleanup.
#[derive(Debug)]
pub struct SessionState {
    pub status: RecordingStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub start_instant: Option<Instant>,
    /// Total wall-clock time spent paused so far
    pub cumulative_paused: Duration,
    /// When the current pause began (while status is `Paused`)
    pub paused_at: Option<Instant>,
    pub output_path: Option<PathBuf>,
    pub device_used: Option<String>,
    pub sample_rate: Option<u32>,
}

impl SessionState {
    pub fn idle() -> Self {
        Self {
            status: RecordingStatus::Idle,
            session_id: None,
            started_at: None,
            start_instant: None,
            cumulative_paused: Duration::ZERO,
            paused_at: None,
            output_path: None,
            device_used: None,
            sample_rate: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            RecordingStatus::Recording | RecordingStatus::Paused
        )
    }

    /// Recording time so far, excluding paused wall-clock time
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.start_instant else {
            return Duration::ZERO;
        };
        // While paused the clock is frozen at the pause point.
        let gross = match self.paused_at {
            Some(paused_at) => paused_at.duration_since(start),
            None => start.elapsed(),
        };
        gross.saturating_sub(self.cumulative_paused)
    }

    pub fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            status: self.status,
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            duration_secs: self.elapsed().as_secs_f64(),
            output_path: self
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
            device_used: self.device_used.clone(),
            sample_rate: self.sample_rate,
        }
    }
}

/// Serializable status view returned by `status()` / the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub status: RecordingStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub output_path: Option<String>,
    pub device_used: Option<String>,
    pub sample_rate: Option<u32>,
}

/// Result of a successful `start()`
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub success: bool,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub file_path: String,
    pub device_used: String,
    /// Rate actually written to the WAV header
    pub sample_rate_used: u32,
    /// Rate from configuration, before detection reconciled it
    pub sample_rate_configured: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Result of `stop()`; stopping with no session returns zeros
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub success: bool,
    pub duration_secs: f64,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PauseOutcome {
    pub success: bool,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeOutcome {
    pub success: bool,
    pub started_at: DateTime<Utc>,
}
