use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the recording session controller
///
/// Read once at startup from the settings collaborator; never re-read
/// mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory recordings are written into
    pub output_dir: PathBuf,

    /// Configured microphone device name ("default"/absent = system default)
    pub microphone_device: Option<String>,

    /// Configured system-audio (virtual cable) device name; presence
    /// requests dual-source recording
    pub system_audio_device: Option<String>,

    /// Configured sample rate; device detection overrides this so the
    /// WAV header matches what is actually captured
    pub sample_rate: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            microphone_device: None,
            system_audio_device: None,
            sample_rate: None,
        }
    }
}
