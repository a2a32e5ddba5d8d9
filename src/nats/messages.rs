use serde::{Deserialize, Serialize};

/// Audio chunk message published to NATS for a downstream STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioChunkMessage {
    pub session_id: String,
    pub sequence: u64,
    /// "mixed", "microphone", or "system_audio"
    pub source: String,
    /// Base64-encoded little-endian 16-bit PCM
    pub pcm: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// RFC3339 publish timestamp
    pub timestamp: String,
}

/// Health transition message
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthEventMessage {
    pub status: String,
    pub code: Option<String>,
    pub detail: Option<String>,
    pub total_bytes_received: u64,
    pub timestamp: String,
}
