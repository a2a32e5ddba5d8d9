// Broadcast fan-out for session observers
//
// Levels, health transitions, and the live chunk feed are published on
// tokio broadcast channels: a slow subscriber lags (and is told so by
// the channel) instead of blocking capture.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::{LevelUpdate, StreamFormat};
use crate::health::HealthSnapshot;

/// Which feed a published chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Mixed output (dual-source sessions)
    Mixed,
    /// Microphone-only output (single-source sessions)
    Microphone,
    /// Raw system-audio stream, published alongside the mix
    SystemAudio,
}

/// One PCM chunk on the live feed (e.g. for live transcription)
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub session_id: Arc<str>,
    pub source: FeedSource,
    /// Little-endian 16-bit PCM
    pub pcm: Vec<u8>,
    pub format: StreamFormat,
    pub seq: u64,
}

const LEVEL_CHANNEL_DEPTH: usize = 32;
const HEALTH_CHANNEL_DEPTH: usize = 32;
const CHUNK_CHANNEL_DEPTH: usize = 256;

/// The session's subscription channels (multiple subscribers allowed)
#[derive(Clone)]
pub struct SessionEvents {
    level_tx: broadcast::Sender<LevelUpdate>,
    health_tx: broadcast::Sender<HealthSnapshot>,
    chunk_tx: broadcast::Sender<ChunkEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self {
            level_tx: broadcast::channel(LEVEL_CHANNEL_DEPTH).0,
            health_tx: broadcast::channel(HEALTH_CHANNEL_DEPTH).0,
            chunk_tx: broadcast::channel(CHUNK_CHANNEL_DEPTH).0,
        }
    }

    /// Periodic RMS/peak readings (≤ ~13 Hz)
    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelUpdate> {
        self.level_tx.subscribe()
    }

    /// Health state transitions
    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthSnapshot> {
        self.health_tx.subscribe()
    }

    /// Live PCM chunk feed, tagged by [`FeedSource`]
    pub fn subscribe_chunks(&self) -> broadcast::Receiver<ChunkEvent> {
        self.chunk_tx.subscribe()
    }

    pub(crate) fn level_sender(&self) -> broadcast::Sender<LevelUpdate> {
        self.level_tx.clone()
    }

    pub(crate) fn health_sender(&self) -> broadcast::Sender<HealthSnapshot> {
        self.health_tx.clone()
    }

    pub(crate) fn chunk_sender(&self) -> broadcast::Sender<ChunkEvent> {
        self.chunk_tx.clone()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
