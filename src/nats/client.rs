use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::messages::{AudioChunkMessage, HealthEventMessage};
use crate::health::{HealthCode, HealthSnapshot, HealthStatus};
use crate::session::{ChunkEvent, FeedSource, SessionEvents};

pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to a NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish one live-feed chunk to `audio.chunk.<session_id>`
    pub async fn publish_chunk(&self, event: &ChunkEvent) -> Result<()> {
        let subject = format!("audio.chunk.{}", event.session_id);

        let source = match event.source {
            FeedSource::Mixed => "mixed",
            FeedSource::Microphone => "microphone",
            FeedSource::SystemAudio => "system_audio",
        };

        let message = AudioChunkMessage {
            session_id: event.session_id.to_string(),
            sequence: event.seq,
            source: source.to_string(),
            pcm: base64::engine::general_purpose::STANDARD.encode(&event.pcm),
            sample_rate: event.format.sample_rate,
            channels: event.format.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject, payload.into())
            .await
            .context("Failed to publish audio chunk")?;

        Ok(())
    }

    /// Publish a health transition to `audio.health`
    pub async fn publish_health(&self, snapshot: &HealthSnapshot) -> Result<()> {
        let status = match snapshot.status {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
        };
        let code = snapshot.code.map(|c| {
            match c {
                HealthCode::NoAudioData => "NO_AUDIO_DATA",
                HealthCode::AudioDataInterrupted => "AUDIO_DATA_INTERRUPTED",
                HealthCode::WriteError => "WRITE_ERROR",
                HealthCode::CaptureProcessExit => "CAPTURE_PROCESS_EXIT",
            }
            .to_string()
        });

        let message = HealthEventMessage {
            status: status.to_string(),
            code,
            detail: snapshot.detail.clone(),
            total_bytes_received: snapshot.total_bytes_received,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish("audio.health", payload.into())
            .await
            .context("Failed to publish health event")?;

        Ok(())
    }
}

/// Forward the session's chunk and health broadcasts to NATS
///
/// A lagging relay drops events (with a warning) rather than slowing
/// capture; NATS being down never affects recording.
pub fn spawn_relay(client: NatsClient, events: &SessionEvents) -> JoinHandle<()> {
    let mut chunk_rx = events.subscribe_chunks();
    let mut health_rx = events.subscribe_health();

    tokio::spawn(async move {
        info!("NATS relay started");

        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => match chunk {
                    Ok(event) => {
                        if let Err(e) = client.publish_chunk(&event).await {
                            error!("Failed to publish audio chunk: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("NATS relay lagged; dropped {} chunk events", n);
                    }
                    Err(RecvError::Closed) => break,
                },
                health = health_rx.recv() => match health {
                    Ok(snapshot) => {
                        if let Err(e) = client.publish_health(&snapshot).await {
                            error!("Failed to publish health event: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("NATS relay lagged; dropped {} health events", n);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("NATS relay stopped");
    })
}
