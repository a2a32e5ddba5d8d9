use anyhow::Result;
use serde::Deserialize;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub nats: Option<NatsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub output_dir: String,
    /// Requested sample rate; device detection may override it
    pub sample_rate: Option<u32>,
    pub microphone_device: Option<String>,
    /// Virtual-cable device for system audio; presence enables
    /// dual-source recording
    pub system_audio_device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecorderConfig {
    /// Override for the platform's recorder binary name
    pub binary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session-controller view of this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            output_dir: self.audio.output_dir.clone().into(),
            microphone_device: self.audio.microphone_device.clone(),
            system_audio_device: self.audio.system_audio_device.clone(),
            sample_rate: self.audio.sample_rate,
        }
    }
}
