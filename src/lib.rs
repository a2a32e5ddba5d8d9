pub mod audio;
pub mod capture;
pub mod config;
pub mod device;
pub mod health;
pub mod http;
pub mod nats;
pub mod session;

pub use audio::{
    CaptureRole, LevelMeter, LevelUpdate, MixerSession, PcmChunk, RealTimeWavWriter, StreamFormat,
    WavWriteError, WriteFailureKind,
};
pub use capture::{
    default_platform, CaptureExit, CaptureFactory, CaptureSource, DeviceInfo, PlatformRecorder,
    ProcessCaptureFactory,
};
pub use config::Config;
pub use device::{DeviceResolver, ResolvedDevice};
pub use health::{HealthCode, HealthMonitor, HealthSnapshot, HealthStatus, HealthTracker};
pub use http::{create_router, AppState};
pub use nats::{spawn_relay, NatsClient};
pub use session::{
    ChunkEvent, FeedSource, RecordingStatus, SessionConfig, SessionController, SessionStatus,
    StartOutcome, StopOutcome,
};
