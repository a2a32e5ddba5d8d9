pub mod client;
pub mod messages;

pub use client::{spawn_relay, NatsClient};
pub use messages::{AudioChunkMessage, HealthEventMessage};
