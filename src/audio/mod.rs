pub mod format;
pub mod level;
pub mod mixer;
pub mod resample;
pub mod wav;

pub use format::{parse_s16le, CaptureRole, PcmChunk, StreamFormat};
pub use level::{LevelMeter, LevelUpdate};
pub use mixer::{MixerConfig, MixerSession};
pub use resample::{downmix_to_mono, LinearResampler};
pub use wav::{RealTimeWavWriter, WavWriteError, WriteFailureKind, HEADER_PATCH_THRESHOLD};
