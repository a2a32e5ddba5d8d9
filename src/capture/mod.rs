//! External capture process management
//!
//! This module owns everything about the recorder processes:
//! - `platform`: per-OS command construction and device enumeration
//! - `process`: the capture process adapter (spawn, pause, terminate)

pub mod platform;
pub mod process;

pub use platform::{default_platform, DeviceInfo, PlatformRecorder};
pub use process::{
    CaptureExit, CaptureFactory, CaptureSource, ProcessCapture, ProcessCaptureFactory,
    TERMINATION_GRACE,
};
