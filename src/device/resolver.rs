// Device name validation and native-rate detection
//
// Resolution never fails hard: an unknown name degrades to the system
// default with a warning so recording can still proceed, and every
// probe failure degrades to "unknown" rather than an error.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::capture::{DeviceInfo, PlatformRecorder};

/// Sentinel meaning "use the system default input"
pub const DEFAULT_DEVICE: &str = "default";

/// Documented heuristic: virtual-cable/aggregate devices that refuse
/// rate probing are assumed to run at 48 kHz. A pragmatic guess, not a
/// capability query.
pub const VIRTUAL_DEVICE_FALLBACK_RATE: u32 = 48_000;

const VIRTUAL_DEVICE_PATTERNS: &[&str] = &[
    "blackhole",
    "soundflower",
    "vb-audio",
    "vb-cable",
    "loopback",
    "monitor",
    "aggregate",
    "virtual",
];

/// Outcome of resolving a configured device name
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    /// `None` means the system default device
    pub device: Option<String>,
    pub warning: Option<String>,
}

/// Validates configured device names against the platform device list
pub struct DeviceResolver {
    platform: Arc<dyn PlatformRecorder>,
}

impl DeviceResolver {
    pub fn new(platform: Arc<dyn PlatformRecorder>) -> Self {
        Self { platform }
    }

    /// Resolve a configured name to a concrete capture device
    pub fn resolve(&self, name: Option<&str>) -> ResolvedDevice {
        let name = match name {
            None => return ResolvedDevice { device: None, warning: None },
            Some(n) if n.is_empty() || n == DEFAULT_DEVICE => {
                return ResolvedDevice { device: None, warning: None }
            }
            Some(n) => n,
        };

        match self.platform.list_devices() {
            Ok(devices) => {
                if devices.iter().any(|d| d.name == name && d.is_input) {
                    ResolvedDevice {
                        device: Some(name.to_string()),
                        warning: None,
                    }
                } else {
                    warn!("Configured audio device '{}' not found", name);
                    ResolvedDevice {
                        device: None,
                        warning: Some(format!(
                            "Audio device '{}' not found; recording from the system default instead",
                            name
                        )),
                    }
                }
            }
            Err(e) => {
                // Enumeration itself failed: trust the configured name and
                // let the recorder report if it cannot open the device.
                debug!("Device enumeration failed ({}); passing '{}' through", e, name);
                ResolvedDevice {
                    device: Some(name.to_string()),
                    warning: None,
                }
            }
        }
    }

    /// Probe the device's native sample rate; `None` when inconclusive
    pub fn detect_native_rate(&self, name: Option<&str>) -> Option<u32> {
        let name = name?;
        let devices = self.platform.list_devices().ok()?;
        let rate = devices
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.native_rate);

        if let Some(rate) = rate {
            debug!("Device '{}' reports native rate {}Hz", name, rate);
        }
        rate
    }

    /// 48 kHz fallback for virtual/aggregate device families whose rate
    /// could not be detected
    pub fn fallback_rate_for(name: Option<&str>) -> Option<u32> {
        let lower = name?.to_lowercase();
        VIRTUAL_DEVICE_PATTERNS
            .iter()
            .any(|pat| lower.contains(pat))
            .then_some(VIRTUAL_DEVICE_FALLBACK_RATE)
    }

    /// Whether the named device is an output endpoint that cannot be
    /// captured from (e.g. speakers selected as a "system audio" source)
    pub fn is_output_only(&self, name: &str) -> bool {
        match self.platform.list_devices() {
            Ok(devices) => devices
                .iter()
                .any(|d| d.name == name && d.is_output && !d.is_input),
            Err(_) => false,
        }
    }

    /// Device list passthrough for diagnostics surfaces
    pub fn list_devices(&self) -> anyhow::Result<Vec<DeviceInfo>> {
        self.platform.list_devices()
    }
}
