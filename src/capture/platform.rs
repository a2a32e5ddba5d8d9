// Per-OS recorder strategy
//
// The external recorder binary and its argument shape differ per
// platform (parec on PulseAudio/PipeWire, ffmpeg's avfoundation and
// dshow inputs elsewhere). One strategy is selected at startup and
// injected into everything that needs it; nothing resolves platform
// helpers lazily mid-session.

use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::audio::StreamFormat;

/// One enumerable audio endpoint
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    /// Loopback/monitor endpoints re-expose application output as input
    pub is_loopback: bool,
    /// Native sample rate, when the platform reports one
    pub native_rate: Option<u32>,
}

/// Platform-specific recorder integration
///
/// Implementations build the capture command line, enumerate devices,
/// and report whether the OS supports suspending the capture process.
pub trait PlatformRecorder: Send + Sync {
    /// Name of the external recorder binary to spawn
    fn recorder_binary(&self) -> &str;

    /// Arguments producing raw s16le PCM on stdout for `device`
    /// (`None` = system default input)
    fn capture_args(&self, device: Option<&str>, format: StreamFormat) -> Vec<String>;

    /// Enumerate audio endpoints visible to this platform
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Whether the capture process can be suspended (SIGSTOP/SIGCONT)
    ///
    /// Where this is false, pause is emulated at the stream-consumption
    /// layer and duration accounting stays wall-clock-based either way.
    fn supports_process_suspend(&self) -> bool;

    /// Actionable guidance when the recorder binary is missing
    fn install_hint(&self) -> &str;
}

/// Select the platform strategy once at startup
pub fn default_platform(binary_override: Option<String>) -> Arc<dyn PlatformRecorder> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(PulseRecorder::new(binary_override))
    }
    #[cfg(target_os = "macos")]
    {
        Arc::new(AvFoundationRecorder::new(binary_override))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Arc::new(DirectShowRecorder::new(binary_override))
    }
}

// ============================================================================
// PulseAudio / PipeWire (Linux)
// ============================================================================

/// Captures via `parec`; enumerates via `pactl`
pub struct PulseRecorder {
    binary: String,
}

impl PulseRecorder {
    pub fn new(binary_override: Option<String>) -> Self {
        Self {
            binary: binary_override.unwrap_or_else(|| "parec".to_string()),
        }
    }
}

impl PlatformRecorder for PulseRecorder {
    fn recorder_binary(&self) -> &str {
        &self.binary
    }

    fn capture_args(&self, device: Option<&str>, format: StreamFormat) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(dev) = device {
            args.push("-d".to_string());
            args.push(dev.to_string());
        }
        args.push("--format=s16le".to_string());
        args.push(format!("--rate={}", format.sample_rate));
        args.push(format!("--channels={}", format.channels));
        args.push("--raw".to_string());
        args
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let sources = Command::new("pactl")
            .args(["list", "short", "sources"])
            .output()
            .context("Failed to run pactl")?;
        let sinks = Command::new("pactl")
            .args(["list", "short", "sinks"])
            .output()
            .context("Failed to run pactl")?;

        let mut devices = parse_pactl_sources(&String::from_utf8_lossy(&sources.stdout));
        merge_pactl_sinks(&mut devices, &String::from_utf8_lossy(&sinks.stdout));

        debug!("pactl enumeration returned {} devices", devices.len());
        Ok(devices)
    }

    fn supports_process_suspend(&self) -> bool {
        cfg!(unix)
    }

    fn install_hint(&self) -> &str {
        "Install the PulseAudio utilities (e.g. `apt install pulseaudio-utils`) so `parec` is on PATH"
    }
}

/// Parse `pactl list short sources` output
///
/// Line shape: `index\tname\tdriver\tspec\tstate` where spec looks like
/// `s16le 2ch 44100Hz`.
pub fn parse_pactl_sources(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                return None;
            }
            let name = fields[1].to_string();
            let native_rate = parse_pulse_spec_rate(fields[3]);
            let is_loopback = name.ends_with(".monitor");
            Some(DeviceInfo {
                name,
                is_input: true,
                is_output: false,
                is_loopback,
                native_rate,
            })
        })
        .collect()
}

/// Merge `pactl list short sinks` output: sinks without a matching
/// source entry are output-only endpoints.
pub fn merge_pactl_sinks(devices: &mut Vec<DeviceInfo>, output: &str) {
    for line in output.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let name = fields[1].to_string();
        if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
            existing.is_output = true;
        } else {
            devices.push(DeviceInfo {
                native_rate: parse_pulse_spec_rate(fields[3]),
                name,
                is_input: false,
                is_output: true,
                is_loopback: false,
            });
        }
    }
}

fn parse_pulse_spec_rate(spec: &str) -> Option<u32> {
    spec.split_whitespace()
        .find(|tok| tok.ends_with("Hz"))
        .and_then(|tok| tok.trim_end_matches("Hz").parse().ok())
}

// ============================================================================
// AVFoundation (macOS)
// ============================================================================

/// Captures via ffmpeg's avfoundation input
pub struct AvFoundationRecorder {
    binary: String,
}

impl AvFoundationRecorder {
    pub fn new(binary_override: Option<String>) -> Self {
        Self {
            binary: binary_override.unwrap_or_else(|| "ffmpeg".to_string()),
        }
    }
}

impl PlatformRecorder for AvFoundationRecorder {
    fn recorder_binary(&self) -> &str {
        &self.binary
    }

    fn capture_args(&self, device: Option<&str>, format: StreamFormat) -> Vec<String> {
        // avfoundation input spec is "video:audio"; leading colon selects
        // audio-only capture. "default" picks the system default input.
        let input = format!(":{}", device.unwrap_or("default"));
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-f".to_string(),
            "avfoundation".to_string(),
            "-i".to_string(),
            input,
            "-ar".to_string(),
            format.sample_rate.to_string(),
            "-ac".to_string(),
            format.channels.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-".to_string(),
        ]
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        // Device listing goes to stderr; ffmpeg exits non-zero for the
        // dummy input, which is expected here.
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""])
            .output()
            .context("Failed to run ffmpeg for device listing")?;

        Ok(parse_avfoundation_devices(&String::from_utf8_lossy(
            &output.stderr,
        )))
    }

    fn supports_process_suspend(&self) -> bool {
        true
    }

    fn install_hint(&self) -> &str {
        "Install ffmpeg (e.g. `brew install ffmpeg`) so it is on PATH"
    }
}

/// Parse the audio-device section of `ffmpeg -list_devices` stderr
pub fn parse_avfoundation_devices(stderr: &str) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    let mut in_audio_section = false;

    for line in stderr.lines() {
        if line.contains("AVFoundation audio devices") {
            in_audio_section = true;
            continue;
        }
        if line.contains("AVFoundation video devices") {
            in_audio_section = false;
            continue;
        }
        if !in_audio_section {
            continue;
        }
        // Lines look like: `[AVFoundation ...] [0] MacBook Pro Microphone`
        if let Some(idx) = line.rfind("] ") {
            let name = line[idx + 2..].trim().to_string();
            if name.is_empty() {
                continue;
            }
            let is_loopback = looks_like_loopback(&name);
            devices.push(DeviceInfo {
                name,
                is_input: true,
                is_output: false,
                is_loopback,
                native_rate: None,
            });
        }
    }

    devices
}

// ============================================================================
// DirectShow (Windows)
// ============================================================================

/// Captures via ffmpeg's dshow input; no process suspend on Windows, so
/// pause is emulated by gating stream consumption.
pub struct DirectShowRecorder {
    binary: String,
}

impl DirectShowRecorder {
    pub fn new(binary_override: Option<String>) -> Self {
        Self {
            binary: binary_override.unwrap_or_else(|| "ffmpeg".to_string()),
        }
    }
}

impl PlatformRecorder for DirectShowRecorder {
    fn recorder_binary(&self) -> &str {
        &self.binary
    }

    fn capture_args(&self, device: Option<&str>, format: StreamFormat) -> Vec<String> {
        let input = format!("audio={}", device.unwrap_or("default"));
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-f".to_string(),
            "dshow".to_string(),
            "-i".to_string(),
            input,
            "-ar".to_string(),
            format.sample_rate.to_string(),
            "-ac".to_string(),
            format.channels.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-".to_string(),
        ]
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"])
            .output()
            .context("Failed to run ffmpeg for device listing")?;

        Ok(parse_dshow_devices(&String::from_utf8_lossy(&output.stderr)))
    }

    fn supports_process_suspend(&self) -> bool {
        false
    }

    fn install_hint(&self) -> &str {
        "Install ffmpeg and ensure it is on PATH"
    }
}

/// Parse the `(audio)` entries of `ffmpeg -list_devices -f dshow` stderr
pub fn parse_dshow_devices(stderr: &str) -> Vec<DeviceInfo> {
    stderr
        .lines()
        .filter(|line| line.contains("(audio)"))
        .filter_map(|line| {
            let start = line.find('"')?;
            let end = line[start + 1..].find('"')?;
            let name = line[start + 1..start + 1 + end].to_string();
            let is_loopback = looks_like_loopback(&name);
            Some(DeviceInfo {
                name,
                is_input: true,
                is_output: false,
                is_loopback,
                native_rate: None,
            })
        })
        .collect()
}

/// Name-based classification of virtual-cable/loopback endpoints
pub fn looks_like_loopback(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["monitor", "loopback", "blackhole", "soundflower", "vb-audio", "vb-cable", "stereo mix"]
        .iter()
        .any(|pat| lower.contains(pat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pactl_sources_with_rates() {
        let output = "\
0\talsa_input.pci-0000_00_1f.3.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tRUNNING
1\talsa_output.pci-0000_00_1f.3.analog-stereo.monitor\tmodule-alsa-card.c\ts16le 2ch 48000Hz\tIDLE
";
        let devices = parse_pactl_sources(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].native_rate, Some(44100));
        assert!(!devices[0].is_loopback);
        assert_eq!(devices[1].native_rate, Some(48000));
        assert!(devices[1].is_loopback, "Monitor sources are loopbacks");
    }

    #[test]
    fn test_merge_sinks_marks_output_only() {
        let mut devices = parse_pactl_sources(
            "0\tmic\tmodule.c\ts16le 1ch 16000Hz\tRUNNING\n",
        );
        merge_pactl_sinks(
            &mut devices,
            "5\tlaptop_speakers\tmodule.c\ts16le 2ch 48000Hz\tRUNNING\n",
        );

        let speakers = devices.iter().find(|d| d.name == "laptop_speakers").unwrap();
        assert!(speakers.is_output);
        assert!(!speakers.is_input, "A bare sink cannot be captured from");
    }

    #[test]
    fn test_parse_avfoundation_audio_section_only() {
        let stderr = "\
[AVFoundation indev @ 0x7f8] AVFoundation video devices:
[AVFoundation indev @ 0x7f8] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f8] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8] [0] MacBook Pro Microphone
[AVFoundation indev @ 0x7f8] [1] BlackHole 2ch
";
        let devices = parse_avfoundation_devices(stderr);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "MacBook Pro Microphone");
        assert!(!devices[0].is_loopback);
        assert!(devices[1].is_loopback, "BlackHole is a virtual cable");
    }

    #[test]
    fn test_parse_dshow_audio_entries() {
        let stderr = "\
[dshow @ 000001] \"Integrated Camera\" (video)
[dshow @ 000001] \"Microphone Array (Realtek)\" (audio)
[dshow @ 000001] \"Stereo Mix (Realtek)\" (audio)
";
        let devices = parse_dshow_devices(stderr);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Microphone Array (Realtek)");
        assert!(devices[1].is_loopback);
    }

    #[test]
    fn test_pulse_capture_args_shape() {
        let recorder = PulseRecorder::new(None);
        let args = recorder.capture_args(Some("mic"), StreamFormat::mono(44100));

        assert_eq!(
            args,
            vec!["-d", "mic", "--format=s16le", "--rate=44100", "--channels=1", "--raw"]
        );

        // Default device: no -d flag at all
        let args = recorder.capture_args(None, StreamFormat::mono(16000));
        assert!(!args.contains(&"-d".to_string()));
    }
}
