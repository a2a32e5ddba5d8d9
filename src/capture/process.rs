// External capture process adapter
//
// One CaptureProcess wraps one running recorder binary: its stdout is
// pumped into a bounded channel of PCM chunks, its stderr is drained to
// diagnostics, and termination is graceful-then-forceful with a bounded
// grace period. Exits are tagged expected/unexpected so the controller
// can ignore the terminations it asked for.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::platform::PlatformRecorder;
use crate::audio::{parse_s16le, CaptureRole, PcmChunk, StreamFormat};

/// How long a capture process gets to exit before it is killed
pub const TERMINATION_GRACE: Duration = Duration::from_millis(100);

/// Capture chunk channel depth (backpressure bound)
const CHUNK_CHANNEL_DEPTH: usize = 64;

/// Termination notice for one capture stream
#[derive(Debug, Clone, Copy)]
pub struct CaptureExit {
    pub role: CaptureRole,
    /// True when the controller asked for this termination
    pub expected: bool,
}

/// One controllable capture stream
///
/// The process adapter is the production implementation; tests substitute
/// scripted sources through the same seam.
#[async_trait]
pub trait CaptureSource: Send {
    /// Spawn/begin capture; returns the chunk stream
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmChunk>>;

    /// Suspend capture (process suspend where supported, stream gating
    /// elsewhere)
    async fn pause(&mut self) -> Result<()>;

    /// Continue a suspended capture
    async fn resume(&mut self) -> Result<()>;

    /// Terminate, escalating to a forceful kill after the grace period
    async fn stop(&mut self) -> Result<()>;

    fn role(&self) -> CaptureRole;

    fn format(&self) -> StreamFormat;
}

/// Builds capture sources for the controller
pub trait CaptureFactory: Send + Sync {
    fn create(
        &self,
        role: CaptureRole,
        device: Option<String>,
        format: StreamFormat,
        exits: mpsc::Sender<CaptureExit>,
    ) -> Box<dyn CaptureSource>;
}

/// Spawns recorder processes configured by the injected platform strategy
pub struct ProcessCaptureFactory {
    platform: Arc<dyn PlatformRecorder>,
}

impl ProcessCaptureFactory {
    pub fn new(platform: Arc<dyn PlatformRecorder>) -> Self {
        Self { platform }
    }
}

impl CaptureFactory for ProcessCaptureFactory {
    fn create(
        &self,
        role: CaptureRole,
        device: Option<String>,
        format: StreamFormat,
        exits: mpsc::Sender<CaptureExit>,
    ) -> Box<dyn CaptureSource> {
        Box::new(ProcessCapture::new(
            Arc::clone(&self.platform),
            role,
            device,
            format,
            exits,
        ))
    }
}

/// A running external recorder plus its output stream
pub struct ProcessCapture {
    platform: Arc<dyn PlatformRecorder>,
    role: CaptureRole,
    device: Option<String>,
    format: StreamFormat,
    child: Option<Child>,
    /// Set before any controller-initiated termination
    expected_exit: Arc<AtomicBool>,
    /// Pause emulation for platforms without process suspend: while set,
    /// incoming bytes are read and discarded
    gate_paused: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    exits: mpsc::Sender<CaptureExit>,
}

impl ProcessCapture {
    pub fn new(
        platform: Arc<dyn PlatformRecorder>,
        role: CaptureRole,
        device: Option<String>,
        format: StreamFormat,
        exits: mpsc::Sender<CaptureExit>,
    ) -> Self {
        Self {
            platform,
            role,
            device,
            format,
            child: None,
            expected_exit: Arc::new(AtomicBool::new(false)),
            gate_paused: Arc::new(AtomicBool::new(false)),
            reader_task: None,
            stderr_task: None,
            exits,
        }
    }
}

#[async_trait]
impl CaptureSource for ProcessCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<PcmChunk>> {
        if self.child.is_some() {
            bail!("Capture already started");
        }

        let binary = self.platform.recorder_binary().to_string();
        let args = self
            .platform
            .capture_args(self.device.as_deref(), self.format);

        info!(
            "Spawning recorder for {:?}: {} {}",
            self.role,
            binary,
            args.join(" ")
        );

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    anyhow::anyhow!(
                        "Recorder '{}' not found. {}",
                        binary,
                        self.platform.install_hint()
                    )
                } else {
                    anyhow::Error::new(e).context(format!("Failed to spawn recorder '{}'", binary))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .context("Recorder stdout was not piped")?;
        let stderr = child
            .stderr
            .take()
            .context("Recorder stderr was not piped")?;

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);

        let role = self.role;
        let format = self.format;
        let gate = Arc::clone(&self.gate_paused);
        let expected = Arc::clone(&self.expected_exit);
        let exits = self.exits.clone();

        self.reader_task = Some(tokio::spawn(async move {
            pump_stdout(stdout, role, format, tx, gate, expected, exits).await;
        }));

        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("recorder[{:?}] stderr: {}", role, line);
            }
        }));

        self.child = Some(child);
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<()> {
        #[cfg(unix)]
        if self.platform.supports_process_suspend() {
            if let Some(child) = &self.child {
                signal_child(child, libc::SIGSTOP)?;
                debug!("Capture {:?} suspended (SIGSTOP)", self.role);
                return Ok(());
            }
        }

        self.gate_paused.store(true, Ordering::SeqCst);
        debug!("Capture {:?} paused at stream layer", self.role);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        #[cfg(unix)]
        if self.platform.supports_process_suspend() {
            if let Some(child) = &self.child {
                signal_child(child, libc::SIGCONT)?;
                debug!("Capture {:?} resumed (SIGCONT)", self.role);
                return Ok(());
            }
        }

        self.gate_paused.store(false, Ordering::SeqCst);
        debug!("Capture {:?} resumed at stream layer", self.role);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        // Mark the termination expected before touching the process so
        // the reader's EOF is not reported as a stream error.
        self.expected_exit.store(true, Ordering::SeqCst);

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SIGCONT first: a suspended process cannot handle SIGTERM.
            unsafe {
                libc::kill(pid as i32, libc::SIGCONT);
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
            Ok(status) => {
                debug!("Capture {:?} exited: {:?}", self.role, status.ok());
            }
            Err(_) => {
                warn!(
                    "Capture {:?} did not exit within {:?}; killing",
                    self.role, TERMINATION_GRACE
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        if let Some(task) = self.reader_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(500), task).await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        Ok(())
    }

    fn role(&self) -> CaptureRole {
        self.role
    }

    fn format(&self) -> StreamFormat {
        self.format
    }
}

/// Read raw s16le PCM from the recorder's stdout into the chunk channel
async fn pump_stdout(
    mut stdout: tokio::process::ChildStdout,
    role: CaptureRole,
    format: StreamFormat,
    tx: mpsc::Sender<PcmChunk>,
    gate: Arc<AtomicBool>,
    expected: Arc<AtomicBool>,
    exits: mpsc::Sender<CaptureExit>,
) {
    let mut buf = [0u8; 8192];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if gate.load(Ordering::SeqCst) {
                    // Stream-layer pause: keep draining the pipe so the
                    // recorder does not block, but drop the audio.
                    carry.clear();
                    continue;
                }

                carry.extend_from_slice(&buf[..n]);
                let (samples, rest) = parse_s16le(&carry);
                let tail = carry.split_off(carry.len() - rest);
                carry = tail;

                if samples.is_empty() {
                    continue;
                }

                let chunk = PcmChunk {
                    samples,
                    format,
                    source: role,
                };
                if tx.send(chunk).await.is_err() {
                    // Consumer is gone; the session is tearing down and
                    // this is not a stream error.
                    debug!("Capture {:?} consumer dropped", role);
                    return;
                }
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    warn!("Capture {:?} read error: {}", role, e);
                    break;
                }
            }
        }
    }

    if expected.load(Ordering::SeqCst) {
        debug!("Capture {:?} stream closed (expected)", role);
    } else {
        warn!("Capture {:?} stream closed unexpectedly", role);
        let _ = exits.try_send(CaptureExit {
            role,
            expected: false,
        });
    }
}

#[cfg(unix)]
fn signal_child(child: &Child, sig: i32) -> Result<()> {
    let pid = child.id().context("Capture process already exited")?;
    let rc = unsafe { libc::kill(pid as i32, sig) };
    if rc != 0 {
        bail!(
            "kill({}) failed for pid {}: {}",
            sig,
            pid,
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::capture::platform::DeviceInfo;

    /// Platform stub whose "recorder" is a shell one-liner
    struct ShellPlatform {
        script: String,
    }

    impl PlatformRecorder for ShellPlatform {
        fn recorder_binary(&self) -> &str {
            "/bin/sh"
        }

        fn capture_args(&self, _device: Option<&str>, _format: StreamFormat) -> Vec<String> {
            vec!["-c".to_string(), self.script.clone()]
        }

        fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
            Ok(Vec::new())
        }

        fn supports_process_suspend(&self) -> bool {
            true
        }

        fn install_hint(&self) -> &str {
            ""
        }
    }

    fn capture_for(script: &str) -> (ProcessCapture, mpsc::Receiver<CaptureExit>) {
        let (exit_tx, exit_rx) = mpsc::channel(4);
        let capture = ProcessCapture::new(
            Arc::new(ShellPlatform {
                script: script.to_string(),
            }),
            CaptureRole::Microphone,
            None,
            StreamFormat::mono(16000),
            exit_tx,
        );
        (capture, exit_rx)
    }

    #[tokio::test]
    async fn test_reads_pcm_from_stdout() -> Result<()> {
        // 4 bytes = 2 samples: 0x0102, 0x0304 (little-endian)
        let (mut capture, _exits) = capture_for("printf '\\001\\002\\003\\004'");

        let mut rx = capture.start().await?;
        let chunk = rx.recv().await.expect("Should receive one chunk");

        assert_eq!(chunk.samples, vec![0x0201, 0x0403]);
        assert_eq!(chunk.source, CaptureRole::Microphone);

        capture.stop().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_reported() -> Result<()> {
        let (mut capture, mut exits) = capture_for("exit 1");

        let _rx = capture.start().await?;
        let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv())
            .await
            .expect("Exit event should arrive")
            .expect("Exit channel open");

        assert!(!exit.expected, "Uncommanded death must be unexpected");
        capture.stop().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_marks_exit_expected() -> Result<()> {
        let (mut capture, mut exits) = capture_for("sleep 30");

        let _rx = capture.start().await?;
        capture.stop().await?;

        // Commanded termination produces no unexpected-exit event.
        let got = tokio::time::timeout(Duration::from_millis(300), exits.recv()).await;
        assert!(got.is_err(), "Expected exit must not raise an event");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_binary_names_recorder() {
        struct MissingPlatform;
        impl PlatformRecorder for MissingPlatform {
            fn recorder_binary(&self) -> &str {
                "hark-no-such-recorder"
            }
            fn capture_args(&self, _d: Option<&str>, _f: StreamFormat) -> Vec<String> {
                Vec::new()
            }
            fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
                Ok(Vec::new())
            }
            fn supports_process_suspend(&self) -> bool {
                true
            }
            fn install_hint(&self) -> &str {
                "install it"
            }
        }

        let (exit_tx, _exit_rx) = mpsc::channel(1);
        let mut capture = ProcessCapture::new(
            Arc::new(MissingPlatform),
            CaptureRole::Microphone,
            None,
            StreamFormat::mono(16000),
            exit_tx,
        );

        let err = capture.start().await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("hark-no-such-recorder"));
        assert!(msg.contains("install it"), "Hint should be actionable: {}", msg);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() -> Result<()> {
        let (mut capture, _exits) = capture_for("sleep 30");

        let _rx = capture.start().await?;
        capture.stop().await?;
        capture.stop().await?;
        Ok(())
    }
}
