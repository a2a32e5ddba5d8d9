use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{ChunkEvent, FeedSource, SessionEvents};
use super::state::{
    PauseOutcome, RecordingStatus, ResumeOutcome, SessionState, SessionStatus, StartOutcome,
    StopOutcome,
};
use crate::audio::{
    CaptureRole, LevelMeter, LevelUpdate, MixerSession, PcmChunk, RealTimeWavWriter, StreamFormat,
    WavWriteError,
};
use crate::capture::{CaptureExit, CaptureFactory, CaptureSource};
use crate::device::{DeviceResolver, DEFAULT_DEVICE, VIRTUAL_DEVICE_FALLBACK_RATE};
use crate::health::{HealthCode, HealthMonitor, HealthSnapshot, HealthTracker};

/// Requested rate when neither detection nor configuration decides
const DEFAULT_MIC_RATE: u32 = 16_000;

/// System-audio lanes are requested in stereo; the mixer down-mixes
const SYSTEM_CHANNELS: u16 = 2;

/// How long `stop()` waits for the pipeline to flush and finalize
const PIPELINE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The recording session state machine
///
/// Owns the single [`SessionState`] and every live capture/mixer/writer
/// resource. All mutation funnels through the methods here, and
/// internally-triggered stops (stream errors, write failures) take the
/// same `stop()` path as external callers, so cleanup has exactly one
/// code path.
pub struct SessionController {
    config: SessionConfig,
    resolver: DeviceResolver,
    factory: Arc<dyn CaptureFactory>,
    events: SessionEvents,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    active: Option<ActiveSession>,
}

/// Live resources for the in-flight session
struct ActiveSession {
    captures: Vec<Box<dyn CaptureSource>>,
    pipeline: JoinHandle<()>,
    supervisor: JoinHandle<()>,
    health: HealthMonitor,
    recording_flag: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        resolver: DeviceResolver,
        factory: Arc<dyn CaptureFactory>,
    ) -> Self {
        Self {
            config,
            resolver,
            factory,
            events: SessionEvents::new(),
            inner: Mutex::new(Inner {
                state: SessionState::idle(),
                active: None,
            }),
        }
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Begin a recording session
    ///
    /// Fails while a session is active. Device and sample-rate problems
    /// degrade with warnings wherever recording can still proceed; only
    /// an unusable recorder or an unwritable output file are fatal.
    pub async fn start(self: &Arc<Self>, session_id: Option<String>) -> Result<StartOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_active() {
            bail!("Recording already in progress");
        }

        let session_id =
            session_id.unwrap_or_else(|| format!("meeting-{}", uuid::Uuid::new_v4()));
        info!("Starting recording session: {}", session_id);

        let mut warnings: Vec<String> = Vec::new();

        // Microphone resolution: unknown names degrade to the default.
        let mic = self.resolver.resolve(self.config.microphone_device.as_deref());
        if let Some(w) = mic.warning.clone() {
            warnings.push(w);
        }

        // System-audio resolution: anything that cannot be captured from
        // degrades the session to microphone-only rather than failing.
        let mut system_device: Option<String> = None;
        if let Some(requested) = self.config.system_audio_device.as_deref() {
            if !requested.is_empty() && requested != DEFAULT_DEVICE {
                if self.resolver.is_output_only(requested) {
                    warnings.push(format!(
                        "System audio device '{}' is output-only and cannot be captured from; \
                         recording microphone only",
                        requested
                    ));
                } else {
                    match self.resolver.resolve(Some(requested)).device {
                        Some(dev) => system_device = Some(dev),
                        None => warnings.push(format!(
                            "System audio device '{}' not found; recording microphone only",
                            requested
                        )),
                    }
                }
            }
        }

        // Sample-rate reconciliation: detection wins, then the virtual
        // device heuristic, then configuration. The header must match
        // what the recorder actually emits.
        let configured_rate = self.config.sample_rate;
        let mic_rate = self
            .resolver
            .detect_native_rate(mic.device.as_deref())
            .or_else(|| DeviceResolver::fallback_rate_for(mic.device.as_deref()))
            .or(configured_rate)
            .unwrap_or(DEFAULT_MIC_RATE);
        let mic_format = StreamFormat::mono(mic_rate);

        let system_format = system_device.as_deref().map(|dev| {
            let rate = self
                .resolver
                .detect_native_rate(Some(dev))
                .or_else(|| DeviceResolver::fallback_rate_for(Some(dev)))
                .unwrap_or(VIRTUAL_DEVICE_FALLBACK_RATE);
            StreamFormat::new(rate, SYSTEM_CHANNELS)
        });

        // Spawn captures before opening the writer so a late degrade
        // cannot leave the file's header rate wrong.
        let (exit_tx, exit_rx) = mpsc::channel(4);

        let mut mic_capture = self.factory.create(
            CaptureRole::Microphone,
            mic.device.clone(),
            mic_format,
            exit_tx.clone(),
        );
        let rx_mic = mic_capture
            .start()
            .await
            .context("Failed to start microphone capture")?;

        let mut captures: Vec<Box<dyn CaptureSource>> = vec![mic_capture];
        let mut rx_sys = None;
        if let (Some(dev), Some(fmt)) = (system_device.as_ref(), system_format) {
            let mut cap = self.factory.create(
                CaptureRole::SystemAudio,
                Some(dev.clone()),
                fmt,
                exit_tx.clone(),
            );
            match cap.start().await {
                Ok(rx) => {
                    rx_sys = Some(rx);
                    captures.push(cap);
                }
                Err(e) => {
                    warn!("System audio capture failed to start: {}", e);
                    warnings.push(format!(
                        "System audio capture unavailable ({}); recording microphone only",
                        e
                    ));
                }
            }
        }

        let mixer = match (rx_sys.is_some(), system_format) {
            (true, Some(sys_fmt)) => Some(MixerSession::new(mic_format, sys_fmt)),
            _ => None,
        };
        let output_format = mixer
            .as_ref()
            .map(|m| m.output_format())
            .unwrap_or(mic_format);

        if let Some(cfg_rate) = configured_rate {
            if cfg_rate != output_format.sample_rate {
                info!(
                    "Configured rate {}Hz reconciled to {}Hz from device detection",
                    cfg_rate, output_format.sample_rate
                );
            }
        }

        // Output file
        if let Err(e) = std::fs::create_dir_all(&self.config.output_dir) {
            abort_captures(&mut captures).await;
            return Err(e).context(format!(
                "Failed to create output directory {:?}",
                self.config.output_dir
            ));
        }
        let path = self.config.output_dir.join(format!("{}.wav", session_id));
        let writer = match RealTimeWavWriter::open(&path, output_format) {
            Ok(w) => w,
            Err(e) => {
                abort_captures(&mut captures).await;
                return Err(e).context("Failed to open recording file");
            }
        };

        // Health monitoring
        let tracker = Arc::new(HealthTracker::new());
        let recording_flag = Arc::new(AtomicBool::new(true));
        let mut health = HealthMonitor::new(
            Arc::clone(&tracker),
            Arc::clone(&recording_flag),
            self.events.health_sender(),
        );
        health.start();

        // Chunk pipeline: capture -> (mixer) -> writer + subscribers
        let (werr_tx, werr_rx) = mpsc::channel(1);
        let feed_source = if mixer.is_some() {
            FeedSource::Mixed
        } else {
            FeedSource::Microphone
        };
        let pipeline = tokio::spawn(run_pipeline(
            PipelineContext {
                session_id: Arc::from(session_id.as_str()),
                writer,
                mixer,
                feed_source,
                tracker,
                chunk_tx: self.events.chunk_sender(),
                level_tx: self.events.level_sender(),
                werr_tx,
                meter: LevelMeter::new(LevelMeter::DEFAULT_INTERVAL),
                seq: 0,
                failed: false,
            },
            rx_mic,
            rx_sys,
        ));

        // Supervisor: converts asynchronous failures into health events
        // plus an automatic stop through the public entry point.
        let supervisor = tokio::spawn(supervise(
            Arc::clone(self),
            exit_rx,
            werr_rx,
            self.events.health_sender(),
        ));

        let device_used = mic
            .device
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        let started_at = Utc::now();

        inner.state = SessionState {
            status: RecordingStatus::Recording,
            session_id: Some(session_id.clone()),
            started_at: Some(started_at),
            start_instant: Some(Instant::now()),
            cumulative_paused: Duration::ZERO,
            paused_at: None,
            output_path: Some(path.clone()),
            device_used: Some(device_used.clone()),
            sample_rate: Some(output_format.sample_rate),
        };
        inner.active = Some(ActiveSession {
            captures,
            pipeline,
            supervisor,
            health,
            recording_flag,
        });

        let warning = if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("; "))
        };
        if let Some(w) = &warning {
            warn!("Recording started with warnings: {}", w);
        } else {
            info!(
                "Recording started: {} ({}Hz, {})",
                path.display(),
                output_format.sample_rate,
                device_used
            );
        }

        Ok(StartOutcome {
            success: true,
            session_id,
            started_at,
            file_path: path.display().to_string(),
            device_used,
            sample_rate_used: output_format.sample_rate,
            sample_rate_configured: configured_rate,
            warning,
        })
    }

    /// Suspend capture; duration accounting freezes until resume
    pub async fn pause(&self) -> Result<PauseOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.state.status != RecordingStatus::Recording {
            bail!("Cannot pause: no active recording");
        }

        let active = inner.active.as_mut().expect("active session while recording");
        for cap in active.captures.iter_mut() {
            if let Err(e) = cap.pause().await {
                warn!("Failed to suspend {:?} capture: {}", cap.role(), e);
            }
        }
        active.recording_flag.store(false, Ordering::SeqCst);

        inner.state.paused_at = Some(Instant::now());
        inner.state.status = RecordingStatus::Paused;

        let duration = inner.state.elapsed();
        info!("Recording paused at {:.1}s", duration.as_secs_f64());
        Ok(PauseOutcome {
            success: true,
            duration_secs: duration.as_secs_f64(),
        })
    }

    /// Continue a paused session
    pub async fn resume(&self) -> Result<ResumeOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.state.status != RecordingStatus::Paused {
            bail!("Cannot resume: recording is not paused");
        }

        let active = inner.active.as_mut().expect("active session while paused");
        for cap in active.captures.iter_mut() {
            if let Err(e) = cap.resume().await {
                warn!("Failed to resume {:?} capture: {}", cap.role(), e);
            }
        }
        active.recording_flag.store(true, Ordering::SeqCst);

        if let Some(paused_at) = inner.state.paused_at.take() {
            inner.state.cumulative_paused += paused_at.elapsed();
        }
        inner.state.status = RecordingStatus::Recording;

        info!("Recording resumed");
        Ok(ResumeOutcome {
            success: true,
            started_at: inner.state.started_at.unwrap_or_else(Utc::now),
        })
    }

    /// Stop the session and finalize the file
    ///
    /// Legal from any state: stopping with nothing running succeeds with
    /// zero duration. Every cleanup step is independently best-effort so
    /// a half-dead session still tears down completely.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut inner = self.inner.lock().await;

        let Some(mut active) = inner.active.take() else {
            inner.state = SessionState::idle();
            debug!("Stop requested with no active session");
            return Ok(StopOutcome {
                success: true,
                duration_secs: 0.0,
                file_path: None,
            });
        };

        info!(
            "Stopping recording session: {}",
            inner.state.session_id.as_deref().unwrap_or("?")
        );
        inner.state.status = RecordingStatus::Stopping;
        let duration = inner.state.elapsed();
        let file_path = inner.state.output_path.clone();

        // Detach error handling before terminating anything, so the
        // expected exits below cannot trigger a recursive auto-stop.
        active.supervisor.abort();
        active.recording_flag.store(false, Ordering::SeqCst);
        active.health.stop();

        for cap in active.captures.iter_mut() {
            if let Err(e) = cap.stop().await {
                warn!("Capture {:?} termination: {}", cap.role(), e);
            }
        }

        // Capture streams are closed; the pipeline flushes the mixer and
        // patches the final WAV header.
        match tokio::time::timeout(PIPELINE_DRAIN_TIMEOUT, &mut active.pipeline).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Pipeline task failed during stop: {}", e),
            Err(_) => {
                warn!("Pipeline did not drain in time; aborting");
                active.pipeline.abort();
            }
        }

        inner.state = SessionState::idle();
        info!(
            "Recording stopped ({:.1}s): {}",
            duration.as_secs_f64(),
            file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );

        Ok(StopOutcome {
            success: true,
            duration_secs: duration.as_secs_f64(),
            file_path: file_path.map(|p| p.display().to_string()),
        })
    }

    /// Current session state with a live-computed duration
    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.state.snapshot()
    }

    /// Current capture liveness (healthy when idle)
    pub async fn health(&self) -> HealthSnapshot {
        let inner = self.inner.lock().await;
        match &inner.active {
            Some(active) => active.health.snapshot(),
            None => HealthSnapshot::healthy(),
        }
    }
}

/// Best-effort teardown of captures that started before a fatal error
async fn abort_captures(captures: &mut [Box<dyn CaptureSource>]) {
    for cap in captures.iter_mut() {
        if let Err(e) = cap.stop().await {
            warn!("Cleanup of {:?} capture failed: {}", cap.role(), e);
        }
    }
}

/// Converts asynchronous session failures into health events plus an
/// automatic stop through the same public entry point callers use
async fn supervise(
    controller: Arc<SessionController>,
    mut exit_rx: mpsc::Receiver<CaptureExit>,
    mut werr_rx: mpsc::Receiver<WavWriteError>,
    health_tx: broadcast::Sender<HealthSnapshot>,
) {
    let reason = tokio::select! {
        Some(exit) = exit_rx.recv() => {
            let detail = format!("{:?} capture process exited unexpectedly", exit.role);
            let _ = health_tx.send(HealthSnapshot::error(
                HealthCode::CaptureProcessExit,
                detail.clone(),
            ));
            detail
        }
        Some(err) = werr_rx.recv() => {
            let detail = err.to_string();
            let _ = health_tx.send(HealthSnapshot::error(
                HealthCode::WriteError,
                detail.clone(),
            ));
            detail
        }
        else => return,
    };

    error!("Stream error during recording: {}; stopping session", reason);

    // Detached so `stop()` can abort this supervisor without cancelling
    // the stop itself.
    tokio::spawn(async move {
        if let Err(e) = controller.stop().await {
            error!("Automatic stop after stream error failed: {}", e);
        }
    });
}

// ============================================================================
// Chunk pipeline
// ============================================================================

struct PipelineContext {
    session_id: Arc<str>,
    writer: RealTimeWavWriter,
    mixer: Option<MixerSession>,
    /// How written chunks are tagged on the feed: `Mixed` for
    /// dual-source sessions, `Microphone` otherwise
    feed_source: FeedSource,
    tracker: Arc<HealthTracker>,
    chunk_tx: broadcast::Sender<ChunkEvent>,
    level_tx: broadcast::Sender<LevelUpdate>,
    werr_tx: mpsc::Sender<WavWriteError>,
    meter: LevelMeter,
    seq: u64,
    failed: bool,
}

impl PipelineContext {
    /// Feed one captured chunk through mix, persistence, and fan-out.
    /// Returns false when persistence failed and the pipeline must end.
    fn ingest(&mut self, chunk: PcmChunk) -> bool {
        self.tracker.record(chunk.byte_len());

        // The raw system stream stays observable next to the mix.
        if chunk.source == CaptureRole::SystemAudio {
            self.publish(FeedSource::SystemAudio, &chunk);
        }

        let outputs = match &mut self.mixer {
            Some(mixer) => mixer.push(&chunk),
            None => vec![chunk],
        };

        for out in &outputs {
            if !self.write_out(out) {
                return false;
            }
        }
        true
    }

    fn write_out(&mut self, chunk: &PcmChunk) -> bool {
        if let Err(e) = self.writer.write(&chunk.samples) {
            error!("Recording write failed: {}", e);
            self.failed = true;
            let _ = self.werr_tx.try_send(e);
            return false;
        }

        self.publish(self.feed_source, chunk);

        if let Some(update) = self.meter.push(&chunk.samples) {
            let _ = self.level_tx.send(update);
        }
        true
    }

    fn publish(&mut self, source: FeedSource, chunk: &PcmChunk) {
        let event = ChunkEvent {
            session_id: Arc::clone(&self.session_id),
            source,
            pcm: chunk.to_le_bytes(),
            format: chunk.format,
            seq: self.seq,
        };
        self.seq += 1;
        let _ = self.chunk_tx.send(event);
    }
}

async fn run_pipeline(
    mut ctx: PipelineContext,
    mut rx_mic: mpsc::Receiver<PcmChunk>,
    mut rx_sys: Option<mpsc::Receiver<PcmChunk>>,
) {
    let mut mic_open = true;
    let mut sys_open = rx_sys.is_some();

    while (mic_open || sys_open) && !ctx.failed {
        tokio::select! {
            chunk = rx_mic.recv(), if mic_open => match chunk {
                Some(chunk) => {
                    if !ctx.ingest(chunk) {
                        break;
                    }
                }
                None => {
                    mic_open = false;
                    if let Some(mixer) = &mut ctx.mixer {
                        mixer.source_ended(CaptureRole::Microphone);
                    }
                }
            },
            chunk = async { rx_sys.as_mut().expect("guarded by sys_open").recv().await },
                if sys_open =>
            match chunk {
                Some(chunk) => {
                    if !ctx.ingest(chunk) {
                        break;
                    }
                }
                None => {
                    sys_open = false;
                    if let Some(mixer) = &mut ctx.mixer {
                        mixer.source_ended(CaptureRole::SystemAudio);
                    }
                }
            },
        }
    }

    // Drain whatever the mixer still buffers, then finalize the header.
    if !ctx.failed {
        if let Some(mut mixer) = ctx.mixer.take() {
            for out in mixer.flush() {
                if !ctx.write_out(&out) {
                    break;
                }
            }
        }
    }

    match ctx.writer.close() {
        Ok((path, bytes)) => debug!(
            "Pipeline finished: {} ({} PCM bytes)",
            path.display(),
            bytes
        ),
        Err(e) => warn!("Final WAV finalize failed: {}", e),
    }
}
