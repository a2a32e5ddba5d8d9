//! Capture liveness monitoring
//!
//! Watches byte-arrival timestamps for the whole session: bytes from
//! either capture source count as "alive", since either stream alone is
//! informative. Checks run on a fixed interval and only while the
//! session is recording; transitions are published on a broadcast
//! channel so subscribers see state changes, not a 5-second heartbeat.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How often liveness is evaluated
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// How long without data before the session is considered stalled
pub const STALL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthCode {
    /// Nothing has ever arrived and the stall threshold elapsed
    NoAudioData,
    /// Data flowed earlier but has stopped
    AudioDataInterrupted,
    /// Persisting a chunk failed (disk full, permissions)
    WriteError,
    /// A capture process died without being asked to
    CaptureProcessExit,
}

/// Point-in-time liveness report; recomputed, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub code: Option<HealthCode>,
    pub detail: Option<String>,
    pub last_data_age_ms: Option<u64>,
    pub total_bytes_received: u64,
}

impl HealthSnapshot {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            code: None,
            detail: None,
            last_data_age_ms: None,
            total_bytes_received: 0,
        }
    }

    /// Error snapshot for failures detected outside the interval check
    /// (write failures, unexpected process exits)
    pub fn error(code: HealthCode, detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            code: Some(code),
            detail: Some(detail.into()),
            last_data_age_ms: None,
            total_bytes_received: 0,
        }
    }
}

/// Lock-free byte-arrival bookkeeping shared with the chunk pipeline
pub struct HealthTracker {
    epoch: Instant,
    /// Millis-since-epoch of the last arrival, offset by +1; 0 = never
    last_data: AtomicU64,
    total_bytes: AtomicU64,
    /// Millis-since-epoch when counters were last reset
    started: AtomicU64,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_data: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            started: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Zero the counters (session start and stop)
    pub fn reset(&self) {
        self.last_data.store(0, Ordering::SeqCst);
        self.total_bytes.store(0, Ordering::SeqCst);
        self.started.store(self.now_ms(), Ordering::SeqCst);
    }

    /// Note the arrival of `bytes` from any source
    pub fn record(&self, bytes: usize) {
        self.last_data.store(self.now_ms() + 1, Ordering::SeqCst);
        self.total_bytes.fetch_add(bytes as u64, Ordering::SeqCst);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    /// Evaluate liveness against a stall threshold
    pub fn evaluate(&self, stall_threshold: Duration) -> HealthSnapshot {
        let now = self.now_ms();
        let stall_ms = stall_threshold.as_millis() as u64;
        let total = self.total_bytes();
        let last = self.last_data.load(Ordering::SeqCst);

        if last == 0 {
            let since_start = now.saturating_sub(self.started.load(Ordering::SeqCst));
            if since_start >= stall_ms {
                return HealthSnapshot {
                    status: HealthStatus::Error,
                    code: Some(HealthCode::NoAudioData),
                    detail: Some("No audio data has arrived since recording started".to_string()),
                    last_data_age_ms: None,
                    total_bytes_received: total,
                };
            }
            return HealthSnapshot {
                status: HealthStatus::Healthy,
                code: None,
                detail: None,
                last_data_age_ms: None,
                total_bytes_received: total,
            };
        }

        let age = now.saturating_sub(last - 1);
        if age >= stall_ms {
            return HealthSnapshot {
                status: HealthStatus::Warning,
                code: Some(HealthCode::AudioDataInterrupted),
                detail: Some(format!("No audio data for {} ms", age)),
                last_data_age_ms: Some(age),
                total_bytes_received: total,
            };
        }

        HealthSnapshot {
            status: HealthStatus::Healthy,
            code: None,
            detail: None,
            last_data_age_ms: Some(age),
            total_bytes_received: total,
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic liveness checker for one recording session
pub struct HealthMonitor {
    tracker: Arc<HealthTracker>,
    recording: Arc<AtomicBool>,
    events: broadcast::Sender<HealthSnapshot>,
    check_interval: Duration,
    stall_threshold: Duration,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new(
        tracker: Arc<HealthTracker>,
        recording: Arc<AtomicBool>,
        events: broadcast::Sender<HealthSnapshot>,
    ) -> Self {
        Self {
            tracker,
            recording,
            events,
            check_interval: CHECK_INTERVAL,
            stall_threshold: STALL_THRESHOLD,
            task: None,
        }
    }

    #[cfg(test)]
    pub fn with_timing(mut self, check_interval: Duration, stall_threshold: Duration) -> Self {
        self.check_interval = check_interval;
        self.stall_threshold = stall_threshold;
        self
    }

    /// Reset counters and begin periodic checks
    pub fn start(&mut self) {
        self.tracker.reset();

        let tracker = Arc::clone(&self.tracker);
        let recording = Arc::clone(&self.recording);
        let events = self.events.clone();
        let stall_threshold = self.stall_threshold;
        let check_interval = self.check_interval;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut previous: Option<(HealthStatus, Option<HealthCode>)> = None;

            loop {
                ticker.tick().await;

                // Paused/stopping sessions are not evaluated.
                if !recording.load(Ordering::SeqCst) {
                    continue;
                }

                let snapshot = tracker.evaluate(stall_threshold);
                let key = (snapshot.status, snapshot.code);
                if previous != Some(key) {
                    debug!(
                        "Audio health changed: {:?} ({:?})",
                        snapshot.status, snapshot.code
                    );
                    previous = Some(key);
                    let _ = events.send(snapshot);
                }
            }
        }));

        info!(
            "Health monitor started ({}s interval, {}s stall threshold)",
            self.check_interval.as_secs(),
            self.stall_threshold.as_secs()
        );
    }

    /// Stop checks and zero the counters
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.tracker.reset();
        info!("Health monitor stopped");
    }

    /// Current liveness, computed on demand
    pub fn snapshot(&self) -> HealthSnapshot {
        self.tracker.evaluate(self.stall_threshold)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_ever_becomes_error() {
        let tracker = HealthTracker::new();
        tracker.reset();

        // Threshold zero: "never" trips immediately.
        let snap = tracker.evaluate(Duration::ZERO);
        assert_eq!(snap.status, HealthStatus::Error);
        assert_eq!(snap.code, Some(HealthCode::NoAudioData));
        assert_eq!(snap.total_bytes_received, 0);
    }

    #[test]
    fn test_healthy_before_threshold() {
        let tracker = HealthTracker::new();
        tracker.reset();

        let snap = tracker.evaluate(Duration::from_secs(10));
        assert_eq!(snap.status, HealthStatus::Healthy);
        assert!(snap.code.is_none());
    }

    #[test]
    fn test_any_byte_makes_it_healthy() {
        let tracker = HealthTracker::new();
        tracker.reset();
        tracker.record(3200);

        let snap = tracker.evaluate(Duration::from_secs(10));
        assert_eq!(snap.status, HealthStatus::Healthy);
        assert_eq!(snap.total_bytes_received, 3200);
        assert!(snap.last_data_age_ms.is_some());
    }

    #[test]
    fn test_interrupted_after_data_stops() {
        let tracker = HealthTracker::new();
        tracker.reset();
        tracker.record(100);

        // Zero threshold: any age counts as stalled.
        let snap = tracker.evaluate(Duration::ZERO);
        assert_eq!(snap.status, HealthStatus::Warning);
        assert_eq!(snap.code, Some(HealthCode::AudioDataInterrupted));
    }

    #[test]
    fn test_reset_clears_counters() {
        let tracker = HealthTracker::new();
        tracker.record(5000);
        tracker.reset();

        assert_eq!(tracker.total_bytes(), 0);
        let snap = tracker.evaluate(Duration::from_secs(10));
        assert!(snap.last_data_age_ms.is_none());
    }

    #[tokio::test]
    async fn test_monitor_emits_on_state_change_only() {
        let tracker = Arc::new(HealthTracker::new());
        let recording = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = broadcast::channel(16);

        let mut monitor = HealthMonitor::new(Arc::clone(&tracker), recording, tx)
            .with_timing(Duration::from_millis(10), Duration::from_millis(50));
        monitor.start();

        // First transition: healthy (no data, under threshold).
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should emit initial state")
            .unwrap();
        assert_eq!(first.status, HealthStatus::Healthy);

        // After the stall threshold with no data at all: NO_AUDIO_DATA.
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Should emit error transition")
            .unwrap();
        assert_eq!(second.status, HealthStatus::Error);
        assert_eq!(second.code, Some(HealthCode::NoAudioData));

        monitor.stop();
    }

    #[tokio::test]
    async fn test_monitor_is_noop_while_not_recording() {
        let tracker = Arc::new(HealthTracker::new());
        let recording = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = broadcast::channel(16);

        let mut monitor = HealthMonitor::new(Arc::clone(&tracker), recording, tx)
            .with_timing(Duration::from_millis(10), Duration::ZERO);
        monitor.start();

        let got = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(got.is_err(), "Paused sessions must not be evaluated");

        monitor.stop();
    }
}
