// Audio level metering for the live UI feed
//
// Accumulates RMS/peak over incoming chunks and emits at a throttled
// rate so subscribers see a steady meter instead of one update per
// capture chunk.

use std::time::{Duration, Instant};

use serde::Serialize;

/// One level reading, normalized to 0.0..=1.0 full scale
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelUpdate {
    /// Root-mean-square amplitude over the reporting window
    pub rms: f32,
    /// Maximum absolute sample over the reporting window
    pub peak: f32,
}

/// Computes throttled RMS/peak readings from a sample stream
pub struct LevelMeter {
    interval: Duration,
    last_emit: Instant,
    sum_squares: f64,
    sample_count: u64,
    peak: u16,
}

impl LevelMeter {
    /// Default reporting interval: ~13 updates per second
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(75);

    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: Instant::now(),
            sum_squares: 0.0,
            sample_count: 0,
            peak: 0,
        }
    }

    /// Accumulate a chunk; returns a reading when the interval elapsed
    pub fn push(&mut self, samples: &[i16]) -> Option<LevelUpdate> {
        for &s in samples {
            self.sum_squares += (s as f64) * (s as f64);
            self.peak = self.peak.max(s.unsigned_abs());
        }
        self.sample_count += samples.len() as u64;

        if self.last_emit.elapsed() < self.interval || self.sample_count == 0 {
            return None;
        }

        let rms = (self.sum_squares / self.sample_count as f64).sqrt() / i16::MAX as f64;
        let peak = (self.peak as f32 / i16::MAX as f32).min(1.0);

        self.last_emit = Instant::now();
        self.sum_squares = 0.0;
        self.sample_count = 0;
        self.peak = 0;

        Some(LevelUpdate {
            rms: rms as f32,
            peak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_reads_zero() {
        let mut meter = LevelMeter::new(Duration::ZERO);
        let update = meter.push(&[0; 1600]).expect("Zero interval should emit");

        assert_eq!(update.rms, 0.0);
        assert_eq!(update.peak, 0.0);
    }

    #[test]
    fn test_full_scale_reads_one() {
        let mut meter = LevelMeter::new(Duration::ZERO);
        let update = meter.push(&[i16::MAX; 1600]).unwrap();

        assert!((update.rms - 1.0).abs() < 0.001);
        assert!((update.peak - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_peak_tracks_negative_excursions() {
        let mut meter = LevelMeter::new(Duration::ZERO);
        let update = meter.push(&[0, -16384, 0, 100]).unwrap();

        assert!((update.peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_throttles_between_intervals() {
        let mut meter = LevelMeter::new(Duration::from_secs(3600));

        // First window hasn't elapsed: accumulate silently.
        assert!(meter.push(&[1000; 100]).is_none());
        assert!(meter.push(&[1000; 100]).is_none());
    }
}
