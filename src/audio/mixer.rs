// Audio mixer for combining microphone and system-audio streams
//
// The two capture processes are independently clocked and deliver chunks
// asynchronously, at possibly different native sample rates and channel
// counts. Each source lane down-mixes to mono, resamples to the shared
// output rate, and queues samples; mixed frames are emitted only once
// both lanes can cover them. A lane whose counterpart stays silent past
// a bounded skew is mixed against silence so one dead source can never
// block the other.

use std::collections::VecDeque;
use tracing::{debug, info};

use super::format::{CaptureRole, PcmChunk, StreamFormat};
use super::resample::{downmix_to_mono, LinearResampler};

/// Configuration for a mixer session
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Samples per emitted mixed chunk (default: 10 ms of output)
    pub emit_frames: usize,
    /// How far one lane may run ahead of a silent counterpart before the
    /// missing side is treated as silence (default: 200 ms)
    pub max_skew_ms: u64,
}

impl MixerConfig {
    fn for_rate(output_rate: u32) -> Self {
        Self {
            emit_frames: (output_rate / 100) as usize,
            max_skew_ms: 200,
        }
    }
}

struct SourceLane {
    role: CaptureRole,
    resampler: LinearResampler,
    queue: VecDeque<i16>,
    ended: bool,
}

impl SourceLane {
    fn new(role: CaptureRole, format: StreamFormat, output_rate: u32) -> Self {
        Self {
            role,
            resampler: LinearResampler::new(format.sample_rate, output_rate),
            queue: VecDeque::new(),
            ended: false,
        }
    }

    fn push(&mut self, chunk: &PcmChunk) {
        let mono = downmix_to_mono(&chunk.samples, chunk.format.channels);
        let resampled = self.resampler.process(&mono);
        self.queue.extend(resampled);
    }

    /// Pop up to `count` samples, zero-padding whatever is missing
    fn take(&mut self, count: usize) -> Vec<i16> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.queue.pop_front().unwrap_or(0));
        }
        out
    }
}

/// Mixes two PCM streams into a single mono output stream
///
/// Created at dual-source start, destroyed at stop. The output rate is
/// `max(mic_rate, system_rate)` so neither source is destructively
/// downsampled.
pub struct MixerSession {
    config: MixerConfig,
    output: StreamFormat,
    mic: SourceLane,
    system: SourceLane,
    max_skew_samples: usize,
}

impl MixerSession {
    pub fn new(mic_format: StreamFormat, system_format: StreamFormat) -> Self {
        let output_rate = mic_format.sample_rate.max(system_format.sample_rate);
        let output = StreamFormat::mono(output_rate);
        let config = MixerConfig::for_rate(output_rate);

        info!(
            "Mixer session: mic {}Hz/{}ch + system {}Hz/{}ch -> {}Hz mono",
            mic_format.sample_rate,
            mic_format.channels,
            system_format.sample_rate,
            system_format.channels,
            output_rate
        );

        let max_skew_samples = (output_rate as u64 * config.max_skew_ms / 1000) as usize;

        Self {
            output,
            mic: SourceLane::new(CaptureRole::Microphone, mic_format, output_rate),
            system: SourceLane::new(CaptureRole::SystemAudio, system_format, output_rate),
            config,
            max_skew_samples,
        }
    }

    /// Format of the mixed output stream
    pub fn output_format(&self) -> StreamFormat {
        self.output
    }

    /// Feed one captured chunk; returns any mixed chunks now emittable
    pub fn push(&mut self, chunk: &PcmChunk) -> Vec<PcmChunk> {
        match chunk.source {
            CaptureRole::Microphone => self.mic.push(chunk),
            CaptureRole::SystemAudio => self.system.push(chunk),
        }
        self.drain(false)
    }

    /// Mark one source as finished (its capture stream closed)
    ///
    /// Safe to call when the other source keeps producing: the ended lane
    /// is mixed as silence from here on.
    pub fn source_ended(&mut self, role: CaptureRole) {
        debug!("Mixer source ended: {:?}", role);
        match role {
            CaptureRole::Microphone => self.mic.ended = true,
            CaptureRole::SystemAudio => self.system.ended = true,
        }
    }

    /// Flush everything still buffered, padding the short lane with silence
    pub fn flush(&mut self) -> Vec<PcmChunk> {
        self.mic.ended = true;
        self.system.ended = true;
        self.drain(true)
    }

    fn drain(&mut self, force: bool) -> Vec<PcmChunk> {
        let n = self.config.emit_frames;
        let mut out = Vec::new();

        loop {
            let mic_len = self.mic.queue.len();
            let sys_len = self.system.queue.len();

            let both_ready = mic_len >= n && sys_len >= n;
            // One lane far ahead of a silent counterpart: mix against
            // silence instead of blocking (startup misalignment, or a
            // source that died mid-session).
            let skewed = mic_len.max(sys_len) >= n + self.max_skew_samples;
            let counterpart_dead = (mic_len >= n && self.system.ended)
                || (sys_len >= n && self.mic.ended);
            let leftovers = force && (mic_len > 0 || sys_len > 0);

            if !(both_ready || skewed || counterpart_dead || leftovers) {
                break;
            }

            let take = if both_ready || skewed || counterpart_dead {
                n
            } else {
                mic_len.max(sys_len).min(n)
            };

            let a = self.mic.take(take);
            let b = self.system.take(take);
            out.push(self.combine(&a, &b));
        }

        out
    }

    /// Sum two mono frames sample-by-sample, saturating to the i16 range
    fn combine(&self, a: &[i16], b: &[i16]) -> PcmChunk {
        let samples: Vec<i16> = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x as i32 + y as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect();

        PcmChunk {
            samples,
            format: self.output,
            // Mixed output is keyed to the microphone lane; the raw
            // system stream stays separately observable upstream.
            source: self.mic.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: CaptureRole, format: StreamFormat, samples: Vec<i16>) -> PcmChunk {
        PcmChunk {
            samples,
            format,
            source,
        }
    }

    #[test]
    fn test_output_rate_is_max_of_sources() {
        let mixer = MixerSession::new(StreamFormat::mono(44100), StreamFormat::new(48000, 2));

        assert_eq!(mixer.output_format().sample_rate, 48000);
        assert_eq!(mixer.output_format().channels, 1);
        assert_eq!(mixer.output_format().bits_per_sample, 16);
    }

    #[test]
    fn test_no_emission_until_both_sides_have_data() {
        let fmt = StreamFormat::mono(16000);
        let mut mixer = MixerSession::new(fmt, fmt);

        // 100 ms of mic audio alone: below the 200 ms skew allowance, so
        // nothing should be emitted yet.
        let out = mixer.push(&chunk(CaptureRole::Microphone, fmt, vec![100; 1600]));
        assert!(out.is_empty(), "Mixer should wait for the counterpart");

        // Matching system audio arrives: frames can now be covered.
        let out = mixer.push(&chunk(CaptureRole::SystemAudio, fmt, vec![50; 1600]));
        assert!(!out.is_empty());
        assert!(out.iter().all(|c| c.samples.iter().all(|&s| s == 150)));
    }

    #[test]
    fn test_skewed_lane_mixes_against_silence() {
        let fmt = StreamFormat::mono(16000);
        let mut mixer = MixerSession::new(fmt, fmt);

        // 300 ms of mic audio with a totally silent system lane exceeds
        // the 200 ms skew allowance.
        let out = mixer.push(&chunk(CaptureRole::Microphone, fmt, vec![700; 4800]));

        assert!(!out.is_empty(), "Skewed lane must not block forever");
        assert!(out.iter().all(|c| c.samples.iter().all(|&s| s == 700)));
    }

    #[test]
    fn test_mix_44100_mono_with_48000_stereo() {
        let mic_fmt = StreamFormat::mono(44100);
        let sys_fmt = StreamFormat::new(48000, 2);
        let mut mixer = MixerSession::new(mic_fmt, sys_fmt);

        let mut mixed = Vec::new();
        for _ in 0..10 {
            mixed.extend(mixer.push(&chunk(
                CaptureRole::Microphone,
                mic_fmt,
                vec![12000; 4410],
            )));
            // Stereo: interleaved L/R, 100 ms = 4800 frames = 9600 samples
            mixed.extend(mixer.push(&chunk(
                CaptureRole::SystemAudio,
                sys_fmt,
                vec![8000; 9600],
            )));
        }
        mixed.extend(mixer.flush());

        let total: usize = mixed.iter().map(|c| c.samples.len()).sum();
        assert!(
            (total as i64 - 48000).unsigned_abs() < 500,
            "One second in should be ~one second out, got {} samples",
            total
        );

        assert!(mixed.iter().all(|c| c.format.sample_rate == 48000));
        // Constant 12000 + constant 8000 = 20000 wherever both lanes have
        // real data; silence-padded edges contribute one side alone.
        assert!(mixed
            .iter()
            .flat_map(|c| c.samples.iter())
            .all(|&s| s == 20000 || s == 12000 || s == 8000 || s == 0));
    }

    #[test]
    fn test_summation_saturates_instead_of_wrapping() {
        let fmt = StreamFormat::mono(16000);
        let mut mixer = MixerSession::new(fmt, fmt);

        mixer.push(&chunk(CaptureRole::Microphone, fmt, vec![i16::MAX; 1600]));
        let out = mixer.push(&chunk(CaptureRole::SystemAudio, fmt, vec![i16::MAX; 1600]));

        assert!(!out.is_empty());
        for c in &out {
            assert!(
                c.samples.iter().all(|&s| s == i16::MAX),
                "Full-scale sum must clamp, not wrap"
            );
        }

        let mut mixer = MixerSession::new(fmt, fmt);
        mixer.push(&chunk(CaptureRole::Microphone, fmt, vec![i16::MIN; 1600]));
        let out = mixer.push(&chunk(CaptureRole::SystemAudio, fmt, vec![i16::MIN; 1600]));
        assert!(out
            .iter()
            .flat_map(|c| c.samples.iter())
            .all(|&s| s == i16::MIN));
    }

    #[test]
    fn test_flush_after_one_source_ended() {
        let fmt = StreamFormat::mono(16000);
        let mut mixer = MixerSession::new(fmt, fmt);

        mixer.push(&chunk(CaptureRole::SystemAudio, fmt, vec![300; 800]));
        mixer.source_ended(CaptureRole::Microphone);

        let out = mixer.flush();
        let samples: Vec<i16> = out.into_iter().flat_map(|c| c.samples).collect();

        assert_eq!(samples.len(), 800);
        assert!(samples.iter().all(|&s| s == 300));
    }

    #[test]
    fn test_flush_is_safe_when_empty() {
        let fmt = StreamFormat::mono(16000);
        let mut mixer = MixerSession::new(fmt, fmt);

        assert!(mixer.flush().is_empty());
        assert!(mixer.flush().is_empty());
    }
}
