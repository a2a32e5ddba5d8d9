use serde::{Deserialize, Serialize};

/// Which capture stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureRole {
    /// Microphone input (user's voice)
    Microphone,
    /// System audio loopback (applications, remote participants)
    SystemAudio,
}

/// PCM stream description
///
/// Every stream carries one of these: each capture process, the mixed
/// output, and the written file. The format written into a WAV header
/// must equal the format of the bytes behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample (this core only produces 16)
    pub bits_per_sample: u16,
}

impl StreamFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Bytes of PCM per second of audio in this format
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }
}

/// Audio sample data in flight (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct PcmChunk {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Format of the samples
    pub format: StreamFormat,
    /// Stream this chunk was captured from
    pub source: CaptureRole,
}

impl PcmChunk {
    /// Size of this chunk on the wire, in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Serialize samples as little-endian bytes (wire/WAV order)
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Parse raw little-endian 16-bit PCM bytes into samples
///
/// Returns the parsed samples plus the number of trailing bytes that did
/// not form a complete sample (callers carry those into the next read).
pub fn parse_s16le(bytes: &[u8]) -> (Vec<i16>, usize) {
    let complete = bytes.len() / 2 * 2;
    let samples = bytes[..complete]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    (samples, bytes.len() - complete)
}
