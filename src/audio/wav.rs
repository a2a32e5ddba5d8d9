// Incrementally-valid WAV persistence
//
// The transcription reader opens the file while recording is still in
// progress, so the header's length fields are patched every ~32 KB of
// appended PCM. Between patches the declared data length may lag the
// bytes on disk, but it never overstates them.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::format::StreamFormat;

/// Bytes appended between header patches (~1 s of 16 kHz mono audio)
pub const HEADER_PATCH_THRESHOLD: u64 = 32 * 1024;

/// Classification of a persistence failure
///
/// Disk-full and permission failures are fatal to the session: the
/// controller aborts recording instead of silently dropping audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailureKind {
    DiskFull,
    PermissionDenied,
    Io,
}

/// Error raised by [`RealTimeWavWriter`] operations
#[derive(Debug)]
pub struct WavWriteError {
    pub kind: WriteFailureKind,
    source: hound::Error,
}

impl fmt::Display for WavWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WriteFailureKind::DiskFull => write!(f, "Disk space error: {}", self.source),
            WriteFailureKind::PermissionDenied => write!(f, "Permission error: {}", self.source),
            WriteFailureKind::Io => write!(f, "Write error: {}", self.source),
        }
    }
}

impl std::error::Error for WavWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn classify(err: &hound::Error) -> WriteFailureKind {
    if let hound::Error::IoError(io) = err {
        match io.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => WriteFailureKind::DiskFull,
            ErrorKind::PermissionDenied => WriteFailureKind::PermissionDenied,
            _ => WriteFailureKind::Io,
        }
    } else {
        WriteFailureKind::Io
    }
}

fn wrap(err: hound::Error) -> WavWriteError {
    WavWriteError {
        kind: classify(&err),
        source: err,
    }
}

/// Writes an append-only PCM stream as an always-playable WAV file
///
/// The header written at `open` carries the exact format of the bytes
/// that follow; a rate mismatch between header and data is a correctness
/// bug upstream, never something this writer papers over.
pub struct RealTimeWavWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
    format: StreamFormat,
    bytes_written: u64,
    bytes_since_patch: u64,
    patch_threshold: u64,
}

impl RealTimeWavWriter {
    /// Create the file and write a provisional header
    pub fn open(path: impl AsRef<Path>, format: StreamFormat) -> Result<Self, WavWriteError> {
        let path = path.as_ref().to_path_buf();

        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec).map_err(wrap)?;
        // Push the provisional header to disk so the file is a valid
        // (zero-length) WAV from the first observable moment.
        writer.flush().map_err(wrap)?;

        info!(
            "Recording file opened: {} ({}Hz, {}ch, {}-bit)",
            path.display(),
            format.sample_rate,
            format.channels,
            format.bits_per_sample
        );

        Ok(Self {
            writer: Some(writer),
            path,
            format,
            bytes_written: 0,
            bytes_since_patch: 0,
            patch_threshold: HEADER_PATCH_THRESHOLD,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Total PCM bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append samples; patches the header once the threshold accumulates
    pub fn write(&mut self, samples: &[i16]) -> Result<(), WavWriteError> {
        let writer = self
            .writer
            .as_mut()
            .expect("write after close is a controller bug");

        for &sample in samples {
            writer.write_sample(sample).map_err(wrap)?;
        }

        let appended = samples.len() as u64 * 2;
        self.bytes_written += appended;
        self.bytes_since_patch += appended;

        if self.bytes_since_patch >= self.patch_threshold {
            // Seek back, rewrite the RIFF/data length fields, return the
            // cursor to the append position.
            writer.flush().map_err(wrap)?;
            self.bytes_since_patch = 0;
            debug!(
                "WAV header patched at {} bytes ({})",
                self.bytes_written,
                self.path.display()
            );
        }

        Ok(())
    }

    /// Final header patch with exact totals, then flush to disk
    pub fn close(mut self) -> Result<(PathBuf, u64), WavWriteError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(wrap)?;
        }

        info!(
            "Recording file closed: {} ({} PCM bytes)",
            self.path.display(),
            self.bytes_written
        );

        Ok((self.path.clone(), self.bytes_written))
    }
}

impl Drop for RealTimeWavWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
