//! Capture recorder
//!
//! Keeps every received frame in arrival order and writes them out as one WAV
//! file when the session ends.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::audio::buffer::RawFrame;
use crate::audio::format::AudioFormat;
use crate::audio::wav::{self, MAX_DATA_SIZE};
use crate::error::PersistError;

/// Append-only log of received frames
pub struct CaptureRecorder {
    format: AudioFormat,
    frames: Vec<RawFrame>,
    payload_bytes: u64,
}

/// What a successful flush wrote
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: usize,
    pub payload_bytes: u64,
    pub duration_secs: f64,
}

impl CaptureRecorder {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            frames: Vec::new(),
            payload_bytes: 0,
        }
    }

    /// Record one frame
    pub fn append(&mut self, frame: RawFrame) {
        self.payload_bytes += frame.len() as u64;
        self.frames.push(frame);
    }

    /// Frames recorded so far
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes
    }

    /// Seconds of audio recorded so far
    pub fn duration_secs(&self) -> f64 {
        self.payload_bytes as f64 / self.format.byte_rate() as f64
    }

    /// Write header and payload to `path`
    ///
    /// Returns `Ok(None)` without touching the filesystem when nothing was
    /// recorded.
    pub fn flush(&self, path: &Path) -> Result<Option<RecordingSummary>, PersistError> {
        if self.frames.is_empty() {
            tracing::info!("No audio recorded, skipping {}", path.display());
            return Ok(None);
        }
        if self.payload_bytes > MAX_DATA_SIZE {
            return Err(PersistError::TooLarge(self.payload_bytes));
        }

        tracing::info!("Saving recording to {}", path.display());

        let write_err = |source: std::io::Error| PersistError::Write {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&wav::header_for(&self.format, self.payload_bytes as u32))
            .map_err(write_err)?;
        for frame in &self.frames {
            writer.write_all(frame.as_bytes()).map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;

        let summary = RecordingSummary {
            path: path.to_path_buf(),
            frames: self.frames.len(),
            payload_bytes: self.payload_bytes,
            duration_secs: self.duration_secs(),
        };
        tracing::info!(
            frames = summary.frames,
            bytes = summary.payload_bytes,
            "Recording saved: {} ({:.2} s)",
            summary.path.display(),
            summary.duration_secs
        );

        Ok(Some(summary))
    }
}
