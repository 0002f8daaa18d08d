//! Opus frame codec
//!
//! The server holds one encoder per session and the client one decoder for
//! its whole run. Sessions are written against the [`FrameEncode`] and
//! [`FrameDecode`] traits rather than the Opus types directly.

pub mod decoder;
pub mod encoder;

pub use decoder::OpusDecoder;
pub use encoder::OpusEncoder;

use bytes::Bytes;
use serde::Serialize;

use crate::audio::{AudioFormat, RawFrame};
use crate::error::CodecError;

/// Compressed frame as carried in one transport message
pub type EncodedFrame = Bytes;

/// Raw frame to compressed frame
pub trait FrameEncode {
    /// Compress exactly one frame; updates [`CompressionStats`] on success
    fn encode(&mut self, frame: &RawFrame) -> Result<EncodedFrame, CodecError>;

    /// Running totals since the encoder was created
    fn stats(&self) -> CompressionStats;
}

/// Compressed frame back to raw PCM
pub trait FrameDecode {
    /// Decode `packet` into exactly `expected_sample_count` samples per channel
    fn decode(&mut self, packet: &[u8], expected_sample_count: usize)
        -> Result<RawFrame, CodecError>;
}

/// Cumulative encoder totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompressionStats {
    pub frames_processed: u64,
    pub original_bytes: u64,
    pub encoded_bytes: u64,
}

impl CompressionStats {
    pub fn record(&mut self, original: usize, encoded: usize) {
        self.frames_processed += 1;
        self.original_bytes += original as u64;
        self.encoded_bytes += encoded as u64;
    }

    /// original : encoded, 0 before anything was encoded
    pub fn ratio(&self) -> f64 {
        if self.encoded_bytes > 0 {
            self.original_bytes as f64 / self.encoded_bytes as f64
        } else {
            0.0
        }
    }

    /// Percentage of bytes saved by compression
    pub fn savings_percent(&self) -> f64 {
        if self.original_bytes > 0 {
            (1.0 - self.encoded_bytes as f64 / self.original_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn average_frame_size(&self) -> f64 {
        if self.frames_processed > 0 {
            self.encoded_bytes as f64 / self.frames_processed as f64
        } else {
            0.0
        }
    }
}

/// Check that libopus can carry `format`
pub fn validate_opus_format(format: &AudioFormat) -> Result<(), String> {
    if !matches!(format.sample_rate_hz(), 8_000 | 12_000 | 16_000 | 24_000 | 48_000) {
        return Err(format!("Unsupported sample rate: {}", format.sample_rate_hz()));
    }
    if !matches!(format.channel_count(), 1 | 2) {
        return Err(format!("Unsupported channel count: {}", format.channel_count()));
    }
    if format.bytes_per_sample() != 2 {
        return Err(format!(
            "Unsupported sample width: {} bytes",
            format.bytes_per_sample()
        ));
    }
    if !matches!(format.frame_duration_ms(), 5 | 10 | 20 | 40 | 60) {
        return Err(format!(
            "Unsupported frame duration: {} ms",
            format.frame_duration_ms()
        ));
    }
    Ok(())
}
