//! Stream audio format
//!
//! Both ends of a stream derive their frame geometry from the same
//! [`AudioFormat`]; a mismatch makes decoded frames meaningless.

use serde::Serialize;
use std::time::Duration;

use crate::error::{Error, Result};

/// Sample layout and frame duration shared by server and client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    sample_rate_hz: u32,
    channel_count: u16,
    bytes_per_sample: u16,
    frame_duration_ms: u32,
}

impl AudioFormat {
    /// Create a validated format
    ///
    /// Fails unless `sample_rate_hz * frame_duration_ms / 1000` is a whole
    /// number of samples.
    pub fn new(
        sample_rate_hz: u32,
        channel_count: u16,
        bytes_per_sample: u16,
        frame_duration_ms: u32,
    ) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(Error::Config("sample rate must be non-zero".into()));
        }
        if channel_count == 0 {
            return Err(Error::Config("channel count must be non-zero".into()));
        }
        if bytes_per_sample == 0 {
            return Err(Error::Config("bytes per sample must be non-zero".into()));
        }
        if frame_duration_ms == 0 {
            return Err(Error::Config("frame duration must be non-zero".into()));
        }
        if (sample_rate_hz as u64 * frame_duration_ms as u64) % 1000 != 0 {
            return Err(Error::Config(format!(
                "{} ms at {} Hz is not a whole number of samples",
                frame_duration_ms, sample_rate_hz
            )));
        }

        Ok(Self {
            sample_rate_hz,
            channel_count,
            bytes_per_sample,
            frame_duration_ms,
        })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bytes_per_sample
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bytes_per_sample * 8
    }

    pub fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    /// Samples per channel in one frame
    pub fn frame_sample_count(&self) -> usize {
        (self.sample_rate_hz as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    /// Bytes in one raw frame (all channels)
    pub fn frame_byte_size(&self) -> usize {
        self.frame_sample_count() * self.block_align()
    }

    /// Bytes per interleaved sample group
    pub fn block_align(&self) -> usize {
        self.channel_count as usize * self.bytes_per_sample as usize
    }

    /// Raw bytes per second of audio
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate_hz * self.block_align() as u32
    }
}
