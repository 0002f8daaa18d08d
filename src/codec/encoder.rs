//! Opus encoder wrapper
//!
//! Encodes fixed-size PCM16 frames and keeps running compression totals.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::audio::{AudioFormat, RawFrame};
use crate::codec::{validate_opus_format, CompressionStats, EncodedFrame, FrameEncode};
use crate::config::{OpusApplication, OpusConfig};
use crate::constants::MAX_PACKET_SIZE;
use crate::error::CodecError;

/// Opus encoder for one stream session
pub struct OpusEncoder {
    encoder: Encoder,
    config: OpusConfig,
    frame_byte_size: usize,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Sample conversion buffer
    sample_buffer: Vec<i16>,
    stats: CompressionStats,
}

impl OpusEncoder {
    /// Create an encoder for `format`
    pub fn new(format: &AudioFormat, config: &OpusConfig) -> Result<Self, CodecError> {
        validate_opus_format(format).map_err(CodecError::EncoderInit)?;
        if config.complexity > 10 {
            return Err(CodecError::EncoderInit(format!(
                "Complexity out of range: {}",
                config.complexity
            )));
        }

        let channels = match format.channel_count() {
            1 => Channels::Mono,
            _ => Channels::Stereo,
        };

        let application = match config.application {
            OpusApplication::Audio => Application::Audio,
            OpusApplication::Voip => Application::Voip,
            OpusApplication::LowDelay => Application::LowDelay,
        };

        let mut encoder = Encoder::new(format.sample_rate_hz(), channels, application)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_complexity(i32::from(config.complexity))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set complexity: {}", e)))?;

        if let Some(bitrate) = config.bitrate {
            encoder
                .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        }

        tracing::debug!(
            rate = format.sample_rate_hz(),
            channels = format.channel_count(),
            frame_ms = format.frame_duration_ms(),
            complexity = config.complexity,
            "Opus encoder initialized"
        );

        Ok(Self {
            encoder,
            config: config.clone(),
            frame_byte_size: format.frame_byte_size(),
            encode_buffer: vec![0u8; MAX_PACKET_SIZE],
            sample_buffer: Vec::with_capacity(format.frame_byte_size() / 2),
            stats: CompressionStats::default(),
        })
    }

    /// Get current configuration
    pub fn config(&self) -> &OpusConfig {
        &self.config
    }

    /// Expected raw frame length in bytes
    pub fn frame_byte_size(&self) -> usize {
        self.frame_byte_size
    }

    /// Complexity the encoder is actually running at
    pub fn complexity(&mut self) -> Result<u8, CodecError> {
        let value = self
            .encoder
            .get_complexity()
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
        Ok(value as u8)
    }
}

impl FrameEncode for OpusEncoder {
    fn encode(&mut self, frame: &RawFrame) -> Result<EncodedFrame, CodecError> {
        if frame.len() != self.frame_byte_size {
            return Err(CodecError::InvalidFrameSize {
                expected: self.frame_byte_size,
                actual: frame.len(),
            });
        }

        self.sample_buffer.clear();
        self.sample_buffer.extend(
            frame
                .as_bytes()
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );

        let size = self
            .encoder
            .encode(&self.sample_buffer, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.stats.record(frame.len(), size);

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    fn stats(&self) -> CompressionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> AudioFormat {
        AudioFormat::new(24_000, 2, 2, 60).unwrap()
    }

    #[test]
    fn test_encoder_creation() {
        let encoder = OpusEncoder::new(&format(), &OpusConfig::default()).unwrap();
        assert_eq!(encoder.frame_byte_size(), 5_760);
        assert_eq!(encoder.config().complexity, 0);
    }

    #[test]
    fn test_encoding_silence_compresses() {
        let mut encoder = OpusEncoder::new(&format(), &OpusConfig::default()).unwrap();
        let frame = RawFrame::new(vec![0u8; 5_760]);

        let encoded = encoder.encode(&frame).unwrap();
        assert!(!encoded.is_empty());
        assert!(encoded.len() < frame.len());

        let stats = encoder.stats();
        assert_eq!(stats.frames_processed, 1);
        assert_eq!(stats.original_bytes, 5_760);
        assert_eq!(stats.encoded_bytes, encoded.len() as u64);
    }

    #[test]
    fn test_wrong_frame_length_rejected() {
        let mut encoder = OpusEncoder::new(&format(), &OpusConfig::default()).unwrap();
        let result = encoder.encode(&RawFrame::new(vec![0u8; 100]));
        assert!(matches!(
            result,
            Err(CodecError::InvalidFrameSize {
                expected: 5_760,
                actual: 100
            })
        ));
        assert_eq!(encoder.stats().frames_processed, 0);
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let format = AudioFormat::new(44_100, 2, 2, 20).unwrap();
        assert!(matches!(
            OpusEncoder::new(&format, &OpusConfig::default()),
            Err(CodecError::EncoderInit(_))
        ));
    }

    #[test]
    fn test_complexity_out_of_range() {
        let config = OpusConfig {
            complexity: 11,
            ..OpusConfig::default()
        };
        assert!(OpusEncoder::new(&format(), &config).is_err());
    }

    #[test]
    fn test_complexity_reaches_libopus() {
        let mut fastest = OpusEncoder::new(&format(), &OpusConfig::default()).unwrap();
        assert_eq!(fastest.complexity().unwrap(), 0);

        let config = OpusConfig {
            complexity: 10,
            ..OpusConfig::default()
        };
        let mut best = OpusEncoder::new(&format(), &config).unwrap();
        assert_eq!(best.complexity().unwrap(), 10);
    }

    #[test]
    fn test_bitrate_applied() {
        let config = OpusConfig {
            bitrate: Some(32_000),
            ..OpusConfig::default()
        };
        assert!(OpusEncoder::new(&format(), &config).is_ok());
    }
}
