//! Opus decoder wrapper

use opus::{Channels, Decoder};

use crate::audio::{AudioFormat, RawFrame};
use crate::codec::{validate_opus_format, FrameDecode};
use crate::error::CodecError;

/// Largest Opus packet duration (120 ms) at 48 kHz, per channel
const MAX_PACKET_SAMPLES: usize = 5_760;

/// Opus decoder, reused for the whole client run
pub struct OpusDecoder {
    decoder: Decoder,
    channels: usize,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<i16>,
}

impl OpusDecoder {
    /// Create a decoder for `format`
    pub fn new(format: &AudioFormat) -> Result<Self, CodecError> {
        validate_opus_format(format).map_err(CodecError::DecoderInit)?;

        let channels = match format.channel_count() {
            1 => Channels::Mono,
            _ => Channels::Stereo,
        };

        let decoder = Decoder::new(format.sample_rate_hz(), channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        let channels = format.channel_count() as usize;
        Ok(Self {
            decoder,
            channels,
            decode_buffer: vec![0i16; MAX_PACKET_SAMPLES * channels],
        })
    }
}

impl FrameDecode for OpusDecoder {
    fn decode(
        &mut self,
        packet: &[u8],
        expected_sample_count: usize,
    ) -> Result<RawFrame, CodecError> {
        // An empty packet would make libopus run loss concealment instead
        if packet.is_empty() {
            return Err(CodecError::EmptyPacket);
        }

        let samples = self
            .decoder
            .decode(packet, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        if samples != expected_sample_count {
            return Err(CodecError::SampleCountMismatch {
                expected: expected_sample_count,
                actual: samples,
            });
        }

        let total = samples * self.channels;

        Ok(RawFrame::from_samples(&self.decode_buffer[..total]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameEncode, OpusEncoder};
    use crate::config::OpusConfig;

    fn format() -> AudioFormat {
        AudioFormat::new(24_000, 2, 2, 60).unwrap()
    }

    fn sine_frame(format: &AudioFormat) -> RawFrame {
        let mut samples = Vec::with_capacity(format.frame_sample_count() * 2);
        for i in 0..format.frame_sample_count() {
            let t = i as f32 / format.sample_rate_hz() as f32;
            let val = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 16_000.0) as i16;
            samples.push(val); // Left
            samples.push(val); // Right
        }
        RawFrame::from_samples(&samples)
    }

    #[test]
    fn test_decoder_creation() {
        assert!(OpusDecoder::new(&format()).is_ok());
    }

    #[test]
    fn test_roundtrip_preserves_frame_length() {
        let format = format();
        let mut encoder = OpusEncoder::new(&format, &OpusConfig::default()).unwrap();
        let mut decoder = OpusDecoder::new(&format).unwrap();

        for _ in 0..5 {
            let encoded = encoder.encode(&sine_frame(&format)).unwrap();
            let decoded = decoder
                .decode(&encoded, format.frame_sample_count())
                .unwrap();
            assert_eq!(decoded.len(), format.frame_byte_size());
        }
    }

    #[test]
    fn test_mono_roundtrip() {
        let format = AudioFormat::new(48_000, 1, 2, 20).unwrap();
        let mut encoder = OpusEncoder::new(&format, &OpusConfig::default()).unwrap();
        let mut decoder = OpusDecoder::new(&format).unwrap();

        let frame = RawFrame::new(vec![0u8; format.frame_byte_size()]);
        let encoded = encoder.encode(&frame).unwrap();
        let decoded = decoder.decode(&encoded, 960).unwrap();
        assert_eq!(decoded.len(), 1_920);
    }

    #[test]
    fn test_empty_packet_rejected() {
        let mut decoder = OpusDecoder::new(&format()).unwrap();
        assert!(matches!(
            decoder.decode(&[], 1_440),
            Err(CodecError::EmptyPacket)
        ));
    }

    #[test]
    fn test_sample_count_mismatch() {
        let format = format();
        let mut encoder = OpusEncoder::new(&format, &OpusConfig::default()).unwrap();
        let mut decoder = OpusDecoder::new(&format).unwrap();

        let encoded = encoder.encode(&sine_frame(&format)).unwrap();
        assert!(matches!(
            decoder.decode(&encoded, 480),
            Err(CodecError::SampleCountMismatch {
                expected: 480,
                actual: 1_440
            })
        ));
    }
}
