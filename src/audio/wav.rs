//! WAV container helpers
//!
//! Recordings are plain 16-bit PCM RIFF files with the canonical 44-byte
//! header.

use crate::audio::format::AudioFormat;

/// Size of the canonical WAV header in bytes
pub const WAV_HEADER_SIZE: usize = 44;

/// Largest `data` chunk a RIFF size field can describe
pub const MAX_DATA_SIZE: u64 = u32::MAX as u64 - 36;

/// Generate a 44-byte PCM WAV header
///
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  1 (PCM)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    data_size: u32,
) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Header for a recording of `data_size` payload bytes in `format`
pub fn header_for(format: &AudioFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    generate_wav_header(
        format.sample_rate_hz(),
        format.bits_per_sample(),
        format.channel_count(),
        data_size,
    )
}

/// Fields read back from a canonical header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub bit_depth: u16,
    pub data_size: u32,
}

impl WavInfo {
    /// Declared playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.byte_rate == 0 {
            0.0
        } else {
            self.data_size as f64 / self.byte_rate as f64
        }
    }
}

/// Parse a canonical 44-byte PCM header
pub fn parse_header(bytes: &[u8]) -> Option<WavInfo> {
    if bytes.len() < WAV_HEADER_SIZE
        || &bytes[0..4] != b"RIFF"
        || &bytes[8..12] != b"WAVE"
        || &bytes[36..40] != b"data"
    {
        return None;
    }

    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

    Some(WavInfo {
        channels: u16_at(22),
        sample_rate: u32_at(24),
        byte_rate: u32_at(28),
        bit_depth: u16_at(34),
        data_size: u32_at(40),
    })
}
