//! Source audio loading
//!
//! Decodes a file with symphonia, remixes it to the stream channel count,
//! resamples it to the stream rate with rubato and emits PCM16 LE bytes.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::format::AudioFormat;
use crate::error::LoadError;

/// Planar f32 audio as decoded from a file
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

/// Load `path` and convert it to interleaved PCM16 in `format`
pub fn load_pcm16(path: &Path, format: &AudioFormat) -> Result<Vec<u8>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let decoded = decode_file(path)?;
    tracing::debug!(
        path = %path.display(),
        rate = decoded.sample_rate,
        channels = decoded.channels.len(),
        frames = decoded.frames(),
        "Decoded source audio"
    );

    let remixed = remix_channels(decoded.channels, format.channel_count() as usize);
    let resampled = resample(remixed, decoded.sample_rate, format.sample_rate_hz())?;
    let pcm = interleave_pcm16(&resampled);
    if pcm.is_empty() {
        return Err(LoadError::Empty);
    }

    Ok(pcm)
}

/// Decode every packet of the first audio track into planar f32
pub fn decode_file(path: &Path) -> Result<DecodedAudio, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::Probe(e.to_string()))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(LoadError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::Decode(e.to_string()))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(LoadError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let channel_count = spec.channels.count();

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                deinterleave_into(&mut channels, sample_buf.samples(), channel_count)?;
            }
            // Skip corrupt packets
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Skipping undecodable packet: {}", e);
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(LoadError::Decode(e.to_string())),
        }
    }

    if channels.is_empty() || sample_rate == 0 {
        return Err(LoadError::Empty);
    }

    Ok(DecodedAudio {
        channels,
        sample_rate,
    })
}

/// Append interleaved samples to per-channel buffers
///
/// The first packet fixes the channel count; a later packet with a different
/// layout is rejected.
fn deinterleave_into(
    channels: &mut Vec<Vec<f32>>,
    interleaved: &[f32],
    channel_count: usize,
) -> Result<(), LoadError> {
    if channel_count == 0 {
        return Err(LoadError::Decode("packet has no channels".to_string()));
    }
    if channels.is_empty() {
        *channels = vec![Vec::new(); channel_count];
    } else if channels.len() != channel_count {
        return Err(LoadError::Decode(format!(
            "channel count changed from {} to {}",
            channels.len(),
            channel_count
        )));
    }

    for group in interleaved.chunks_exact(channel_count) {
        for (ch, &sample) in group.iter().enumerate() {
            channels[ch].push(sample);
        }
    }
    Ok(())
}

/// Convert planar audio to `target` channels
///
/// Mono is duplicated upward, anything is averaged down to mono, and other
/// layouts map channel `i` from source channel `i % source_count`.
pub fn remix_channels(channels: Vec<Vec<f32>>, target: usize) -> Vec<Vec<f32>> {
    let source = channels.len();
    if source == target || source == 0 {
        return channels;
    }

    if target == 1 {
        let frames = channels[0].len();
        let scale = 1.0 / source as f32;
        let mono = (0..frames)
            .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
            .collect();
        return vec![mono];
    }

    (0..target).map(|ch| channels[ch % source].clone()).collect()
}

/// Resample planar audio from `from_rate` to `to_rate`
pub fn resample(
    channels: Vec<Vec<f32>>,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<Vec<f32>>, LoadError> {
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    if from_rate == to_rate || frames == 0 {
        return Ok(channels);
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, frames, channels.len())
        .map_err(|e| LoadError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let body = resampler
        .process(&channels, None)
        .map_err(|e| LoadError::Resample(e.to_string()))?;
    // Flush the filter tail so the end of the file is not cut off
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| LoadError::Resample(e.to_string()))?;

    let expected = (frames as f64 * ratio).round() as usize;
    Ok(body
        .into_iter()
        .zip(tail)
        .map(|(mut head, rest)| {
            head.extend(rest);
            head.into_iter().skip(delay).take(expected).collect()
        })
        .collect())
}

/// Interleave planar f32 into PCM16 LE bytes
pub fn interleave_pcm16(channels: &[Vec<f32>]) -> Vec<u8> {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    let mut pcm = Vec::with_capacity(frames * channels.len() * 2);
    for i in 0..frames {
        for channel in channels {
            let sample = (channel[i] * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::pcm16_samples;
    use crate::audio::wav::generate_wav_header;
    use std::io::Write;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_size = (samples.len() * 2) as u32;
        let mut file = File::create(path).unwrap();
        file.write_all(&generate_wav_header(sample_rate, 16, channels, data_size))
            .unwrap();
        for s in samples {
            file.write_all(&s.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_missing_file() {
        let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();
        let result = load_pcm16(Path::new("/nonexistent/sleep.wav"), &format);
        assert!(matches!(result, Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_garbage_file_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();
        assert!(load_pcm16(&path, &format).is_err());
    }

    #[test]
    fn test_wav_in_target_format_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..4_800)
            .map(|i| ((i as f32 * 0.05).sin() * 12_000.0) as i16)
            .collect();
        write_wav(&path, 24_000, 2, &samples);

        let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();
        let pcm = load_pcm16(&path, &format).unwrap();
        let loaded = pcm16_samples(&pcm);

        assert_eq!(loaded.len(), samples.len());
        for (a, b) in loaded.iter().zip(&samples) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_mono_48k_converted_to_stereo_24k() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<i16> = (0..48_000)
            .map(|i| ((i as f32 * 0.01).sin() * 8_000.0) as i16)
            .collect();
        write_wav(&path, 48_000, 1, &samples);

        let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();
        let pcm = load_pcm16(&path, &format).unwrap();
        let loaded = pcm16_samples(&pcm);

        // One second of stereo at 24 kHz
        assert_eq!(loaded.len(), 24_000 * 2);
        for pair in loaded.chunks_exact(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_deinterleave_splits_channels() {
        let mut channels = Vec::new();
        deinterleave_into(&mut channels, &[0.1, 0.2, 0.3, 0.4], 2).unwrap();
        deinterleave_into(&mut channels, &[0.5, 0.6], 2).unwrap();
        assert_eq!(channels, vec![vec![0.1, 0.3, 0.5], vec![0.2, 0.4, 0.6]]);
    }

    #[test]
    fn test_channel_count_change_rejected() {
        let mut channels = Vec::new();
        deinterleave_into(&mut channels, &[0.1, 0.2], 2).unwrap();
        let result = deinterleave_into(&mut channels, &[0.1, 0.2, 0.3], 3);
        assert!(matches!(result, Err(LoadError::Decode(_))));
        assert_eq!(channels.len(), 2);
    }

    #[test]
    fn test_remix_down_to_mono_averages() {
        let stereo = vec![vec![1.0, 0.5], vec![0.0, 0.5]];
        let mono = remix_channels(stereo, 1);
        assert_eq!(mono, vec![vec![0.5, 0.5]]);
    }

    #[test]
    fn test_remix_up_duplicates() {
        let mono = vec![vec![0.25, -0.25]];
        let stereo = remix_channels(mono, 2);
        assert_eq!(stereo.len(), 2);
        assert_eq!(stereo[0], stereo[1]);
    }

    #[test]
    fn test_interleave_clamps() {
        let pcm = interleave_pcm16(&[vec![2.0, -2.0], vec![0.0, 0.5]]);
        assert_eq!(pcm16_samples(&pcm), vec![i16::MAX, 0, i16::MIN, 16_384]);
    }
}
