//! Looping frame source
//!
//! Slices a fully decoded source buffer into fixed-size frames. The last frame
//! of each pass is padded with silence and the cursor wraps back to the start,
//! so the stream never ends.

use std::path::Path;

use crate::audio::buffer::RawFrame;
use crate::audio::format::AudioFormat;
use crate::audio::loader;
use crate::error::LoadError;

/// Produces an endless sequence of raw frames from one source buffer
pub struct FrameSource {
    buffer: Vec<u8>,
    frame_byte_size: usize,
    cursor: usize,
    loops_completed: u64,
}

impl FrameSource {
    /// Wrap an already decoded PCM buffer
    pub fn new(buffer: Vec<u8>, format: &AudioFormat) -> Result<Self, LoadError> {
        if buffer.is_empty() {
            return Err(LoadError::Empty);
        }

        Ok(Self {
            buffer,
            frame_byte_size: format.frame_byte_size(),
            cursor: 0,
            loops_completed: 0,
        })
    }

    /// Decode `path` into `format` and wrap the result
    pub fn load(path: impl AsRef<Path>, format: &AudioFormat) -> Result<Self, LoadError> {
        let pcm = loader::load_pcm16(path.as_ref(), format)?;
        Self::new(pcm, format)
    }

    /// Next frame, exactly `frame_byte_size` bytes
    pub fn next_frame(&mut self) -> RawFrame {
        if self.cursor >= self.buffer.len() {
            self.cursor = 0;
            self.loops_completed += 1;
            tracing::debug!(loops = self.loops_completed, "Source exhausted, looping");
        }

        let end = (self.cursor + self.frame_byte_size).min(self.buffer.len());
        let mut frame = Vec::with_capacity(self.frame_byte_size);
        frame.extend_from_slice(&self.buffer[self.cursor..end]);
        // Pad the short tail with silence
        frame.resize(self.frame_byte_size, 0);
        self.cursor = end;

        RawFrame::new(frame)
    }

    /// Total source length in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Byte offset the next frame starts from (before wrap)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn frame_byte_size(&self) -> usize {
        self.frame_byte_size
    }

    /// Frames in one full pass, counting the padded tail
    pub fn frames_per_loop(&self) -> usize {
        self.buffer.len().div_ceil(self.frame_byte_size)
    }

    /// Number of times the source has wrapped
    pub fn loops_completed(&self) -> u64 {
        self.loops_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 10 ms of 8 kHz mono PCM16 = 160 bytes per frame
    fn small_format() -> AudioFormat {
        AudioFormat::new(8_000, 1, 2, 10).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(matches!(
            FrameSource::new(Vec::new(), &small_format()),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn test_three_and_a_half_frames() {
        let format = small_format();
        let f = format.frame_byte_size();
        let source_bytes = pattern(f * 7 / 2);
        let mut source = FrameSource::new(source_bytes.clone(), &format).unwrap();
        assert_eq!(source.frames_per_loop(), 4);

        let frames: Vec<RawFrame> = (0..4).map(|_| source.next_frame()).collect();
        for (i, frame) in frames.iter().take(3).enumerate() {
            assert_eq!(frame.as_bytes(), &source_bytes[i * f..(i + 1) * f]);
        }

        // Frame 4: the last half frame of data, then silence
        let tail = frames[3].as_bytes();
        assert_eq!(tail.len(), f);
        assert_eq!(&tail[..f / 2], &source_bytes[3 * f..]);
        assert!(tail[f / 2..].iter().all(|&b| b == 0));

        // Frame 5 starts the next pass
        assert_eq!(source.loops_completed(), 0);
        let fifth = source.next_frame();
        assert_eq!(fifth.as_bytes(), &source_bytes[..f]);
        assert_eq!(source.loops_completed(), 1);
    }

    #[test]
    fn test_exact_multiple_has_no_padding_frame() {
        let format = small_format();
        let f = format.frame_byte_size();
        let mut source = FrameSource::new(pattern(f * 2), &format).unwrap();

        source.next_frame();
        let second = source.next_frame();
        assert!(second.as_bytes().iter().all(|&b| b != 0));
        assert_eq!(source.cursor(), f * 2);

        let third = source.next_frame();
        assert_eq!(third.as_bytes(), &pattern(f)[..]);
        assert_eq!(source.cursor(), f);
    }

    #[test]
    fn test_source_shorter_than_one_frame() {
        let format = small_format();
        let mut source = FrameSource::new(vec![9; 10], &format).unwrap();

        for _ in 0..3 {
            let frame = source.next_frame();
            assert_eq!(frame.len(), format.frame_byte_size());
            assert_eq!(&frame.as_bytes()[..10], &[9; 10]);
            assert!(frame.as_bytes()[10..].iter().all(|&b| b == 0));
        }
    }

    proptest! {
        #[test]
        fn prop_one_pass_reproduces_source(len in 1usize..2_000) {
            let format = small_format();
            let f = format.frame_byte_size();
            let source_bytes = pattern(len);
            let mut source = FrameSource::new(source_bytes.clone(), &format).unwrap();

            let passes = len.div_ceil(f);
            let mut first_pass = Vec::new();
            for _ in 0..passes {
                let frame = source.next_frame();
                prop_assert_eq!(frame.len(), f);
                first_pass.extend_from_slice(frame.as_bytes());
            }

            prop_assert_eq!(&first_pass[..len], &source_bytes[..]);
            prop_assert!(first_pass[len..].iter().all(|&b| b == 0));

            // The next pass is identical
            let mut second_pass = Vec::new();
            for _ in 0..passes {
                second_pass.extend_from_slice(source.next_frame().as_bytes());
            }
            prop_assert_eq!(first_pass, second_pass);
        }
    }
}
