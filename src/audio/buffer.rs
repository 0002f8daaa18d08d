//! Raw frames and the playback queue
//!
//! [`PlaybackBuffer`] sits between the network receive task (producer) and the
//! playback thread (consumer). It is unbounded: it only absorbs arrival
//! jitter, the device write paces real-time output.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// One frame of interleaved little-endian PCM16
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    data: Bytes,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Build a frame from interleaved samples
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self { data: data.into() }
    }

    /// Interleaved samples; a trailing odd byte is ignored
    pub fn samples(&self) -> Vec<i16> {
        pcm16_samples(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Decode little-endian PCM16 bytes into samples
pub fn pcm16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

struct QueueState {
    frames: VecDeque<RawFrame>,
    closed: bool,
}

/// Unbounded FIFO of decoded frames, one producer and one consumer
pub struct PlaybackBuffer {
    state: Mutex<QueueState>,
    available: Condvar,
    pushed: AtomicU64,
    popped: AtomicU64,
    high_water: AtomicUsize,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            pushed: AtomicU64::new(0),
            popped: AtomicU64::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Append a frame to the tail; never blocks
    pub fn push(&self, frame: RawFrame) {
        let depth = {
            let mut state = self.state.lock();
            state.frames.push_back(frame);
            state.frames.len()
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.high_water.fetch_max(depth, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Take the head frame, waiting while the queue is empty
    ///
    /// Returns `None` once the buffer has been closed.
    pub fn pop_blocking(&self) -> Option<RawFrame> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.frames.pop_front() {
                self.popped.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
            self.available.wait(&mut state);
        }
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<RawFrame> {
        let frame = self.state.lock().frames.pop_front();
        if frame.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Release any waiting consumer; queued frames are dropped
    ///
    /// Returns the number of frames discarded.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let discarded = state.frames.len();
            state.frames.clear();
            discarded
        };
        self.available.notify_all();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Get current queue depth
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> PlaybackBufferStats {
        PlaybackBufferStats {
            depth: self.len(),
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }
}

impl Default for PlaybackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle to a playback buffer
pub type SharedPlaybackBuffer = Arc<PlaybackBuffer>;

/// Playback queue statistics
#[derive(Debug, Clone, Copy)]
pub struct PlaybackBufferStats {
    pub depth: usize,
    pub pushed: u64,
    pub popped: u64,
    pub high_water: usize,
}
