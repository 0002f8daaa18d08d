//! Playback worker
//!
//! Drains the [`PlaybackBuffer`] on a dedicated thread and writes each frame,
//! in order, to a blocking [`DeviceSink`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::SharedPlaybackBuffer;
use crate::audio::device::DeviceSink;
use crate::error::AudioError;

/// Handle to the playback thread
///
/// Dropping the handle closes the buffer and joins the thread.
pub struct PlaybackWorker {
    buffer: SharedPlaybackBuffer,
    played: Arc<AtomicU64>,
    write_errors: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

/// Final playback counters
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaybackSummary {
    pub frames_played: u64,
    pub write_errors: u64,
    pub frames_discarded: usize,
}

impl PlaybackWorker {
    /// Start draining `buffer` into `sink`
    ///
    /// `status_every` controls how often progress is logged (0 disables it).
    pub fn spawn(
        buffer: SharedPlaybackBuffer,
        mut sink: Box<dyn DeviceSink + Send>,
        status_every: u64,
    ) -> Result<Self, AudioError> {
        let played = Arc::new(AtomicU64::new(0));
        let write_errors = Arc::new(AtomicU64::new(0));

        let handle = {
            let buffer = buffer.clone();
            let played = played.clone();
            let write_errors = write_errors.clone();

            thread::Builder::new()
                .name("playback".to_string())
                .spawn(move || {
                    tracing::info!("Playback thread started on {}", sink.name());

                    while let Some(frame) = buffer.pop_blocking() {
                        if let Err(e) = sink.write(frame.as_bytes()) {
                            tracing::warn!("Playback error: {}", e);
                            write_errors.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }

                        let count = played.fetch_add(1, Ordering::Relaxed) + 1;
                        if status_every > 0 && count % status_every == 0 {
                            tracing::info!("Played {} frames", count);
                        }
                    }

                    tracing::info!("Playback thread stopped");
                })
                .map_err(|e| AudioError::StreamError(e.to_string()))?
        };

        Ok(Self {
            buffer,
            played,
            write_errors,
            thread_handle: Some(handle),
        })
    }

    /// Frames written to the device so far
    pub fn frames_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    /// Close the buffer, wait for the thread and report counters
    pub fn stop(mut self) -> PlaybackSummary {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PlaybackSummary {
        let frames_discarded = self.buffer.close();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Playback thread panicked");
            }
        }

        PlaybackSummary {
            frames_played: self.played.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            frames_discarded,
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            self.shutdown();
        }
    }
}
