//! Client receive session
//!
//! Receives frames, decodes them, hands each one to the playback queue and
//! then to the recorder. Whatever ends the session, the recorder is flushed
//! exactly once afterwards, so a partial capture is always kept.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::audio::{CaptureRecorder, RecordingSummary, SharedPlaybackBuffer};
use crate::codec::FrameDecode;
use crate::error::{Error, PersistError, TransportError};
use crate::network::FrameStream;

/// Lifecycle of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Streaming,
    Closed,
    Failed,
}

/// Why the session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Server closed the connection
    PeerClosed,
    /// Configured frame limit reached
    FrameLimit,
    /// Shutdown signal
    Interrupted,
    Failed(Error),
}

impl SessionEnd {
    fn final_state(&self) -> ClientState {
        match self {
            SessionEnd::Failed(_) => ClientState::Failed,
            _ => ClientState::Closed,
        }
    }
}

/// Per-run settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Samples per channel every decoded frame must contain
    pub frame_sample_count: usize,
    pub output_path: PathBuf,
    pub max_frames: Option<u64>,
    /// Log progress every N frames (0 disables)
    pub received_every: u64,
}

/// Outcome of a finished client session
#[derive(Debug)]
pub struct ClientReport {
    pub state: ClientState,
    pub end: SessionEnd,
    pub frames_received: u64,
    /// Result of the final flush; `Ok(None)` when nothing was recorded
    pub recording: Result<Option<RecordingSummary>, PersistError>,
}

pub struct ClientSession<D> {
    decoder: D,
    playback: SharedPlaybackBuffer,
    recorder: CaptureRecorder,
    options: ClientOptions,
    state: ClientState,
    frames_received: u64,
}

impl<D> ClientSession<D>
where
    D: FrameDecode,
{
    pub fn new(
        decoder: D,
        playback: SharedPlaybackBuffer,
        recorder: CaptureRecorder,
        options: ClientOptions,
    ) -> Self {
        Self {
            decoder,
            playback,
            recorder,
            options,
            state: ClientState::Connecting,
            frames_received: 0,
        }
    }

    /// Connect, receive until the session ends, then flush the recording
    ///
    /// `shutdown` resolving ends the session as [`SessionEnd::Interrupted`],
    /// whether it is still connecting or already streaming.
    pub async fn run<S, C, F>(mut self, connect: C, shutdown: F) -> ClientReport
    where
        S: FrameStream,
        C: Future<Output = Result<S, TransportError>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = connect => Some(result),
        };

        let end = match connected {
            None => SessionEnd::Interrupted,
            Some(Err(e)) => {
                tracing::error!("Connection failed: {}", e);
                SessionEnd::Failed(e.into())
            }
            Some(Ok(mut stream)) => {
                self.state = ClientState::Streaming;
                let end = self.receive(&mut stream, shutdown.as_mut()).await;
                stream.close().await;
                end
            }
        };

        self.state = end.final_state();
        match &end {
            SessionEnd::PeerClosed => tracing::info!("Connection closed"),
            SessionEnd::FrameLimit => tracing::info!("Frame limit reached"),
            SessionEnd::Interrupted => tracing::info!("Interrupted"),
            SessionEnd::Failed(e) => tracing::error!("Session failed: {}", e),
        }

        let Self {
            recorder,
            options,
            state,
            frames_received,
            ..
        } = self;

        let recording = flush(recorder, options.output_path).await;
        if let Err(e) = &recording {
            tracing::error!("Failed to save recording: {}", e);
        }

        ClientReport {
            state,
            end,
            frames_received,
            recording,
        }
    }

    async fn receive<S, F>(&mut self, stream: &mut S, mut shutdown: Pin<&mut F>) -> SessionEnd
    where
        S: FrameStream,
        F: Future<Output = ()>,
    {
        loop {
            if let Some(max) = self.options.max_frames {
                if self.frames_received >= max {
                    return SessionEnd::FrameLimit;
                }
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.as_mut() => return SessionEnd::Interrupted,
                received = stream.recv_frame() => received,
            };

            let packet = match received {
                Ok(Some(packet)) => packet,
                Ok(None) => return SessionEnd::PeerClosed,
                Err(TransportError::ConnectionClosed) => {
                    tracing::warn!("Connection closed abnormally");
                    return SessionEnd::PeerClosed;
                }
                Err(e) => return SessionEnd::Failed(e.into()),
            };

            if packet.is_empty() {
                let e = TransportError::Protocol("empty message".to_string());
                return SessionEnd::Failed(e.into());
            }

            let frame = match self
                .decoder
                .decode(&packet, self.options.frame_sample_count)
            {
                Ok(frame) => frame,
                Err(e) => return SessionEnd::Failed(e.into()),
            };

            self.playback.push(frame.clone());
            self.recorder.append(frame);
            self.frames_received += 1;

            let every = self.options.received_every;
            if every > 0 && self.frames_received % every == 0 {
                tracing::info!(
                    "Received {} frames, playback queue: {}",
                    self.frames_received,
                    self.playback.len()
                );
            }
        }
    }
}

/// Write the recording on the blocking pool
async fn flush(
    recorder: CaptureRecorder,
    path: PathBuf,
) -> Result<Option<RecordingSummary>, PersistError> {
    tokio::task::spawn_blocking(move || recorder.flush(&path))
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
}
