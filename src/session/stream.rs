//! Server stream session
//!
//! One session per accepted connection: pull the next looping frame, encode
//! it, send it as one message, then wait for the next frame slot. The session
//! owns its source and encoder; nothing is shared with other sessions apart
//! from the registry counters.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::audio::FrameSource;
use crate::codec::{CompressionStats, FrameEncode};
use crate::config::Pacing;
use crate::error::{Error, TransportError};
use crate::network::FrameSink;
use crate::session::SessionTracker;

/// Lifecycle of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connected,
    Streaming,
    /// Peer went away or the server is stopping
    Disconnected,
    /// Encode or send error
    Failed,
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub frame_duration: Duration,
    pub pacing: Pacing,
    /// Log frames sent every N frames (0 disables)
    pub sent_every: u64,
    /// Log compression every N frames (0 disables)
    pub compression_every: u64,
}

/// Outcome of a finished session
#[derive(Debug)]
pub struct StreamReport {
    pub state: StreamState,
    pub frames_sent: u64,
    pub stats: CompressionStats,
    pub error: Option<Error>,
}

/// Waits between frame sends
enum Pacer {
    /// Fixed sleep after each send; send latency accumulates
    FixedDelay(Duration),
    /// Fixed grid anchored at session start
    Deadline(Interval),
}

impl Pacer {
    fn new(pacing: Pacing, period: Duration) -> Self {
        match pacing {
            Pacing::FixedDelay => Pacer::FixedDelay(period),
            Pacing::Deadline => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Pacer::Deadline(interval)
            }
        }
    }

    async fn wait(&mut self) {
        match self {
            Pacer::FixedDelay(period) => tokio::time::sleep(*period).await,
            Pacer::Deadline(interval) => {
                interval.tick().await;
            }
        }
    }
}

pub struct StreamSession<E, S> {
    source: FrameSource,
    encoder: E,
    sink: S,
    options: StreamOptions,
    tracker: Option<SessionTracker>,
    shutdown: Option<watch::Receiver<bool>>,
    state: StreamState,
    frames_sent: u64,
}

impl<E, S> StreamSession<E, S>
where
    E: FrameEncode + Send,
    S: FrameSink,
{
    pub fn new(source: FrameSource, encoder: E, sink: S, options: StreamOptions) -> Self {
        Self {
            source,
            encoder,
            sink,
            options,
            tracker: None,
            shutdown: None,
            state: StreamState::Connected,
            frames_sent: 0,
        }
    }

    /// Publish counters to a session registry entry
    pub fn with_tracker(mut self, tracker: SessionTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// End the session cleanly once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Stream until the peer disconnects or an error occurs
    ///
    /// The transport is closed on every exit path.
    pub async fn run(mut self) -> StreamReport {
        self.state = StreamState::Streaming;
        tracing::debug!(pacing = ?self.options.pacing, "Streaming started");

        let result = self.stream().await;

        self.sink.close().await;
        self.state = match result {
            Ok(()) => StreamState::Disconnected,
            Err(_) => StreamState::Failed,
        };

        StreamReport {
            state: self.state,
            frames_sent: self.frames_sent,
            stats: self.encoder.stats(),
            error: result.err(),
        }
    }

    async fn stream(&mut self) -> Result<(), Error> {
        let mut pacer = Pacer::new(self.options.pacing, self.options.frame_duration);

        loop {
            let frame = self.source.next_frame();
            let encoded = self.encoder.encode(&frame)?;

            let stats = self.encoder.stats();
            let every = self.options.compression_every;
            if every > 0 && stats.frames_processed % every == 0 {
                tracing::info!(
                    "Compression: {:.1}:1 ratio, {:.1}% saved",
                    stats.ratio(),
                    stats.savings_percent()
                );
            }

            match self.sink.send_frame(encoded).await {
                Ok(()) => {}
                Err(TransportError::ConnectionClosed) => {
                    tracing::info!("Peer closed during send");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            self.frames_sent += 1;
            if let Some(tracker) = &self.tracker {
                tracker.update(self.frames_sent, &stats);
            }

            let every = self.options.sent_every;
            if every > 0 && self.frames_sent % every == 0 {
                tracing::info!("Sent {} frames", self.frames_sent);
            }

            tokio::select! {
                _ = pacer.wait() => {}
                _ = self.sink.closed() => {
                    tracing::info!("Peer closed while waiting");
                    return Ok(());
                }
                _ = shutdown_requested(&mut self.shutdown) => {
                    tracing::info!("Server stopping, closing stream");
                    return Ok(());
                }
            }
        }
    }
}

/// Resolves once shutdown is signalled or its sender is gone; never without a receiver
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            let _ = rx.wait_for(|stop| *stop).await;
        }
        None => std::future::pending().await,
    }
}
