//! # Opus Loop Streamer
//!
//! Streams a looping audio file from a server to WebSocket clients as Opus
//! frames, while each client plays the stream and records it to a WAV file.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────── SERVER ─────────────────────────────────┐
//! │                                                                         │
//! │   per accepted connection (session::stream)                             │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────┐   │
//! │   │ FrameSource  │──▶│ OpusEncoder  │──▶│ WebSocket    │──▶│ pace   │   │
//! │   │ (looping)    │   │ + stats      │   │ binary msg   │   │ 60 ms  │   │
//! │   └──────────────┘   └──────────────┘   └──────┬───────┘   └────────┘   │
//! │                                                │                        │
//! └────────────────────────────────────────────────┼────────────────────────┘
//!                                                  │ one Opus frame / message
//!                                                  ▼
//! ┌──────────────────────────────── CLIENT ─────────────────────────────────┐
//! │   receive task (session::client)                                        │
//! │   ┌──────────────┐   ┌──────────────┐                                   │
//! │   │ WebSocket    │──▶│ OpusDecoder  │──┬──────────────────────┐         │
//! │   └──────────────┘   └──────────────┘  │                      │         │
//! │                                        ▼                      ▼         │
//! │                              ┌────────────────┐     ┌─────────────────┐ │
//! │                              │ PlaybackBuffer │     │ CaptureRecorder │ │
//! │                              └───────┬────────┘     └────────┬────────┘ │
//! │   playback thread                    ▼                       ▼ on exit  │
//! │                              ┌────────────────┐     ┌─────────────────┐ │
//! │                              │ cpal device    │     │ WAV file        │ │
//! │                              └────────────────┘     └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for the stream
    pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// PCM16
    pub const DEFAULT_BYTES_PER_SAMPLE: u16 = 2;

    /// Default frame duration in milliseconds
    pub const DEFAULT_FRAME_DURATION_MS: u32 = 60;

    /// Default Opus complexity (minimum)
    pub const DEFAULT_OPUS_COMPLEXITY: u8 = 0;

    /// Default WebSocket listen address
    pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8765";

    /// Default server URL for the client
    pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8765";

    /// Default looping source file
    pub const DEFAULT_SOURCE_PATH: &str = "sleep.wav";

    /// Default recording destination
    pub const DEFAULT_OUTPUT_PATH: &str = "recorded_audio.wav";

    /// Largest Opus packet we ever expect to produce
    pub const MAX_PACKET_SIZE: usize = 4000;

    /// Frames the device hand-off channel holds before `write` blocks
    pub const DEVICE_QUEUE_FRAMES: usize = 2;
}
