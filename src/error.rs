//! Error types for the streaming server and recording client

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] LoadError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source audio could not be turned into a frame buffer
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized audio format: {0}")]
    Probe(String),

    #[error("No decodable audio track")]
    NoTrack,

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Source decoded to zero samples")]
    Empty,
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("Decoded {actual} samples per channel, expected {expected}")]
    SampleCountMismatch { expected: usize, actual: usize },

    #[error("Empty packet")]
    EmptyPacket,
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bind to {addr} failed: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Recording could not be written
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recording of {0} bytes exceeds the WAV size limit")]
    TooLarge(u64),

    #[error("Flush task did not complete: {0}")]
    Task(String),
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Device sink closed")]
    DeviceClosed,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
