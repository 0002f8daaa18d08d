//! Application configuration
//!
//! Loaded from TOML; every section and field has a default so a partial file
//! (or no file at all) is valid.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::AudioFormat;
use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub codec: OpusConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub status: StatusConfig,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "opus-loop-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Validated stream format
    pub fn audio_format(&self) -> Result<AudioFormat> {
        self.audio.format()
    }
}

/// Stream format settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
    pub frame_duration_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bytes_per_sample: DEFAULT_BYTES_PER_SAMPLE,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> Result<AudioFormat> {
        AudioFormat::new(
            self.sample_rate,
            self.channels,
            self.bytes_per_sample,
            self.frame_duration_ms,
        )
    }
}

/// Opus application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpusApplication {
    Audio,
    Voip,
    LowDelay,
}

/// Opus encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusConfig {
    pub application: OpusApplication,
    /// Encoder complexity, 0 (fastest) to 10
    pub complexity: u8,
    /// Target bitrate in bits per second; `None` leaves libopus on auto
    pub bitrate: Option<u32>,
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self {
            application: OpusApplication::Audio,
            complexity: DEFAULT_OPUS_COMPLEXITY,
            bitrate: None,
        }
    }
}

/// How the server spaces frame transmissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Sleep one frame duration after every send, without drift correction
    #[default]
    FixedDelay,
    /// Send on a fixed frame-duration grid, absorbing encode/send latency
    Deadline,
}

impl std::str::FromStr for Pacing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed-delay" => Ok(Pacing::FixedDelay),
            "deadline" => Ok(Pacing::Deadline),
            other => Err(Error::Config(format!("unknown pacing mode: {}", other))),
        }
    }
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub source_path: PathBuf,
    pub pacing: Pacing,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            pacing: Pacing::default(),
        }
    }
}

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub output_path: PathBuf,
    /// Play through an output device while recording
    pub playback: bool,
    /// Output device name; `None` uses the default device
    pub output_device: Option<String>,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            playback: true,
            output_device: None,
            max_frames: None,
        }
    }
}

/// How often progress is logged, in frames (0 disables)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub sent_every: u64,
    pub compression_every: u64,
    pub received_every: u64,
    pub played_every: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            sent_every: 20,
            compression_every: 100,
            received_every: 200,
            played_every: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        let format = config.audio_format().unwrap();
        assert_eq!(format.sample_rate_hz(), 24_000);
        assert_eq!(format.channel_count(), 2);
        assert_eq!(format.frame_duration_ms(), 60);
        assert_eq!(config.codec.complexity, 0);
        assert_eq!(config.codec.application, OpusApplication::Audio);
        assert_eq!(config.server.pacing, Pacing::FixedDelay);
        assert_eq!(config.server.bind_address, "127.0.0.1:8765");
        assert!(config.client.playback);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [audio]
            sample_rate = 48000
            frame_duration_ms = 20

            [server]
            pacing = "deadline"

            [codec]
            application = "lowdelay"
            bitrate = 64000
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.server.pacing, Pacing::Deadline);
        assert_eq!(config.server.source_path, PathBuf::from("sleep.wav"));
        assert_eq!(config.codec.application, OpusApplication::LowDelay);
        assert_eq!(config.codec.bitrate, Some(64_000));
        assert_eq!(config.status.received_every, 200);
        assert_eq!(config.audio_format().unwrap().frame_sample_count(), 960);
    }

    #[test]
    fn test_invalid_format_reported() {
        let config = AppConfig::from_toml("[audio]\nsample_rate = 44100\nframe_duration_ms = 5\n")
            .unwrap();
        assert!(matches!(config.audio_format(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_pacing_from_str() {
        assert_eq!("deadline".parse::<Pacing>().unwrap(), Pacing::Deadline);
        assert_eq!("fixed-delay".parse::<Pacing>().unwrap(), Pacing::FixedDelay);
        assert!("asap".parse::<Pacing>().is_err());
    }
}
