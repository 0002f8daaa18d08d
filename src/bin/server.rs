//! Stream Server Application
//!
//! Loops an audio file to every WebSocket client as a stream of Opus frames.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opus_loop_streamer::{
    audio::FrameSource,
    config::{AppConfig, Pacing},
    network::StreamServer,
};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Stream a looping audio file to WebSocket clients as Opus frames")]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8765
    #[arg(long)]
    bind: Option<String>,

    /// Audio file to loop (WAV or MP3)
    #[arg(long)]
    source: Option<PathBuf>,

    /// Frame pacing: fixed-delay or deadline
    #[arg(long)]
    pacing: Option<Pacing>,

    /// Opus target bitrate in bits per second
    #[arg(long)]
    bitrate: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(source) = args.source {
        config.server.source_path = source;
    }
    if let Some(pacing) = args.pacing {
        config.server.pacing = pacing;
    }
    if args.bitrate.is_some() {
        config.codec.bitrate = args.bitrate;
    }

    let format = config.audio_format()?;
    tracing::info!(
        "Stream format: {} Hz, {} channels, {} ms frames ({} bytes)",
        format.sample_rate_hz(),
        format.channel_count(),
        format.frame_duration_ms(),
        format.frame_byte_size()
    );

    // Refuse to start without a playable source; sessions reload it per connection
    let path = config.server.source_path.clone();
    let source = tokio::task::spawn_blocking(move || FrameSource::load(&path, &format))
        .await?
        .with_context(|| format!("Cannot load {}", config.server.source_path.display()))?;
    tracing::info!(
        "Loaded {}: {} frames per loop ({:.1} s)",
        config.server.source_path.display(),
        source.frames_per_loop(),
        source.len() as f64 / format.byte_rate() as f64
    );
    drop(source);

    let server = StreamServer::bind(&config).await?;
    tracing::info!(
        "Pacing: {:?}, Opus complexity {}",
        config.server.pacing,
        config.codec.complexity
    );

    server.serve(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
