//! Stream Client Application
//!
//! Receives the Opus stream, plays it through an output device and records
//! it to a WAV file when the connection ends.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opus_loop_streamer::{
    audio::{list_output_devices, open_sink, CaptureRecorder, PlaybackBuffer, PlaybackWorker},
    codec::OpusDecoder,
    config::AppConfig,
    network,
    session::{ClientOptions, ClientSession},
};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Play and record an Opus stream from the stream server")]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server URL, e.g. ws://127.0.0.1:8765
    #[arg(long)]
    url: Option<String>,

    /// Recording destination
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Record without playing
    #[arg(long)]
    no_playback: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
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

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.client.server_url = url;
    }
    if let Some(output) = args.output {
        config.client.output_path = output;
    }
    if args.device.is_some() {
        config.client.output_device = args.device;
    }
    if args.no_playback {
        config.client.playback = false;
    }
    if args.max_frames.is_some() {
        config.client.max_frames = args.max_frames;
    }

    let format = config.audio_format()?;
    let decoder = OpusDecoder::new(&format)?;

    let playback = Arc::new(PlaybackBuffer::new());
    let sink = open_sink(
        config.client.playback,
        config.client.output_device.as_deref(),
        &format,
    );
    let worker = PlaybackWorker::spawn(playback.clone(), sink, config.status.played_every)?;

    let session = ClientSession::new(
        decoder,
        playback.clone(),
        CaptureRecorder::new(format),
        ClientOptions {
            frame_sample_count: format.frame_sample_count(),
            output_path: config.client.output_path.clone(),
            max_frames: config.client.max_frames,
            received_every: config.status.received_every,
        },
    );

    let url = config.client.server_url.clone();
    tracing::info!("Connecting to {}", url);
    let report = session.run(network::connect(&url), shutdown_signal()).await;

    let played = worker.stop();
    let queue = playback.stats();

    tracing::info!(
        "Session {:?}: {} frames received, {} played, {} discarded",
        report.state,
        report.frames_received,
        played.frames_played,
        played.frames_discarded
    );
    tracing::info!(
        "Playback queue: {} pushed, {} popped, peak depth {}",
        queue.pushed,
        queue.popped,
        queue.high_water
    );
    match &report.recording {
        Ok(Some(summary)) => tracing::info!(
            "Recording: {} ({} frames, {:.2} s)",
            summary.path.display(),
            summary.frames,
            summary.duration_secs
        ),
        Ok(None) => tracing::info!("Nothing recorded"),
        Err(e) => tracing::error!("Recording lost: {}", e),
    }

    Ok(())
}

fn print_devices() {
    println!("\n=== Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Stopping"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
