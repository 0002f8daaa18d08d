//! End-to-end streaming tests over WebSocket and the in-memory transport

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use opus_loop_streamer::audio::wav::{self, WAV_HEADER_SIZE};
use opus_loop_streamer::audio::{AudioFormat, CaptureRecorder, FrameSource, PlaybackBuffer};
use opus_loop_streamer::codec::{OpusDecoder, OpusEncoder};
use opus_loop_streamer::config::{AppConfig, OpusConfig, Pacing};
use opus_loop_streamer::network::{self, memory, StreamServer};
use opus_loop_streamer::session::{
    ClientOptions, ClientSession, ClientState, SessionEnd, StreamOptions, StreamSession,
    StreamState,
};

/// Write `secs` of a stereo 440 Hz tone at 24 kHz
fn write_tone(path: &Path, secs: f32) {
    let rate = 24_000u32;
    let frames = (rate as f32 * secs) as usize;
    let mut pcm = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let sample = ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 12_000.0) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
        pcm.extend_from_slice(&sample.to_le_bytes());
    }

    let mut file = wav::generate_wav_header(rate, 16, 2, pcm.len() as u32).to_vec();
    file.extend_from_slice(&pcm);
    std::fs::write(path, file).unwrap();
}

fn test_config(source: PathBuf) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.server.source_path = source;
    config.server.pacing = Pacing::Deadline;
    config
}

fn client_session(format: AudioFormat, output: PathBuf, max_frames: Option<u64>) -> ClientSession<OpusDecoder> {
    ClientSession::new(
        OpusDecoder::new(&format).unwrap(),
        Arc::new(PlaybackBuffer::new()),
        CaptureRecorder::new(format),
        ClientOptions {
            frame_sample_count: format.frame_sample_count(),
            output_path: output,
            max_frames,
            received_every: 0,
        },
    )
}

#[tokio::test]
async fn websocket_loopback_records_max_frames() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("recorded.wav");
    write_tone(&source, 0.5);

    let config = test_config(source);
    let format = config.audio_format().unwrap();

    let server = StreamServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve(async {
        let _ = stop_rx.await;
    }));

    let url = format!("ws://{}", addr);
    let report = client_session(format, output.clone(), Some(10))
        .run(network::connect(&url), std::future::pending())
        .await;

    assert_eq!(report.state, ClientState::Closed);
    assert!(matches!(report.end, SessionEnd::FrameLimit));
    assert_eq!(report.frames_received, 10);

    let summary = report.recording.unwrap().unwrap();
    assert_eq!(summary.frames, 10);
    assert_eq!(summary.payload_bytes, 10 * 5_760);
    assert!((summary.duration_secs - 0.6).abs() < 1e-9);

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes.len(), WAV_HEADER_SIZE + 10 * 5_760);
    let info = wav::parse_header(&bytes).unwrap();
    assert_eq!(info.sample_rate, 24_000);
    assert_eq!(info.channels, 2);
    assert_eq!(info.data_size, 10 * 5_760);

    // The session leaves the registry once the server notices the close
    for _ in 0..100 {
        if registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(registry.is_empty());

    let _ = stop_tx.send(());
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn server_shutdown_closes_open_sessions_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("tone.wav");
    let output = dir.path().join("recorded.wav");
    write_tone(&source, 0.5);

    let config = test_config(source);
    let format = config.audio_format().unwrap();

    let server = StreamServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve(async {
        let _ = stop_rx.await;
    }));

    // Stop only once frames are flowing
    let watched = registry.clone();
    let stopper = tokio::spawn(async move {
        for _ in 0..250 {
            if watched.snapshot().first().map_or(0, |s| s.frames_sent) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let _ = stop_tx.send(());
    });

    let url = format!("ws://{}", addr);
    let report = client_session(format, output.clone(), None)
        .run(network::connect(&url), std::future::pending())
        .await;
    stopper.await.unwrap();

    assert_eq!(report.state, ClientState::Closed);
    assert!(matches!(report.end, SessionEnd::PeerClosed));
    assert!(report.frames_received >= 2);
    assert_eq!(
        report.recording.unwrap().unwrap().frames as u64,
        report.frames_received
    );

    tokio::time::timeout(Duration::from_secs(10), server_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(registry.is_empty());
}

#[tokio::test]
async fn missing_source_closes_with_nothing_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("recorded.wav");

    let config = test_config(dir.path().join("missing.wav"));
    let format = config.audio_format().unwrap();

    let server = StreamServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.serve(std::future::pending()));

    let url = format!("ws://{}", addr);
    let report = client_session(format, output.clone(), None)
        .run(network::connect(&url), std::future::pending())
        .await;

    assert_eq!(report.state, ClientState::Closed);
    assert!(matches!(report.end, SessionEnd::PeerClosed));
    assert_eq!(report.frames_received, 0);
    assert!(matches!(report.recording, Ok(None)));
    assert!(!output.exists());

    server_task.abort();
}

#[tokio::test]
async fn status_endpoint_reports_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path().join("unused.wav"));

    let server = StreamServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.serve(std::future::pending()));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["mode"], "server");
    assert_eq!(json["data"]["active_sessions"], 0);
    assert_eq!(json["data"]["format"]["sample_rate_hz"], 24_000);

    server_task.abort();
}

#[tokio::test(start_paused = true)]
async fn memory_transport_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("recorded.wav");
    let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();

    // 2.5 frames of tone, so the loop wraps and pads
    let tone: Vec<u8> = (0..format.frame_byte_size() * 5 / 2)
        .map(|i| (i % 251) as u8)
        .collect();
    let source = FrameSource::new(tone, &format).unwrap();
    assert_eq!(source.frames_per_loop(), 3);

    let (sink, stream) = memory::pair(4);
    let server = tokio::spawn(
        StreamSession::new(
            source,
            OpusEncoder::new(&format, &OpusConfig::default()).unwrap(),
            sink,
            StreamOptions {
                frame_duration: format.frame_duration(),
                pacing: Pacing::FixedDelay,
                sent_every: 0,
                compression_every: 0,
            },
        )
        .run(),
    );

    let report = client_session(format, output.clone(), Some(8))
        .run(async { Ok(stream) }, std::future::pending())
        .await;

    assert!(matches!(report.end, SessionEnd::FrameLimit));
    assert_eq!(report.recording.unwrap().unwrap().payload_bytes, 8 * 5_760);

    let server_report = server.await.unwrap();
    assert_eq!(server_report.state, StreamState::Disconnected);
    assert!(server_report.frames_sent >= 8);
    assert!(server_report.error.is_none());
    assert!(server_report.stats.ratio() > 1.0);
}
