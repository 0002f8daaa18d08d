//! Output devices and blocking playback sinks
//!
//! cpal drives output from a callback, while the playback thread wants a
//! blocking `write`. [`CpalSink`] bridges the two with a small bounded
//! channel: `write` blocks once the device is a couple of frames behind,
//! which paces the writer at real time.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::pcm16_samples;
use crate::audio::format::AudioFormat;
use crate::constants::DEVICE_QUEUE_FRAMES;
use crate::error::AudioError;

/// Blocking sink for interleaved PCM16 bytes
pub trait DeviceSink {
    /// Queue `pcm` for output, blocking until the device has room
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError>;

    /// Human readable device name
    fn name(&self) -> &str;
}

/// Output device description for listings
#[derive(Debug, Clone, Serialize)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all output devices on the default host
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = output_capabilities(&device);
                devices.push(OutputDeviceInfo {
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get device capabilities
fn output_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut chans = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            // Rates Opus can carry, plus the common device rates
            for rate_val in [8_000u32, 12_000, 16_000, 24_000, 44_100, 48_000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !rates.contains(&rate_val)
                {
                    rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !chans.contains(&ch) {
                chans.push(ch);
            }
        }
    }

    rates.sort();
    chans.sort();
    (rates, chans)
}

/// Find an output device by name, or the default one
pub fn get_output_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        Some(wanted) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::CpalError(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
    }
}

/// cpal output stream fed through a bounded channel
pub struct CpalSink {
    name: String,
    tx: Option<Sender<Vec<i16>>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open `device_name` (or the default device) in `format`
    ///
    /// The cpal stream lives on its own thread; this returns once the stream
    /// is playing or has failed to start.
    pub fn open(device_name: Option<&str>, format: &AudioFormat) -> Result<Self, AudioError> {
        if format.bytes_per_sample() != 2 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} bytes per sample",
                format.bytes_per_sample()
            )));
        }

        let (tx, rx) = bounded::<Vec<i16>>(DEVICE_QUEUE_FRAMES);
        let (ready_tx, ready_rx) = bounded::<Result<String, AudioError>>(1);
        let running = Arc::new(AtomicBool::new(true));

        let config = StreamConfig {
            channels: format.channel_count(),
            sample_rate: cpal::SampleRate(format.sample_rate_hz()),
            buffer_size: cpal::BufferSize::Default,
        };
        let device_name = device_name.map(str::to_string);
        let running_for_loop = running.clone();

        let handle = thread::Builder::new()
            .name("playback-device".to_string())
            .spawn(move || {
                run_output_stream(device_name, config, rx, ready_tx, running_for_loop);
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamError("device thread exited".to_string()));
            }
        };

        tracing::info!("Using output device: {}", name);

        Ok(Self {
            name,
            tx: Some(tx),
            running,
            thread_handle: Some(handle),
        })
    }

    /// Stop the stream and join its thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.tx.take();

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_output_stream(
    device_name: Option<String>,
    config: StreamConfig,
    rx: Receiver<Vec<i16>>,
    ready_tx: Sender<Result<String, AudioError>>,
    running: Arc<AtomicBool>,
) {
    let device = match get_output_device(device_name.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let mut pending: VecDeque<i16> = VecDeque::new();
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            for sample in data.iter_mut() {
                if pending.is_empty() {
                    if let Ok(chunk) = rx.try_recv() {
                        pending.extend(chunk);
                    }
                }
                // Underrun plays silence
                *sample = pending.pop_front().unwrap_or(0);
            }
        },
        move |err| {
            tracing::error!("Audio output error: {}", err);
        },
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(name));

    // Keep the stream alive while running
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
}

impl DeviceSink for CpalSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        let tx = self.tx.as_ref().ok_or(AudioError::DeviceClosed)?;
        tx.send(pcm16_samples(pcm))
            .map_err(|_| AudioError::DeviceClosed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Discards audio at real-time pace
///
/// Used when playback is disabled or no device can be opened, so the
/// recording path behaves the same either way.
pub struct NullSink {
    byte_rate: u32,
}

impl NullSink {
    pub fn new(format: &AudioFormat) -> Self {
        Self {
            byte_rate: format.byte_rate(),
        }
    }
}

impl DeviceSink for NullSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        if self.byte_rate > 0 {
            let secs = pcm.len() as f64 / self.byte_rate as f64;
            thread::sleep(Duration::from_secs_f64(secs));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Open the requested device, falling back to [`NullSink`] when unavailable
pub fn open_sink(
    enabled: bool,
    device_name: Option<&str>,
    format: &AudioFormat,
) -> Box<dyn DeviceSink + Send> {
    if !enabled {
        tracing::info!("Playback disabled, audio will only be recorded");
        return Box::new(NullSink::new(format));
    }

    match CpalSink::open(device_name, format) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!("Failed to open output device ({}), recording only", e);
            Box::new(NullSink::new(format))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_null_sink_paces_writes() {
        // 8 kHz mono PCM16 = 16 000 bytes per second
        let format = AudioFormat::new(8_000, 1, 2, 10).unwrap();
        let mut sink = NullSink::new(&format);

        let started = Instant::now();
        sink.write(&vec![0u8; 800]).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(45));
        assert_eq!(sink.name(), "null");
    }

    #[test]
    fn test_disabled_playback_uses_null_sink() {
        let format = AudioFormat::new(24_000, 2, 2, 60).unwrap();
        let sink = open_sink(false, None, &format);
        assert_eq!(sink.name(), "null");
    }

    #[test]
    fn test_unknown_device_not_found() {
        // Holds with or without audio hardware
        let result = get_output_device(Some("definitely-not-a-real-device-name"));
        assert!(result.is_err());
    }
}
