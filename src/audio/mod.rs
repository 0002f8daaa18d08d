//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod format;
pub mod loader;
pub mod playback;
pub mod recorder;
pub mod source;
pub mod wav;

pub use buffer::{PlaybackBuffer, RawFrame, SharedPlaybackBuffer};
pub use device::{list_output_devices, open_sink, CpalSink, DeviceSink, NullSink};
pub use format::AudioFormat;
pub use playback::PlaybackWorker;
pub use recorder::{CaptureRecorder, RecordingSummary};
pub use source::FrameSource;
