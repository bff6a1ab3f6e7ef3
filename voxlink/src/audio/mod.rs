/// Lock-free sample handoff between device callbacks and tasks
pub mod buffer;

/// Microphone capture engine
pub mod capture;

/// PCM wire codec (i16-LE <-> f32)
pub mod codec;

/// Audio device enumeration and selection
pub mod device;

/// Audio-related error types
pub mod error;

/// Rolling capture history
pub mod history;

/// Block volume metering
pub mod meter;

/// Lookahead playback scheduler
pub mod playback;

/// Device-rate to capture-rate resampling
pub mod resampler;

// Re-export commonly used types
pub use capture::{CaptureEngine, CaptureState, EncodedChunk};
pub use device::{AudioDeviceInfo, list_input_devices, list_output_devices};
pub use error::{AudioError, AudioResult};
pub use history::HistoryBuffer;
pub use meter::{MeterInstall, MeterTap};
pub use playback::{AnalysisFrame, PlaybackEvent, PlaybackScheduler};
pub use resampler::CaptureResampler;
