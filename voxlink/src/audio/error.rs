use thiserror::Error;

/// Audio-related errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// Microphone or speaker could not be acquired (missing or denied)
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Wire input is not a whole number of 16-bit frames
    #[error("Malformed wire input: {0}")]
    MalformedInput(String),

    /// A processing stage could not be installed on the engine graph
    #[error("Graph init failure: {0}")]
    GraphInit(String),

    /// Failed to build an audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuild(String),

    /// Audio stream error
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Resampling failed
    #[error("Resampling failed: {0}")]
    Resample(String),

    /// Device name is invalid
    #[error("Device name is invalid UTF-8")]
    InvalidDeviceName,

    /// cpal enumeration error
    #[error("cpal error: {0}")]
    Devices(#[from] cpal::DevicesError),

    /// Default config error
    #[error("Default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// Supported config error
    #[error("Supported config error: {0}")]
    SupportedConfig(#[from] cpal::SupportedStreamConfigsError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
