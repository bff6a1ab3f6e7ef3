//! Session configuration
//!
//! All recognized tunables for the audio core, with the recommended values
//! as defaults. Durations are stored in milliseconds so the whole structure
//! round-trips through JSON config files unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Device constraint flags requested when the capture stream starts.
///
/// The native audio host does not expose browser-style processing toggles,
/// so these travel with the config and are recorded at stream start; the
/// policy is echo cancellation on, noise suppression and auto gain off to
/// keep capture latency and jitter down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}

/// Tunables for the whole session core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wire sample rate of captured audio
    pub capture_sample_rate: u32,
    /// Sample rate of audio arriving from the transport
    pub playback_sample_rate: u32,
    /// Samples per encoded capture block
    pub wire_block_samples: usize,
    /// Sub-block size the playback queue splits incoming chunks into
    pub chunk_samples: usize,
    /// Lead applied when scheduling starts from idle
    pub schedule_lead_ms: u64,
    /// How far ahead of the audio clock the scheduler commits work
    pub lookahead_ms: u64,
    /// Scheduling loop tick
    pub tick_interval_ms: u64,
    /// Gain ramp length for drain-to-silence
    pub drain_ramp_ms: u64,
    /// Capture history retention
    pub history_seconds: f32,
    /// Window replayed by the replay trigger
    pub replay_seconds: f32,
    /// Input volume above this counts as user activity
    pub input_floor: f32,
    /// Output volume above this counts as the agent talking
    pub output_floor: f32,
    /// Trailing window before "talking" flips back off
    pub talk_cooldown_ms: u64,
    /// User silence longer than this triggers a provocation
    pub silence_threshold_ms: u64,
    /// Activity monitor poll interval
    pub activity_tick_ms: u64,
    /// Constraint flags requested from the capture device
    pub constraints: CaptureConstraints,
    /// Capture device id (None = platform default)
    pub input_device: Option<String>,
    /// Playback device id (None = platform default)
    pub output_device: Option<String>,
    /// Out-of-band text sent when the silence timer fires
    pub provoke_directive: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            wire_block_samples: 2048,
            chunk_samples: 2048,
            schedule_lead_ms: 20,
            lookahead_ms: 100,
            tick_interval_ms: 20,
            drain_ramp_ms: 50,
            history_seconds: 5.0,
            replay_seconds: 3.0,
            input_floor: 0.01,
            output_floor: 0.05,
            talk_cooldown_ms: 500,
            silence_threshold_ms: 8000,
            activity_tick_ms: 1000,
            constraints: CaptureConstraints::default(),
            input_device: None,
            output_device: None,
            provoke_directive:
                "(The user has been silent for a while. Break the silence and draw them back \
                 into the conversation.)"
                    .to_string(),
        }
    }
}

impl SessionConfig {
    pub fn schedule_lead(&self) -> Duration {
        Duration::from_millis(self.schedule_lead_ms)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn drain_ramp(&self) -> Duration {
        Duration::from_millis(self.drain_ramp_ms)
    }

    pub fn talk_cooldown(&self) -> Duration {
        Duration::from_millis(self.talk_cooldown_ms)
    }

    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    pub fn activity_tick(&self) -> Duration {
        Duration::from_millis(self.activity_tick_ms)
    }

    /// Capture engine view of the config.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.capture_sample_rate,
            wire_block_samples: self.wire_block_samples,
            history_seconds: self.history_seconds,
            constraints: self.constraints,
            device: self.input_device.clone(),
        }
    }

    /// Playback engine view of the config.
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: self.playback_sample_rate,
            chunk_samples: self.chunk_samples,
            schedule_lead: self.schedule_lead(),
            lookahead: self.lookahead(),
            tick_interval: self.tick_interval(),
            drain_ramp: self.drain_ramp(),
            device: self.output_device.clone(),
        }
    }

    /// Activity monitor view of the config.
    pub fn activity_config(&self) -> crate::activity::ActivityConfig {
        crate::activity::ActivityConfig {
            input_floor: self.input_floor,
            output_floor: self.output_floor,
            talk_cooldown: self.talk_cooldown(),
            silence_threshold: self.silence_threshold(),
        }
    }
}

/// Capture engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub wire_block_samples: usize,
    pub history_seconds: f32,
    pub constraints: CaptureConstraints,
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        SessionConfig::default().capture_config()
    }
}

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub schedule_lead: Duration,
    pub lookahead: Duration,
    pub tick_interval: Duration,
    pub drain_ramp: Duration,
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        SessionConfig::default().playback_config()
    }
}
