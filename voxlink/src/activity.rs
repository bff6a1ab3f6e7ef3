//! Activity monitor
//!
//! Tracks when the user last produced input volume and when the agent was
//! last audible, and derives two signals from them: an "agent is talking"
//! boolean with a trailing cooldown, and a debounced silence trigger that
//! fires at most once per silence window. All methods take the current
//! instant, so the logic runs against a synthetic clock in tests.

use std::time::{Duration, Instant};

/// Thresholds for the activity monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityConfig {
    /// Input volume above this counts as user activity.
    pub input_floor: f32,
    /// Output volume above this counts as the agent talking.
    pub output_floor: f32,
    /// Trailing window before "talking" flips back off.
    pub talk_cooldown: Duration,
    /// User silence longer than this triggers a provocation.
    pub silence_threshold: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            input_floor: 0.01,
            output_floor: 0.05,
            talk_cooldown: Duration::from_millis(500),
            silence_threshold: Duration::from_millis(8000),
        }
    }
}

/// Silence and speaking-state tracker.
pub struct ActivityMonitor {
    config: ActivityConfig,
    last_input_activity: Instant,
    last_output_activity: Option<Instant>,
    last_output_volume: f32,
}

impl ActivityMonitor {
    pub fn new(config: ActivityConfig, now: Instant) -> Self {
        Self {
            config,
            last_input_activity: now,
            last_output_activity: None,
            last_output_volume: 0.0,
        }
    }

    /// Record one input volume sample.
    pub fn note_input(&mut self, volume: f32, now: Instant) {
        if volume > self.config.input_floor {
            self.last_input_activity = now;
        }
    }

    /// Record one output volume sample.
    ///
    /// Output above its floor also refreshes the input-activity instant, so
    /// the silence timer cannot fire while the agent is audible.
    pub fn note_output(&mut self, volume: f32, now: Instant) {
        self.last_output_volume = volume;
        if volume > self.config.output_floor {
            self.last_output_activity = Some(now);
            self.last_input_activity = now;
        }
    }

    /// Whether the agent is currently audible, with the trailing cooldown.
    pub fn is_talking(&self, now: Instant) -> bool {
        if self.last_output_volume > self.config.output_floor {
            return true;
        }
        match self.last_output_activity {
            Some(at) => now.duration_since(at) < self.config.talk_cooldown,
            None => false,
        }
    }

    /// Level-triggered, debounced silence check.
    ///
    /// Returns true at most once per silence window: when the user has been
    /// silent beyond the threshold while the agent is quiet, the trigger
    /// fires and the input-activity instant resets so the next poll re-arms
    /// instead of firing again.
    pub fn poll_silence(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_input_activity) <= self.config.silence_threshold {
            return false;
        }
        if self.last_output_volume >= self.config.output_floor {
            return false;
        }
        self.last_input_activity = now;
        true
    }

    /// Seconds since the last recorded user activity.
    pub fn silence_elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.last_input_activity)
    }
}
