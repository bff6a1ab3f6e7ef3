//! Block volume metering
//!
//! Both engines publish a non-negative level per processed block on a watch
//! channel. Installing the meter on an engine graph is an idempotent
//! "ensure installed" operation: the first call yields
//! [`MeterInstall::Installed`], later calls yield
//! [`MeterInstall::AlreadyInstalled`] with a handle to the same tap.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Root-mean-square level of a sample block.
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    energy.sqrt()
}

/// Peak absolute level of a sample block.
pub fn block_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Read side of an installed volume meter.
#[derive(Clone)]
pub struct MeterTap {
    level: watch::Receiver<f32>,
}

impl MeterTap {
    /// Latest published level.
    pub fn level(&self) -> f32 {
        *self.level.borrow()
    }

    /// Watch receiver for awaiting level changes.
    pub fn watch(&self) -> watch::Receiver<f32> {
        self.level.clone()
    }
}

/// Outcome of installing a meter stage on an engine graph.
pub enum MeterInstall {
    /// The stage was installed by this call.
    Installed(MeterTap),
    /// The stage was already present; the existing tap is returned.
    AlreadyInstalled(MeterTap),
}

impl MeterInstall {
    /// The tap, regardless of which call installed the stage.
    pub fn tap(self) -> MeterTap {
        match self {
            Self::Installed(tap) | Self::AlreadyInstalled(tap) => tap,
        }
    }

    /// True when this call performed the install.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Installed(_))
    }
}

/// Publish side of the meter, owned by an engine.
pub(crate) struct MeterStage {
    sender: watch::Sender<f32>,
    receiver: watch::Receiver<f32>,
    installed: AtomicBool,
}

impl MeterStage {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(0.0f32);
        Self {
            sender,
            receiver,
            installed: AtomicBool::new(false),
        }
    }

    /// Publish the level of one processed block.
    pub fn publish(&self, level: f32) {
        let _ = self.sender.send(level);
    }

    /// Idempotent install returning an explicit already-installed variant.
    pub fn ensure_installed(&self) -> MeterInstall {
        let tap = MeterTap {
            level: self.receiver.clone(),
        };
        if self.installed.swap(true, Ordering::SeqCst) {
            MeterInstall::AlreadyInstalled(tap)
        } else {
            MeterInstall::Installed(tap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_constant_block() {
        let level = block_rms(&[0.5; 256]);
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rms_of_empty_block() {
        assert_eq!(block_rms(&[]), 0.0);
    }

    #[test]
    fn test_peak() {
        assert_eq!(block_peak(&[0.1, -0.8, 0.3]), 0.8);
        assert_eq!(block_peak(&[]), 0.0);
    }

    #[test]
    fn test_ensure_installed_is_idempotent() {
        let stage = MeterStage::new();

        let first = stage.ensure_installed();
        assert!(first.is_fresh());

        let second = stage.ensure_installed();
        assert!(!second.is_fresh());
        assert!(matches!(second, MeterInstall::AlreadyInstalled(_)));
    }

    #[test]
    fn test_taps_share_published_levels() {
        let stage = MeterStage::new();
        let tap = stage.ensure_installed().tap();
        let other = stage.ensure_installed().tap();

        stage.publish(0.42);
        assert!((tap.level() - 0.42).abs() < 1e-6);
        assert!((other.level() - 0.42).abs() < 1e-6);
    }
}
