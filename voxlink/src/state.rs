//! Published session state
//!
//! A lock-free snapshot of the observable session state, swapped atomically
//! so UI readers never block the audio or session tasks.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

/// Read-only view of the session exposed at the UI boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Transport channel is open
    pub connected: bool,
    /// Model turn finished while the audio tail is still streaming
    pub generating: bool,
    /// Captured audio is withheld from the transport
    pub muted: bool,
    /// Latest capture volume sample
    pub input_volume: f32,
    /// Latest playback volume sample
    pub output_volume: f32,
    /// Agent currently audible (with trailing cooldown)
    pub talking: bool,
}

/// Handle publishing and reading [`SessionSnapshot`]s.
pub struct StateHandle {
    current: ArcSwap<SessionSnapshot>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(SessionSnapshot::default()),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.current.load_full()
    }

    /// Publish a modified snapshot. The closure may run more than once if
    /// publishers race.
    pub fn update(&self, mutate: impl Fn(&mut SessionSnapshot)) {
        self.current.rcu(|current| {
            let mut next = (**current).clone();
            mutate(&mut next);
            next
        });
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot() {
        let state = StateHandle::new();
        let snapshot = state.snapshot();
        assert!(!snapshot.connected);
        assert!(!snapshot.generating);
        assert!(!snapshot.muted);
        assert_eq!(snapshot.input_volume, 0.0);
    }

    #[test]
    fn test_update_publishes_new_snapshot() {
        let state = StateHandle::new();
        state.update(|s| s.connected = true);
        state.update(|s| s.input_volume = 0.4);

        let snapshot = state.snapshot();
        assert!(snapshot.connected);
        assert!((snapshot.input_volume - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_old_snapshots_are_unaffected() {
        let state = StateHandle::new();
        let before = state.snapshot();
        state.update(|s| s.connected = true);

        assert!(!before.connected);
        assert!(state.snapshot().connected);
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = StateHandle::new();
        state.update(|s| s.talking = true);
        let json = serde_json::to_string(&*state.snapshot()).unwrap();
        assert!(json.contains("\"talking\":true"));
    }
}
