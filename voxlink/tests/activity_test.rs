/// Integration tests for the activity monitor
///
/// Drives the monitor with a synthetic clock, simulating the once-a-second
/// poll the session runs while connected.
use std::time::{Duration, Instant};

use voxlink_lib::activity::{ActivityConfig, ActivityMonitor};

fn at(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms)
}

#[test]
fn test_ten_seconds_of_silence_provokes_exactly_once() {
    let base = Instant::now();
    let mut monitor = ActivityMonitor::new(ActivityConfig::default(), base);

    // Silence from t=0 to t=10s, output volume pinned at zero, polled
    // every second
    let mut fires = Vec::new();
    for second in 0..=10u64 {
        let now = at(base, second * 1000);
        monitor.note_output(0.0, now);
        if monitor.poll_silence(now) {
            fires.push(second * 1000);
        }
    }

    assert_eq!(fires.len(), 1, "expected exactly one provocation");
    assert!(fires[0] >= 8000, "fired before the threshold: {:?}", fires);
}

#[test]
fn test_no_second_fire_before_threshold_rearms() {
    let base = Instant::now();
    let mut monitor = ActivityMonitor::new(ActivityConfig::default(), base);

    let mut fires = Vec::new();
    for second in 0..=20u64 {
        let now = at(base, second * 1000);
        if monitor.poll_silence(now) {
            fires.push(second * 1000);
        }
    }

    assert_eq!(fires.len(), 2);
    assert!(
        fires[1] >= fires[0] + 8000,
        "second fire arrived before re-arming: {:?}",
        fires
    );
    assert!(fires[1] < 16000 + 8000);
}

#[test]
fn test_speech_keeps_resetting_the_window() {
    let base = Instant::now();
    let mut monitor = ActivityMonitor::new(ActivityConfig::default(), base);

    // The user says something every five seconds
    for second in 0..=30u64 {
        let now = at(base, second * 1000);
        if second % 5 == 0 {
            monitor.note_input(0.5, now);
        }
        assert!(
            !monitor.poll_silence(now),
            "fired despite regular user activity at t={}s",
            second
        );
    }
}

#[test]
fn test_agent_speech_blocks_provocation() {
    let base = Instant::now();
    let mut monitor = ActivityMonitor::new(ActivityConfig::default(), base);

    // Agent output stays hot the whole time
    for second in 0..=30u64 {
        let now = at(base, second * 1000);
        monitor.note_output(0.3, now);
        assert!(!monitor.poll_silence(now));
        assert!(monitor.is_talking(now));
    }
}

#[test]
fn test_custom_threshold_is_respected() {
    let base = Instant::now();
    let config = ActivityConfig {
        silence_threshold: Duration::from_millis(2000),
        ..ActivityConfig::default()
    };
    let mut monitor = ActivityMonitor::new(config, base);

    assert!(!monitor.poll_silence(at(base, 1500)));
    assert!(monitor.poll_silence(at(base, 2500)));
}
