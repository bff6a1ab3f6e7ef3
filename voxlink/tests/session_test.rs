/// Integration tests for the session core
///
/// Drives a LiveSession through a channel-backed TransportLink, which is
/// exactly the boundary the production WebSocket client feeds. Audio
/// hardware may be absent in the test environment; engine start failures
/// surface as session error events and the wiring under test carries on.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use voxlink_lib::config::SessionConfig;
use voxlink_lib::session::LiveSession;
use voxlink_lib::transport::{ClientMessage, TransportEvent, TransportLink};

struct Harness {
    session: LiveSession,
    events_tx: mpsc::Sender<TransportEvent>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
}

fn bind_session(config: SessionConfig) -> Harness {
    let mut session = LiveSession::new(config);
    let (events_tx, events_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(16);

    session.bind(TransportLink {
        events: events_rx,
        outbound: outbound_tx,
    });

    Harness {
        session,
        events_tx,
        outbound_rx,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test]
async fn test_open_and_close_drive_connection_state() {
    let harness = bind_session(SessionConfig::default());

    assert!(!harness.session.snapshot().connected);

    harness.events_tx.send(TransportEvent::Open).await.unwrap();
    let session = &harness.session;
    wait_for(|| session.snapshot().connected, "connected state").await;

    harness.events_tx.send(TransportEvent::Closed).await.unwrap();
    wait_for(|| !session.snapshot().connected, "disconnected state").await;
}

#[tokio::test]
async fn test_generating_flag_bookkeeping() {
    let harness = bind_session(SessionConfig::default());
    let session = &harness.session;

    harness.events_tx.send(TransportEvent::Open).await.unwrap();
    wait_for(|| session.snapshot().connected, "connected state").await;

    harness
        .events_tx
        .send(TransportEvent::TurnComplete)
        .await
        .unwrap();
    wait_for(|| session.snapshot().generating, "generating set").await;

    // The interruption notification clears the flag and nothing more;
    // it must never cascade into a playback interrupt
    harness
        .events_tx
        .send(TransportEvent::Interrupted)
        .await
        .unwrap();
    wait_for(|| !session.snapshot().generating, "generating cleared").await;
    assert!(session.snapshot().connected);
}

#[tokio::test]
async fn test_incoming_audio_clears_generating() {
    let harness = bind_session(SessionConfig::default());
    let session = &harness.session;

    harness.events_tx.send(TransportEvent::Open).await.unwrap();
    harness
        .events_tx
        .send(TransportEvent::TurnComplete)
        .await
        .unwrap();
    wait_for(|| session.snapshot().generating, "generating set").await;

    // Odd-length payloads are malformed; the session logs and carries on
    harness
        .events_tx
        .send(TransportEvent::Audio(vec![0x00, 0x01, 0x02]))
        .await
        .unwrap();
    wait_for(|| !session.snapshot().generating, "generating cleared").await;
    assert!(session.snapshot().connected);
}

#[tokio::test]
async fn test_close_clears_generating() {
    let harness = bind_session(SessionConfig::default());
    let session = &harness.session;

    harness.events_tx.send(TransportEvent::Open).await.unwrap();
    harness
        .events_tx
        .send(TransportEvent::TurnComplete)
        .await
        .unwrap();
    wait_for(|| session.snapshot().generating, "generating set").await;

    harness.events_tx.send(TransportEvent::Closed).await.unwrap();
    wait_for(
        || {
            let snapshot = session.snapshot();
            !snapshot.connected && !snapshot.generating
        },
        "close cleared both flags",
    )
    .await;
}

#[tokio::test]
async fn test_mute_is_reflected_in_snapshot() {
    let harness = bind_session(SessionConfig::default());

    assert!(!harness.session.is_muted());
    harness.session.set_muted(true);
    assert!(harness.session.is_muted());
    assert!(harness.session.snapshot().muted);

    harness.session.set_muted(false);
    assert!(!harness.session.snapshot().muted);
}

#[tokio::test]
async fn test_silence_provocation_reaches_transport() {
    // Tight thresholds so the debounced timer fires within the test budget
    let config = SessionConfig {
        silence_threshold_ms: 200,
        activity_tick_ms: 50,
        ..SessionConfig::default()
    };
    let mut harness = bind_session(config);

    harness.events_tx.send(TransportEvent::Open).await.unwrap();

    let directive = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match harness.outbound_rx.recv().await {
                Some(ClientMessage::Text(text)) => break text,
                Some(_) => continue,
                None => panic!("outbound channel closed before provocation"),
            }
        }
    })
    .await
    .expect("no provocation within the timeout");

    assert!(directive.out_of_band);
    assert!(!directive.text.is_empty());
}

#[tokio::test]
async fn test_session_error_event_is_broadcast() {
    let harness = bind_session(SessionConfig::default());
    let mut events = harness.session.events();

    harness.events_tx.send(TransportEvent::Open).await.unwrap();
    harness
        .events_tx
        .send(TransportEvent::Error {
            message: "quota exceeded".to_string(),
        })
        .await
        .unwrap();

    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(voxlink_lib::SessionEvent::Error { message }) => break message,
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("no error event within the timeout");

    assert_eq!(found, "quota exceeded");
}
