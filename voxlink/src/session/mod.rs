//! Live session orchestration
//!
//! [`LiveSession`] binds the transport boundary to the audio engines:
//! transport events drive engine lifecycle and the generating flag, captured
//! chunks flow out (unless muted), incoming audio is queued for playback,
//! and the activity monitor provokes the agent after long user silence.
//!
//! The session only ever sees the typed channels of a [`TransportLink`];
//! [`LiveSession::connect`] wires those channels to the WebSocket client,
//! while [`LiveSession::bind`] accepts any other implementation of the
//! boundary (tests drive it with plain channels).
//!
//! Interruption policy: the transport's `interrupted` notification updates
//! generation-status bookkeeping only. It is intentionally never wired to
//! `PlaybackScheduler::interrupt`, so audio already scheduled plays out.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::activity::ActivityMonitor;
use crate::audio::capture::{CaptureEngine, CaptureState, EncodedChunk};
use crate::audio::error::AudioResult;
use crate::audio::playback::{AnalysisFrame, PlaybackEvent, PlaybackScheduler};
use crate::config::SessionConfig;
use crate::state::{SessionSnapshot, StateHandle};
use crate::transport::{
    ClientMessage, CloseMessage, ConnectionConfig, LiveConnection, TextDirective, TransportEvent,
    TransportLink, TransportResult,
};
use crate::transport::tasks::{receiver_task, sender_task};

/// Events surfaced at the UI boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Transport channel opened
    Connected,
    /// Transport channel closed
    Disconnected,
    /// Generating flag changed
    Generating(bool),
    /// Playback queue and active set drained naturally
    PlaybackComplete,
    /// Silence provocation sent to the agent
    Provoked,
    /// Something went wrong but the session carries on
    Error { message: String },
}

struct Shared {
    config: SessionConfig,
    state: StateHandle,
    capture: CaptureEngine,
    playback: PlaybackScheduler,
    muted: AtomicBool,
    monitor: StdMutex<ActivityMonitor>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn set_generating(&self, generating: bool) {
        if self.state.snapshot().generating == generating {
            return;
        }
        self.state.update(|s| s.generating = generating);
        self.emit(SessionEvent::Generating(generating));
    }
}

/// Bidirectional live voice session.
pub struct LiveSession {
    shared: Arc<Shared>,
    outbound_tx: Option<mpsc::Sender<ClientMessage>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSession {
    /// Create an idle session; no hardware or network is touched yet.
    pub fn new(config: SessionConfig) -> Self {
        let capture = CaptureEngine::new(config.capture_config());
        let playback = PlaybackScheduler::new(config.playback_config());
        let monitor = ActivityMonitor::new(config.activity_config(), Instant::now());
        let (events_tx, _) = broadcast::channel(64);

        Self {
            shared: Arc::new(Shared {
                config,
                state: StateHandle::new(),
                capture,
                playback,
                muted: AtomicBool::new(false),
                monitor: StdMutex::new(monitor),
                events_tx,
            }),
            outbound_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Open the WebSocket transport and bind the session to it.
    pub async fn connect(
        &mut self,
        api_key: &str,
        connection: ConnectionConfig,
    ) -> TransportResult<()> {
        if self.outbound_tx.is_some() && self.shared.state.snapshot().connected {
            debug!("Session already connected");
            return Ok(());
        }
        self.tasks.retain(|task| !task.is_finished());

        let conn = LiveConnection::connect(api_key, &connection).await?;
        let (writer, reader) = conn.split();

        let (events_tx, events_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);

        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = sender_task(writer, outbound_rx).await {
                warn!(error = %e, "Transport sender failed");
            }
        }));
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = receiver_task(reader, events_tx).await {
                warn!(error = %e, "Transport receiver failed");
            }
        }));

        self.bind(TransportLink {
            events: events_rx,
            outbound: outbound_tx,
        });
        Ok(())
    }

    /// Bind the session core to an already-established transport boundary.
    pub fn bind(&mut self, link: TransportLink) {
        self.outbound_tx = Some(link.outbound.clone());
        let shared = Arc::clone(&self.shared);
        self.tasks
            .push(tokio::spawn(run_loop(shared, link.events, link.outbound)));
    }

    /// Request a graceful close. Teardown completes when the transport
    /// reports `Closed`.
    pub async fn disconnect(&mut self) {
        if let Some(outbound) = self.outbound_tx.take() {
            info!("Disconnecting session");
            let _ = outbound
                .send(ClientMessage::Close(CloseMessage::new()))
                .await;
        }
    }

    /// Stop feeding captured audio to the transport without releasing the
    /// capture device.
    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
        self.shared.state.update(|s| s.muted = muted);
        debug!(muted, "Mute toggled");
    }

    /// Whether capture is currently withheld from the transport.
    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    /// Replay the recent capture history through the playback engine at an
    /// altered rate. Purely local; the transport never sees it.
    pub fn replay_last(&self, rate: f64) -> AudioResult<()> {
        let samples = self
            .shared
            .capture
            .last_audio(self.shared.config.replay_seconds);
        self.shared
            .playback
            .replay(samples, self.shared.config.capture_sample_rate, rate)
    }

    /// Latest published snapshot of the observable session state.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.shared.state.snapshot()
    }

    /// Subscribe to session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Live analysis tap of the output path, for visualization.
    pub fn analysis(&self) -> watch::Receiver<AnalysisFrame> {
        self.shared.playback.analysis()
    }

    /// Capture engine lifecycle state.
    pub fn capture_state(&self) -> CaptureState {
        self.shared.capture.state()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.shared.playback.shutdown();
    }
}

/// Consume transport events until the channel closes.
async fn run_loop(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<ClientMessage>,
) {
    let mut engine_tasks: Vec<JoinHandle<()>> = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Open => {
                info!("Session transport open");
                for task in &engine_tasks {
                    task.abort();
                }
                shared.state.update(|s| s.connected = true);
                shared.emit(SessionEvent::Connected);
                engine_tasks = spin_up_engines(&shared, &outbound).await;
            }

            TransportEvent::SessionStarted { session_id } => {
                info!(%session_id, "Session acknowledged");
            }

            TransportEvent::Audio(bytes) => {
                shared.set_generating(false);
                if let Err(e) = shared.playback.enqueue(&bytes) {
                    warn!(error = %e, "Failed to queue incoming audio");
                }
            }

            // Bookkeeping only: the generating flag clears, but scheduled
            // audio keeps playing. Do not route this to interrupt().
            TransportEvent::Interrupted => {
                debug!("Server signaled interruption; letting output finish");
                shared.set_generating(false);
            }

            TransportEvent::TurnComplete => {
                shared.set_generating(true);
            }

            TransportEvent::Error { message } => {
                error!(%message, "Transport error");
                shared.emit(SessionEvent::Error { message });
            }

            TransportEvent::Closed => {
                info!("Session transport closed");
                shared.state.update(|s| {
                    s.connected = false;
                    s.generating = false;
                });
                shared.emit(SessionEvent::Disconnected);
                break;
            }
        }
    }

    for task in &engine_tasks {
        task.abort();
    }
    shared.capture.stop().await;
    shared.playback.drain_to_silence();
    debug!("Session run loop finished");
}

/// Start engines and helper tasks once the transport is open.
async fn spin_up_engines(
    shared: &Arc<Shared>,
    outbound: &mpsc::Sender<ClientMessage>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    // Output graph first so incoming audio never races an idle clock
    if let Err(e) = shared.playback.resume() {
        warn!(error = %e, "Output graph unavailable; playback degraded");
        shared.emit(SessionEvent::Error {
            message: e.to_string(),
        });
    }

    match shared.playback.ensure_meter() {
        Ok(install) => {
            tasks.push(tokio::spawn(pump_output_volume(
                Arc::clone(shared),
                install.tap().watch(),
            )));
        }
        Err(e) => warn!(error = %e, "No output metering"),
    }

    tasks.push(tokio::spawn(forward_playback_events(Arc::clone(shared))));

    // Capture: a failure is surfaced but the session stays up
    let (data_tx, data_rx) = mpsc::channel::<EncodedChunk>(32);
    match shared.capture.start(data_tx).await {
        Ok(()) => {
            tasks.push(tokio::spawn(forward_capture(
                Arc::clone(shared),
                data_rx,
                outbound.clone(),
            )));

            match shared.capture.ensure_meter() {
                Ok(install) => {
                    tasks.push(tokio::spawn(pump_input_volume(
                        Arc::clone(shared),
                        install.tap().watch(),
                    )));
                }
                Err(e) => warn!(error = %e, "No input metering"),
            }
        }
        Err(e) => {
            error!(error = %e, "Capture engine failed to start");
            shared.emit(SessionEvent::Error {
                message: e.to_string(),
            });
        }
    }

    tasks.push(tokio::spawn(activity_ticker(
        Arc::clone(shared),
        outbound.clone(),
    )));

    tasks
}

/// Feed encoded capture blocks to the transport, skipping them while muted.
async fn forward_capture(
    shared: Arc<Shared>,
    mut data_rx: mpsc::Receiver<EncodedChunk>,
    outbound: mpsc::Sender<ClientMessage>,
) {
    let mut first = true;
    while let Some(chunk) = data_rx.recv().await {
        if shared.muted.load(Ordering::Relaxed) {
            continue;
        }

        let mut message = crate::transport::AudioInput::from_wire(&chunk.bytes, chunk.sample_rate);
        if first {
            message = message.with_sample_rate(chunk.sample_rate);
            first = false;
        }

        if outbound.send(ClientMessage::Audio(message)).await.is_err() {
            debug!("Outbound channel closed, capture forwarder exiting");
            break;
        }
    }
}

/// Mirror input volume into the snapshot and the activity monitor.
async fn pump_input_volume(shared: Arc<Shared>, mut volume_rx: watch::Receiver<f32>) {
    while volume_rx.changed().await.is_ok() {
        let volume = *volume_rx.borrow_and_update();
        let now = Instant::now();

        shared.state.update(|s| s.input_volume = volume);
        if let Ok(mut monitor) = shared.monitor.lock() {
            monitor.note_input(volume, now);
        }
    }
}

/// Mirror output volume into the snapshot, the talking flag and the
/// activity monitor.
async fn pump_output_volume(shared: Arc<Shared>, mut volume_rx: watch::Receiver<f32>) {
    while volume_rx.changed().await.is_ok() {
        let volume = *volume_rx.borrow_and_update();
        let now = Instant::now();

        let talking = match shared.monitor.lock() {
            Ok(mut monitor) => {
                monitor.note_output(volume, now);
                monitor.is_talking(now)
            }
            Err(_) => false,
        };

        shared.state.update(|s| {
            s.output_volume = volume;
            s.talking = talking;
        });
    }
}

/// Surface playback completion at the session boundary.
async fn forward_playback_events(shared: Arc<Shared>) {
    let mut events = shared.playback.events();
    loop {
        match events.recv().await {
            Ok(PlaybackEvent::Complete) => shared.emit(SessionEvent::PlaybackComplete),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Playback event stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Poll the silence monitor while connected; fire the provocation directive
/// when the debounced trigger says so.
async fn activity_ticker(shared: Arc<Shared>, outbound: mpsc::Sender<ClientMessage>) {
    let mut ticker = interval(shared.config.activity_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if !shared.state.snapshot().connected {
            break;
        }

        let fire = match shared.monitor.lock() {
            Ok(mut monitor) => monitor.poll_silence(Instant::now()),
            Err(_) => false,
        };
        if !fire {
            continue;
        }

        info!("User silence threshold crossed, provoking agent");
        let directive = TextDirective::new(shared.config.provoke_directive.clone());
        if outbound
            .send(ClientMessage::Text(directive))
            .await
            .is_err()
        {
            break;
        }
        shared.emit(SessionEvent::Provoked);
    }
}
