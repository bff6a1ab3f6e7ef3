//! Playback scheduler
//!
//! Owns the output audio graph: a mixer of active voices, a ramping gain
//! stage, an analysis tap, and a cpal output stream on a dedicated thread.
//! Incoming wire chunks are decoded, split into fixed sub-blocks and queued;
//! a 20 ms scheduling tick commits queued blocks onto a precise timeline a
//! lookahead window ahead of the audio clock. The clock itself counts frames
//! actually delivered to the device, so a stalled device stalls the clock
//! and the next tick realigns the cursor.
//!
//! Interruption semantics: `interrupt()` is the only thing that truncates
//! scheduled audio. An upstream "interrupted" notification from the
//! transport is bookkeeping at the session layer and is deliberately NOT
//! routed here, so in-flight output finishes naturally.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::audio::codec;
use crate::audio::device::find_output_device;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::meter::{MeterInstall, MeterStage, block_peak, block_rms};
use crate::config::PlaybackConfig;

/// Number of bars in the analysis waveform snapshot.
const WAVEFORM_BARS: usize = 16;

/// Events emitted by the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Queue and active set both drained naturally; fired exactly once per
    /// busy-to-idle transition.
    Complete,
}

/// One frame of the live analysis tap, computed per rendered device block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisFrame {
    pub rms: f32,
    pub peak: f32,
    /// Coarse RMS bars over the rendered block, for visualization.
    pub waveform: Vec<f32>,
}

/// Audio-clock time derived from frames delivered to the output device.
pub(crate) struct AudioClock {
    frames: AtomicU64,
    rate: AtomicU32,
}

impl AudioClock {
    pub(crate) fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            rate: AtomicU32::new(0),
        }
    }

    pub(crate) fn set_rate(&self, rate: u32) {
        self.rate.store(rate, Ordering::Release);
    }

    pub(crate) fn rate(&self) -> u32 {
        self.rate.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub(crate) fn frame(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Seconds of audio delivered so far; 0.0 until the graph exists.
    pub(crate) fn now(&self) -> f64 {
        let rate = self.rate();
        if rate == 0 {
            0.0
        } else {
            self.frame() as f64 / rate as f64
        }
    }
}

/// One sounding unit inside the mixer.
struct Voice {
    id: u64,
    samples: Arc<Vec<f32>>,
    /// Fractional read position within `samples`.
    pos: f64,
    /// Position advance per output frame (source_rate * rate / device_rate).
    step: f64,
    /// Clock frame at which this voice begins sounding.
    start_frame: u64,
}

/// Sums active voices and applies the ramping gain stage. Lives behind a
/// mutex the device callback takes with `try_lock`; on contention the block
/// renders silent and voices resume on the next callback.
pub(crate) struct Mixer {
    voices: Vec<Voice>,
    gain: f32,
    gain_target: f32,
    /// Per-frame gain increment while ramping; 0.0 when settled.
    gain_step: f32,
    ended_tx: mpsc::UnboundedSender<u64>,
}

impl Mixer {
    fn new(ended_tx: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            voices: Vec::new(),
            gain: 1.0,
            gain_target: 1.0,
            gain_step: 0.0,
            ended_tx,
        }
    }

    fn add_voice(&mut self, voice: Voice) {
        self.voices.push(voice);
    }

    /// Drop every voice without end notifications.
    fn clear_voices(&mut self) {
        self.voices.clear();
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
        self.gain_target = gain;
        self.gain_step = 0.0;
    }

    fn ramp_gain(&mut self, target: f32, frames: u64) {
        if frames == 0 {
            self.set_gain(target);
            return;
        }
        self.gain_target = target;
        self.gain_step = (target - self.gain) / frames as f32;
    }

    /// Render mono frames beginning at clock frame `start_frame`.
    fn render(&mut self, out: &mut [f32], start_frame: u64) {
        for (i, slot) in out.iter_mut().enumerate() {
            let frame = start_frame + i as u64;
            let mut acc = 0.0f32;

            for voice in &mut self.voices {
                if voice.start_frame > frame {
                    continue;
                }
                let idx = voice.pos.floor() as usize;
                if idx + 1 < voice.samples.len() {
                    let frac = (voice.pos - idx as f64) as f32;
                    acc += voice.samples[idx] * (1.0 - frac) + voice.samples[idx + 1] * frac;
                } else if idx < voice.samples.len() {
                    acc += voice.samples[idx];
                }
                voice.pos += voice.step;
            }

            if self.gain_step != 0.0 {
                self.gain += self.gain_step;
                let settled = (self.gain_step > 0.0 && self.gain >= self.gain_target)
                    || (self.gain_step < 0.0 && self.gain <= self.gain_target);
                if settled {
                    self.gain = self.gain_target;
                    self.gain_step = 0.0;
                }
            }

            *slot = acc * self.gain;
        }

        let ended_tx = self.ended_tx.clone();
        self.voices.retain(|voice| {
            let done = voice.pos >= voice.samples.len() as f64;
            if done {
                let _ = ended_tx.send(voice.id);
            }
            !done
        });
    }
}

/// A queued block committed to the timeline by one scheduling pass.
pub(crate) struct ScheduledUnit {
    pub(crate) id: u64,
    pub(crate) samples: Arc<Vec<f32>>,
    pub(crate) start_time: f64,
}

/// Queue, cursor and active-set bookkeeping. Pure state transitions driven
/// by an injected clock value, so the timing logic is testable without a
/// device.
pub(crate) struct SchedulerCore {
    queue: VecDeque<Vec<f32>>,
    /// Audio-clock time at which the next unscheduled block starts.
    cursor: f64,
    playing: bool,
    /// Whether a scheduling loop task currently serves this core. Tracked
    /// here so enqueue and the loop's exit decide under one lock.
    loop_running: bool,
    active: HashSet<u64>,
    next_id: u64,
    /// True once Complete has fired for the current idle period.
    idle_notified: bool,
    lead: f64,
    lookahead: f64,
    source_rate: f64,
}

impl SchedulerCore {
    pub(crate) fn new(lead: f64, lookahead: f64, source_rate: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            cursor: 0.0,
            playing: false,
            loop_running: false,
            active: HashSet::new(),
            next_id: 0,
            idle_notified: true,
            lead,
            lookahead,
            source_rate,
        }
    }

    /// Append decoded blocks; returns true when the scheduling loop must be
    /// started (the engine was idle).
    pub(crate) fn enqueue(&mut self, chunks: Vec<Vec<f32>>, now: f64) -> bool {
        for chunk in chunks {
            if !chunk.is_empty() {
                self.queue.push_back(chunk);
            }
        }
        if self.queue.is_empty() {
            return false;
        }
        self.idle_notified = false;

        if self.playing {
            false
        } else {
            self.playing = true;
            // Keep a still-future cursor; otherwise start a small lead ahead
            self.cursor = self.cursor.max(now + self.lead);
            let needs_loop = !self.loop_running;
            self.loop_running = true;
            needs_loop
        }
    }

    /// Called by the scheduling loop before exiting. Returns true when the
    /// loop must keep running (new work arrived since the last pass).
    pub(crate) fn keep_looping(&mut self) -> bool {
        if self.playing {
            true
        } else {
            self.loop_running = false;
            false
        }
    }

    /// One scheduling pass: realign a lagging cursor, then commit queued
    /// blocks whose start falls inside the lookahead window.
    pub(crate) fn tick(&mut self, now: f64) -> Vec<ScheduledUnit> {
        if !self.playing {
            return Vec::new();
        }
        if self.cursor < now {
            self.cursor = now;
        }

        let mut scheduled = Vec::new();
        while self.cursor < now + self.lookahead {
            let Some(samples) = self.queue.pop_front() else {
                break;
            };
            let id = self.next_id;
            self.next_id += 1;
            self.active.insert(id);

            let duration = samples.len() as f64 / self.source_rate;
            scheduled.push(ScheduledUnit {
                id,
                samples: Arc::new(samples),
                start_time: self.cursor,
            });
            self.cursor += duration;
        }
        scheduled
    }

    /// Register a standalone (replay) voice in the active set.
    pub(crate) fn register_standalone(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id);
        self.idle_notified = false;
        id
    }

    /// Retire a finished voice. Returns true when this end drained the
    /// engine and Complete must fire.
    pub(crate) fn on_voice_ended(&mut self, id: u64) -> bool {
        self.active.remove(&id);
        if self.queue.is_empty() && self.active.is_empty() && !self.idle_notified {
            self.idle_notified = true;
            self.playing = false;
            true
        } else {
            false
        }
    }

    /// Hard cancellation: discard everything, reset the cursor to now.
    /// The caller aborts the loop task, so liveness resets here too.
    pub(crate) fn interrupt(&mut self, now: f64) {
        self.queue.clear();
        self.active.clear();
        self.playing = false;
        self.loop_running = false;
        self.cursor = now;
        self.idle_notified = true;
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn source_rate(&self) -> f64 {
        self.source_rate
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    fn active_len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    fn cursor(&self) -> f64 {
        self.cursor
    }
}

/// Split a decoded chunk into fixed sub-blocks plus one remainder block.
pub(crate) fn split_chunks(samples: Vec<f32>, size: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![samples];
    }
    let mut chunks = Vec::with_capacity(samples.len() / size + 1);
    let mut rest = samples;
    while rest.len() > size {
        let tail = rest.split_off(size);
        chunks.push(rest);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

type StreamStop = std::sync::mpsc::Sender<oneshot::Sender<()>>;

#[derive(Default)]
struct GraphState {
    stream_stop: Option<StreamStop>,
    tick_task: Option<JoinHandle<()>>,
    reaper_task: Option<JoinHandle<()>>,
    /// Set when the last output bring-up failed; gates `ensure_meter`.
    failed: bool,
}

/// Lookahead playback engine for the remote audio stream.
///
/// Handles are cheap to share behind an `Arc`; all operations are callable
/// from async tasks and return immediately (the one bounded wait is output
/// device bring-up on the first use). Scheduling work runs on the ambient
/// Tokio runtime.
pub struct PlaybackScheduler {
    config: PlaybackConfig,
    clock: Arc<AudioClock>,
    mixer: Arc<StdMutex<Mixer>>,
    core: Arc<StdMutex<SchedulerCore>>,
    meter: Arc<MeterStage>,
    analysis_rx: watch::Receiver<AnalysisFrame>,
    analysis_tx: watch::Sender<AnalysisFrame>,
    events_tx: broadcast::Sender<PlaybackEvent>,
    ended_rx: StdMutex<Option<mpsc::UnboundedReceiver<u64>>>,
    graph: StdMutex<GraphState>,
}

impl PlaybackScheduler {
    /// Create an idle engine. The output device is opened lazily on the
    /// first `enqueue`/`resume`/`replay`.
    pub fn new(config: PlaybackConfig) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let (analysis_tx, analysis_rx) = watch::channel(AnalysisFrame::default());
        let (events_tx, _) = broadcast::channel(16);

        let core = SchedulerCore::new(
            config.schedule_lead.as_secs_f64(),
            config.lookahead.as_secs_f64(),
            config.sample_rate as f64,
        );

        Self {
            config,
            clock: Arc::new(AudioClock::new()),
            mixer: Arc::new(StdMutex::new(Mixer::new(ended_tx))),
            core: Arc::new(StdMutex::new(core)),
            meter: Arc::new(MeterStage::new()),
            analysis_rx,
            analysis_tx,
            events_tx,
            ended_rx: StdMutex::new(Some(ended_rx)),
            graph: StdMutex::new(GraphState::default()),
        }
    }

    /// Decode a wire chunk, split it and queue it for scheduling.
    pub fn enqueue(&self, wire: &[u8]) -> AudioResult<()> {
        let samples = codec::decode(wire).inspect_err(|e| {
            warn!(error = %e, "Dropping malformed audio chunk");
        })?;
        if samples.is_empty() {
            return Ok(());
        }

        self.ensure_output()?;

        let chunks = split_chunks(samples, self.config.chunk_samples);
        let needs_loop = lock(&self.core).enqueue(chunks, self.clock.now());
        if needs_loop {
            self.start_tick_loop();
        }
        Ok(())
    }

    /// Hard, lossy cancellation: stop every active voice, clear the queue,
    /// cancel the pending tick and reset the cursor to now. Idempotent.
    pub fn interrupt(&self) {
        let tick_task = lock(&self.graph).tick_task.take();
        if let Some(task) = tick_task {
            task.abort();
        }
        lock(&self.core).interrupt(self.clock.now());
        lock(&self.mixer).clear_voices();
        debug!("Playback interrupted");
    }

    /// Cancel like `interrupt`, then ramp the gain to zero over the drain
    /// window instead of leaving a hard cut. Idempotent.
    pub fn drain_to_silence(&self) {
        self.interrupt();
        let ramp_frames =
            self.clock.rate() as u64 * self.config.drain_ramp.as_millis() as u64 / 1000;
        lock(&self.mixer).ramp_gain(0.0, ramp_frames);
        debug!("Playback draining to silence");
    }

    /// Ensure the audio clock is running, clear stale state and restore
    /// unity gain.
    pub fn resume(&self) -> AudioResult<()> {
        self.ensure_output()?;
        self.interrupt();
        lock(&self.mixer).set_gain(1.0);
        Ok(())
    }

    /// Immediately schedule a standalone voice, bypassing the queue.
    ///
    /// `rate` above 1.0 speeds/pitches the material up, below 1.0 slows it
    /// down. The voice joins the active set but is independent of the main
    /// queue's lifecycle.
    pub fn replay(&self, samples: Vec<f32>, source_rate: u32, rate: f64) -> AudioResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.ensure_output()?;

        let device_rate = self.clock.rate();
        if device_rate == 0 {
            return Err(AudioError::GraphInit(
                "output clock has no rate".to_string(),
            ));
        }

        let id = lock(&self.core).register_standalone();
        let voice = Voice {
            id,
            samples: Arc::new(samples),
            pos: 0.0,
            step: source_rate as f64 * rate / device_rate as f64,
            start_frame: self.clock.frame(),
        };
        lock(&self.mixer).add_voice(voice);
        debug!(voice = id, rate, "Replay voice scheduled");
        Ok(())
    }

    /// Subscribe to playback events.
    pub fn events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events_tx.subscribe()
    }

    /// Live analysis tap for visualization.
    pub fn analysis(&self) -> watch::Receiver<AnalysisFrame> {
        self.analysis_rx.clone()
    }

    /// Install (or fetch) the output volume meter tap.
    ///
    /// Fails with `GraphInit` while the output graph is unavailable; callers
    /// are expected to log the warning and continue without metering.
    pub fn ensure_meter(&self) -> AudioResult<MeterInstall> {
        if lock(&self.graph).failed {
            return Err(AudioError::GraphInit(
                "output graph unavailable, metering disabled".to_string(),
            ));
        }
        Ok(self.meter.ensure_installed())
    }

    /// Whether the scheduling loop currently has work in flight.
    pub fn is_playing(&self) -> bool {
        lock(&self.core).is_playing()
    }

    /// Tear down the output graph and background tasks.
    pub fn shutdown(&self) {
        self.interrupt();
        let mut graph = lock(&self.graph);
        if let Some(task) = graph.reaper_task.take() {
            task.abort();
        }
        if let Some(stream_stop) = graph.stream_stop.take() {
            let (ack_tx, _ack_rx) = oneshot::channel();
            let _ = stream_stop.send(ack_tx);
        }
    }

    /// Bring up the output stream thread and reaper task once.
    fn ensure_output(&self) -> AudioResult<()> {
        let mut graph = lock(&self.graph);
        if graph.stream_stop.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<AudioResult<u32>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<oneshot::Sender<()>>();

        let device_id = self.config.device.clone();
        let clock = Arc::clone(&self.clock);
        let mixer = Arc::clone(&self.mixer);
        let meter = Arc::clone(&self.meter);
        let analysis_tx = self.analysis_tx.clone();

        // The cpal stream is not Send; it lives and dies on this thread.
        let _ = thread::Builder::new()
            .name("voxlink-playback".to_string())
            .spawn(move || {
                let stream = match build_output_stream(
                    device_id.as_deref(),
                    clock,
                    mixer,
                    meter,
                    analysis_tx,
                ) {
                    Ok((stream, rate)) => {
                        if let Err(e) = stream.play() {
                            let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                            return;
                        }
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Ok(ack) = stop_rx.recv() {
                    drop(stream);
                    let _ = ack.send(());
                }
            });

        // Device bring-up is quick; this is the one bounded wait the engine
        // performs.
        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(rate)) => {
                info!(device_rate = rate, "Output graph running");
                graph.failed = false;
                graph.stream_stop = Some(stop_tx);
                self.spawn_reaper(&mut graph);
                Ok(())
            }
            Ok(Err(e)) => {
                graph.failed = true;
                Err(e)
            }
            Err(_) => {
                graph.failed = true;
                Err(AudioError::DeviceUnavailable(
                    "output stream did not come up in time".to_string(),
                ))
            }
        }
    }

    /// Forward voice-end reports from the device callback into the core and
    /// fire Complete when the engine drains.
    fn spawn_reaper(&self, graph: &mut GraphState) {
        if graph.reaper_task.is_some() {
            return;
        }
        let Some(mut ended_rx) = lock(&self.ended_rx).take() else {
            return;
        };
        let core = Arc::clone(&self.core);
        let events_tx = self.events_tx.clone();

        graph.reaper_task = Some(tokio::spawn(async move {
            while let Some(id) = ended_rx.recv().await {
                if lock(&core).on_voice_ended(id) {
                    debug!("Playback complete");
                    let _ = events_tx.send(PlaybackEvent::Complete);
                }
            }
        }));
    }

    fn start_tick_loop(&self) {
        let mut graph = lock(&self.graph);
        let core = Arc::clone(&self.core);
        let mixer = Arc::clone(&self.mixer);
        let clock = Arc::clone(&self.clock);
        let tick = self.config.tick_interval;

        graph.tick_task = Some(tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let now = clock.now();
                let units = lock(&core).tick(now);

                if !units.is_empty() {
                    let device_rate = clock.rate() as f64;
                    let step = if device_rate > 0.0 {
                        lock(&core).source_rate() / device_rate
                    } else {
                        1.0
                    };
                    let mut mixer = lock(&mixer);
                    for unit in units {
                        mixer.add_voice(Voice {
                            id: unit.id,
                            samples: unit.samples,
                            pos: 0.0,
                            step,
                            start_frame: (unit.start_time * device_rate).round() as u64,
                        });
                    }
                }

                if !lock(&core).keep_looping() {
                    debug!("Scheduling loop idle, stopping");
                    break;
                }
            }
        }));
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Lock a mutex, recovering the inner state if a holder panicked.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn build_output_stream(
    device_id: Option<&str>,
    clock: Arc<AudioClock>,
    mixer: Arc<StdMutex<Mixer>>,
    meter: Arc<MeterStage>,
    analysis_tx: watch::Sender<AnalysisFrame>,
) -> AudioResult<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = find_output_device(&host, device_id)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let default_config = device.default_output_config()?;
    let sample_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    info!(device = %device_name, sample_rate, channels, "Opening output device");

    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    clock.set_rate(sample_rate);

    let channel_count = channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    let err_fn = |err| error!("Output stream error: {}", err);

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channel_count;
                    scratch.resize(frames, 0.0);

                    render_block(&clock, &mixer, &mut scratch[..frames]);

                    for (frame, &sample) in scratch[..frames].iter().enumerate() {
                        for slot in &mut data[frame * channel_count..(frame + 1) * channel_count]
                        {
                            *slot = sample;
                        }
                    }

                    publish_analysis(&meter, &analysis_tx, &scratch[..frames]);
                },
                err_fn,
                None,
            )
            .map_err(map_build_err)?,
        cpal::SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channel_count;
                    scratch.resize(frames, 0.0);

                    render_block(&clock, &mixer, &mut scratch[..frames]);

                    for (frame, &sample) in scratch[..frames].iter().enumerate() {
                        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
                        for slot in &mut data[frame * channel_count..(frame + 1) * channel_count]
                        {
                            *slot = value;
                        }
                    }

                    publish_analysis(&meter, &analysis_tx, &scratch[..frames]);
                },
                err_fn,
                None,
            )
            .map_err(map_build_err)?,
        other => {
            return Err(AudioError::StreamBuild(format!(
                "unsupported sample format {:?}",
                other
            )));
        }
    };

    Ok((stream, sample_rate))
}

fn map_build_err(e: cpal::BuildStreamError) -> AudioError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable("output device lost".to_string())
        }
        other => AudioError::StreamBuild(other.to_string()),
    }
}

/// Mix one device block. Never blocks the device thread: on lock contention
/// the block renders silent and voices resume next callback.
fn render_block(clock: &AudioClock, mixer: &StdMutex<Mixer>, out: &mut [f32]) {
    let start_frame = clock.frame();
    match mixer.try_lock() {
        Ok(mut mixer) => mixer.render(out, start_frame),
        Err(_) => out.fill(0.0),
    }
    clock.advance(out.len() as u64);
}

fn publish_analysis(meter: &MeterStage, analysis_tx: &watch::Sender<AnalysisFrame>, block: &[f32]) {
    let rms = block_rms(block);
    meter.publish(rms);

    let mut waveform = Vec::with_capacity(WAVEFORM_BARS);
    if !block.is_empty() {
        let per_bar = (block.len() / WAVEFORM_BARS).max(1);
        for bar in block.chunks(per_bar).take(WAVEFORM_BARS) {
            waveform.push(block_rms(bar));
        }
    }

    let _ = analysis_tx.send(AnalysisFrame {
        rms,
        peak: block_peak(block),
        waveform,
    });
}
