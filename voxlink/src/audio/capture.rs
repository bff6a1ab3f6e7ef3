//! Capture engine
//!
//! Owns the microphone input graph: a cpal input stream on a dedicated
//! thread, a lock-free handoff ring, and a processing task that downmixes,
//! resamples to the fixed capture rate, and cuts the result into wire
//! blocks. Every block is emitted to the data subscriber in wire format and
//! written back (decoded) into the rolling history buffer, while the volume
//! meter publishes one RMS level per block.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::audio::buffer::{CaptureRing, CaptureRingConsumer};
use crate::audio::codec;
use crate::audio::device::find_input_device;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::history::HistoryBuffer;
use crate::audio::meter::{MeterInstall, MeterStage, block_rms};
use crate::audio::resampler::CaptureResampler;
use crate::config::{CaptureConfig, CaptureConstraints};

/// A wire-format block of captured audio, ready for the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    /// i16 little-endian PCM bytes
    pub bytes: Vec<u8>,
    /// Sample rate of the encoded audio
    pub sample_rate: u32,
}

impl EncodedChunk {
    /// MIME-style tag declaring the wire format, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Capture engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Recording,
}

struct StreamInfo {
    sample_rate: u32,
    channels: u16,
}

type StreamStop = std::sync::mpsc::Sender<oneshot::Sender<()>>;

#[derive(Default)]
struct Lifecycle {
    stream_stop: Option<StreamStop>,
    drain_stop: Option<oneshot::Sender<()>>,
    drain_task: Option<JoinHandle<()>>,
}

/// Microphone capture engine.
pub struct CaptureEngine {
    config: CaptureConfig,
    history: Arc<StdMutex<HistoryBuffer>>,
    meter: Arc<MeterStage>,
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<CaptureState>,
}

impl CaptureEngine {
    /// Create an idle engine. No hardware is touched until [`Self::start`].
    pub fn new(config: CaptureConfig) -> Self {
        let history = HistoryBuffer::new(config.sample_rate, config.history_seconds);
        let (state_tx, _) = watch::channel(CaptureState::Idle);
        Self {
            config,
            history: Arc::new(StdMutex::new(history)),
            meter: Arc::new(MeterStage::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
            state_tx,
        }
    }

    /// Start capturing; encoded blocks flow to `data_tx`.
    ///
    /// Holds one guard across the whole bring-up: a concurrent `start()`
    /// awaits the in-flight initialization and returns without touching the
    /// hardware again, and a `stop()` issued while starting waits here until
    /// start completes, then tears down.
    pub async fn start(&self, data_tx: mpsc::Sender<EncodedChunk>) -> AudioResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.stream_stop.is_some() {
            debug!("Capture already recording");
            return Ok(());
        }

        self.state_tx.send_replace(CaptureState::Starting);
        info!("Starting capture engine");

        let (ready_rx, stream_stop) =
            spawn_stream_thread(self.config.device.clone(), self.config.constraints);

        let (stream_info, ring) = match ready_rx.await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) => {
                self.state_tx.send_replace(CaptureState::Idle);
                return Err(e);
            }
            Err(_) => {
                self.state_tx.send_replace(CaptureState::Idle);
                return Err(AudioError::DeviceUnavailable(
                    "capture thread exited before the stream was ready".to_string(),
                ));
            }
        };

        let resampler = match CaptureResampler::new(stream_info.sample_rate, self.config.sample_rate)
        {
            Ok(resampler) => resampler,
            Err(e) => {
                stop_stream(&stream_stop).await;
                self.state_tx.send_replace(CaptureState::Idle);
                return Err(e);
            }
        };

        let (drain_stop_tx, drain_stop_rx) = oneshot::channel();
        let drain_task = tokio::spawn(drain_loop(
            ring,
            stream_info.channels,
            resampler,
            data_tx,
            Arc::clone(&self.history),
            Arc::clone(&self.meter),
            self.config.sample_rate,
            self.config.wire_block_samples,
            drain_stop_rx,
        ));

        lifecycle.stream_stop = Some(stream_stop);
        lifecycle.drain_stop = Some(drain_stop_tx);
        lifecycle.drain_task = Some(drain_task);
        self.state_tx.send_replace(CaptureState::Recording);
        info!("Capture engine recording");
        Ok(())
    }

    /// Stop capturing and release the input device.
    ///
    /// The device is released before this returns; calling while idle is a
    /// no-op, calling while starting waits for start to finish first.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(stream_stop) = lifecycle.stream_stop.take() else {
            return;
        };

        info!("Stopping capture engine");
        // Release the hardware first; the ack arrives after the stream drops
        stop_stream(&stream_stop).await;

        if let Some(stop) = lifecycle.drain_stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = lifecycle.drain_task.take() {
            let _ = task.await;
        }

        self.state_tx.send_replace(CaptureState::Idle);
        info!("Capture engine stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        *self.state_tx.borrow()
    }

    /// Watch receiver for lifecycle transitions.
    pub fn state_watch(&self) -> watch::Receiver<CaptureState> {
        self.state_tx.subscribe()
    }

    /// Fixed wire sample rate of this engine.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Install (or fetch) the volume meter tap.
    pub fn ensure_meter(&self) -> AudioResult<MeterInstall> {
        Ok(self.meter.ensure_installed())
    }

    /// Copy of the most recent `duration_seconds` of captured audio,
    /// oldest first, zero-filled where nothing was ever recorded.
    pub fn last_audio(&self, duration_seconds: f32) -> Vec<f32> {
        match self.history.lock() {
            Ok(history) => history.read_last(duration_seconds),
            Err(poisoned) => poisoned.into_inner().read_last(duration_seconds),
        }
    }
}

fn spawn_stream_thread(
    device_id: Option<String>,
    constraints: CaptureConstraints,
) -> (
    oneshot::Receiver<AudioResult<(StreamInfo, CaptureRingConsumer)>>,
    StreamStop,
) {
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<oneshot::Sender<()>>();

    // The cpal stream is not Send; it lives and dies on this thread.
    let _ = thread::Builder::new()
        .name("voxlink-capture".to_string())
        .spawn(move || {
            let (stream, info, consumer) =
                match build_capture_stream(device_id.as_deref(), constraints) {
                    Ok(parts) => parts,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok((info, consumer)));

            if let Ok(ack) = stop_rx.recv() {
                drop(stream);
                let _ = ack.send(());
            }
        });

    (ready_rx, stop_tx)
}

async fn stop_stream(stream_stop: &StreamStop) {
    let (ack_tx, ack_rx) = oneshot::channel();
    if stream_stop.send(ack_tx).is_ok() {
        let _ = ack_rx.await;
    }
}

fn build_capture_stream(
    device_id: Option<&str>,
    constraints: CaptureConstraints,
) -> AudioResult<(cpal::Stream, StreamInfo, CaptureRingConsumer)> {
    let host = cpal::default_host();
    let device = find_input_device(&host, device_id)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let default_config = device.default_input_config()?;
    let sample_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    info!(
        device = %device_name,
        sample_rate,
        channels,
        echo_cancellation = constraints.echo_cancellation,
        noise_suppression = constraints.noise_suppression,
        auto_gain_control = constraints.auto_gain_control,
        "Opening capture device"
    );

    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let (mut producer, consumer) =
        CaptureRing::for_device_rate(sample_rate * channels as u32);

    let err_fn = |err| error!("Capture stream error: {}", err);

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Overflow means the drain task is behind; drop, never block
                let _ = producer.push_slice(data);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / 32768.0));
                    let _ = producer.push_slice(&scratch);
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(AudioError::StreamBuild(format!(
                "unsupported sample format {:?}",
                other
            )));
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable("input device lost".to_string())
        }
        other => AudioError::StreamBuild(other.to_string()),
    })?;

    Ok((
        stream,
        StreamInfo {
            sample_rate,
            channels,
        },
        consumer,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn drain_loop(
    mut ring: CaptureRingConsumer,
    channels: u16,
    mut resampler: CaptureResampler,
    data_tx: mpsc::Sender<EncodedChunk>,
    history: Arc<StdMutex<HistoryBuffer>>,
    meter: Arc<MeterStage>,
    wire_rate: u32,
    block_samples: usize,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval(Duration::from_millis(10));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pending: Vec<f32> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                debug!("Capture drain stopping");
                break;
            }
            _ = ticker.tick() => {
                let raw = ring.pop_all();
                if raw.is_empty() {
                    continue;
                }

                let mono = downmix_to_mono(&raw, channels);
                let resampled = match resampler.process(&mono) {
                    Ok(resampled) => resampled,
                    Err(e) => {
                        warn!(error = %e, "Resample failed, dropping block");
                        continue;
                    }
                };
                pending.extend_from_slice(&resampled);

                while pending.len() >= block_samples {
                    let block: Vec<f32> = pending.drain(..block_samples).collect();
                    meter.publish(block_rms(&block));

                    let bytes = codec::encode(&block);

                    // History holds what the wire actually carried
                    if let Ok(decoded) = codec::decode(&bytes) {
                        match history.lock() {
                            Ok(mut history) => history.write_slice(&decoded),
                            Err(poisoned) => poisoned.into_inner().write_slice(&decoded),
                        }
                    }

                    let chunk = EncodedChunk {
                        bytes,
                        sample_rate: wire_rate,
                    };
                    if data_tx.send(chunk).await.is_err() {
                        debug!("Data subscriber dropped, capture drain exiting");
                        return;
                    }
                }
            }
        }
    }
}

/// Average interleaved frames down to one channel.
fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_tags_wire_rate() {
        let chunk = EncodedChunk {
            bytes: vec![0, 0],
            sample_rate: 16000,
        };
        assert_eq!(chunk.mime_type(), "audio/pcm;rate=16000");
    }

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix_to_mono(&[0.2, 0.4, -0.5, 0.5], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let samples = [0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples.to_vec());
    }

    #[test]
    fn test_new_engine_is_idle() {
        let engine = CaptureEngine::new(CaptureConfig::default());
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.sample_rate(), 16000);
    }

    #[test]
    fn test_last_audio_before_recording_is_silence() {
        let engine = CaptureEngine::new(CaptureConfig::default());
        let audio = engine.last_audio(1.0);
        assert_eq!(audio.len(), 16000);
        assert!(audio.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_meter_install_idempotent() {
        let engine = CaptureEngine::new(CaptureConfig::default());
        assert!(engine.ensure_meter().unwrap().is_fresh());
        assert!(!engine.ensure_meter().unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let engine = CaptureEngine::new(CaptureConfig::default());
        engine.stop().await;
        engine.stop().await;
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_start_stop_with_hardware() {
        // Exercises the device path when a microphone exists; environments
        // without one get the surfaced error instead of a panic.
        let engine = CaptureEngine::new(CaptureConfig::default());
        let (tx, mut rx) = mpsc::channel(16);

        match engine.start(tx).await {
            Ok(()) => {
                assert_eq!(engine.state(), CaptureState::Recording);

                // A second start while recording is idempotent
                let (tx2, _rx2) = mpsc::channel(16);
                assert!(engine.start(tx2).await.is_ok());

                let received = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
                if let Ok(Some(chunk)) = received {
                    assert!(!chunk.bytes.is_empty());
                    assert_eq!(chunk.sample_rate, 16000);
                }

                engine.stop().await;
                assert_eq!(engine.state(), CaptureState::Idle);
            }
            Err(e) => {
                eprintln!("Warning: no capture device available: {}", e);
                assert_eq!(engine.state(), CaptureState::Idle);
            }
        }
    }
}
