use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

use crate::audio::error::{AudioError, AudioResult};

/// Converts mono audio from the input device's native rate to the fixed
/// capture rate, buffering internally so callers can feed blocks of any
/// size.
pub struct CaptureResampler {
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    /// Samples waiting for a full chunk.
    pending: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
    chunk_size: usize,
}

impl CaptureResampler {
    /// Create a resampler from `input_rate` to `output_rate` (both Hz).
    pub fn new(input_rate: u32, output_rate: u32) -> AudioResult<Self> {
        info!("Creating resampler: {} Hz -> {} Hz", input_rate, output_rate);

        let ratio = output_rate as f64 / input_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // Process in 10 ms chunks of the device rate
        let chunk_size = (input_rate / 100).max(1) as usize;

        let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
            .map_err(|e| AudioError::Resample(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = resampler.input_buffer_allocate(true);
        let output_buffer = resampler.output_buffer_allocate(true);

        debug!(
            chunk_size,
            max_output = resampler.output_frames_max(),
            "Resampler ready"
        );

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            pending: Vec::new(),
            input_rate,
            output_rate,
            chunk_size,
        })
    }

    /// Feed a block of any size; returns whatever full chunks produced.
    ///
    /// May return an empty vector while input accumulates below one chunk.
    pub fn process(&mut self, input: &[f32]) -> AudioResult<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        while self.pending.len() >= self.chunk_size {
            self.input_buffer[0].clear();
            self.input_buffer[0].extend(self.pending.drain(..self.chunk_size));

            let (_consumed, produced) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::Resample(format!("Resampling failed: {}", e)))?;

            output.extend_from_slice(&self.output_buffer[0][..produced]);
        }

        Ok(output)
    }

    /// Drop buffered input and clear filter state.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }

    /// Input (device) sample rate.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Output (capture) sample rate.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Input samples consumed per internal chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
