//! Rolling capture history
//!
//! Fixed-capacity circular store of the most recent capture samples. The
//! capture engine is the only writer; the replay path takes oldest-first
//! copies via [`HistoryBuffer::read_last`]. Data older than the retention
//! window is overwritten and unrecoverable.

/// Circular buffer holding the last `sample_rate * retention_seconds`
/// samples of captured audio.
pub struct HistoryBuffer {
    samples: Vec<f32>,
    write_pos: usize,
    /// Total samples ever written, used to zero-fill reads that reach back
    /// before the first write.
    written: u64,
    sample_rate: u32,
}

impl HistoryBuffer {
    /// Create a buffer retaining `retention_seconds` of audio at
    /// `sample_rate`.
    pub fn new(sample_rate: u32, retention_seconds: f32) -> Self {
        let capacity = ((sample_rate as f32) * retention_seconds).round().max(1.0) as usize;
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
            written: 0,
            sample_rate,
        }
    }

    /// Buffer capacity in samples.
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate the buffer was created with.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Store one sample at the cursor and advance it, wrapping at capacity.
    pub fn write(&mut self, sample: f32) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.written += 1;
    }

    /// Store a block of samples.
    pub fn write_slice(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.write(sample);
        }
    }

    /// Copy out the most recent `duration_seconds` of audio, oldest first.
    ///
    /// Requests longer than the retention window are clamped to it. The
    /// returned vector always has the full (clamped) requested length: any
    /// region reaching back before the first write is zero-filled silence.
    pub fn read_last(&self, duration_seconds: f32) -> Vec<f32> {
        let capacity = self.samples.len();
        let requested = (duration_seconds * self.sample_rate as f32).round().max(0.0) as usize;
        let count = requested.min(capacity);

        let mut out = vec![0.0f32; count];

        let valid = self.written.min(capacity as u64) as usize;
        let take = count.min(valid);
        if take == 0 {
            return out;
        }

        // Walk forward from the wrap-aware start index into the tail of the
        // output, leaving the zero-filled prefix in place.
        let mut read_pos = (self.write_pos + capacity - take) % capacity;
        for slot in out[count - take..].iter_mut() {
            *slot = self.samples[read_pos];
            read_pos = (read_pos + 1) % capacity;
        }

        out
    }
}
