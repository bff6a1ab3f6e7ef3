//! Lock-free sample handoff
//!
//! Single-producer single-consumer ring used to move raw samples out of the
//! input device callback without blocking or allocating on the real-time
//! thread. The processing task drains it on a short interval.

use ringbuf::{
    HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

/// SPSC ring between a device callback (producer) and the processing task
/// (consumer).
pub struct CaptureRing;

/// Write half, owned by the device callback.
pub struct CaptureRingProducer {
    producer: ringbuf::HeapProd<f32>,
}

/// Read half, owned by the processing task.
pub struct CaptureRingConsumer {
    consumer: ringbuf::HeapCons<f32>,
}

impl CaptureRing {
    /// Create a ring with the given capacity in samples.
    pub fn new(capacity: usize) -> (CaptureRingProducer, CaptureRingConsumer) {
        let rb = HeapRb::<f32>::new(capacity);
        let (producer, consumer) = rb.split();

        (
            CaptureRingProducer { producer },
            CaptureRingConsumer { consumer },
        )
    }

    /// Ring sized for half a second at the device rate.
    pub fn for_device_rate(sample_rate: u32) -> (CaptureRingProducer, CaptureRingConsumer) {
        Self::new((sample_rate as usize / 2).max(1024))
    }
}

impl CaptureRingProducer {
    /// Write as many samples as fit; returns the number accepted. Overflow
    /// is dropped by the caller, never blocked on.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Free space in samples.
    pub fn available_space(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Ring capacity in samples.
    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }
}

impl CaptureRingConsumer {
    /// Read up to `output.len()` samples; returns the number read.
    pub fn pop_slice(&mut self, output: &mut [f32]) -> usize {
        self.consumer.pop_slice(output)
    }

    /// Drain everything currently buffered.
    pub fn pop_all(&mut self) -> Vec<f32> {
        let len = self.available_samples();
        let mut output = vec![0.0f32; len];
        self.pop_slice(&mut output);
        output
    }

    /// Buffered samples ready to read.
    pub fn available_samples(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Whether the ring is currently empty.
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Discard everything currently buffered.
    pub fn clear(&mut self) {
        let _ = self.consumer.clear();
    }
}
