//! Fixed-capacity sample history.

use crate::core::Sample;

/// Largest history that will be pre-allocated, in samples.
pub const MAX_HISTORY_CAPACITY: usize = 10_000_000;

/// Samples needed for `recording_time` seconds at `frequency` Hz, rounded to
/// the nearest sample.
///
/// `None` when the product is not finite, is negative, or exceeds
/// [`MAX_HISTORY_CAPACITY`].
pub fn capacity_for(recording_time: f64, frequency: f64) -> Option<usize> {
    let samples = (recording_time * frequency).round();
    if samples.is_finite() && (0.0..=MAX_HISTORY_CAPACITY as f64).contains(&samples) {
        Some(samples as usize)
    } else {
        None
    }
}

/// Ordered samples recorded during one session, pre-sized before acquisition.
///
/// The buffer never grows past its capacity; pushing into a full buffer hands
/// the sample back.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Empty buffer holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffer sized by [`capacity_for`].
    pub fn for_duration(recording_time: f64, frequency: f64) -> Option<Self> {
        capacity_for(recording_time, frequency).map(Self::with_capacity)
    }

    /// Append a sample, or return it if the buffer is full.
    pub fn push(&mut self, sample: Sample) -> Result<(), Sample> {
        if self.is_full() {
            return Err(sample);
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Whether another push would be rejected.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recorded samples in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consume the buffer, returning the recorded samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
