//! Bitrate estimator
//!
//! Fixed-capacity ring of per-packet bitrate samples. The estimate is the
//! arithmetic mean over the window, unknown until enough samples exist.

/// Rolling bitrate estimate in bits per second
#[derive(Debug, Clone)]
pub struct BitrateEstimator {
    samples: Vec<f64>,
    capacity: usize,
    min_samples: usize,
    /// Next slot to overwrite once the ring is full
    cursor: usize,
}

impl BitrateEstimator {
    /// `capacity` and `min_samples` are clamped to at least 1
    pub fn new(capacity: usize, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            min_samples: min_samples.clamp(1, capacity),
            cursor: 0,
        }
    }

    /// Record one packet; zero or non-finite durations are ignored
    ///
    /// Returns whether the sample was recorded.
    pub fn record(&mut self, duration_seconds: f64, byte_size: usize) -> bool {
        if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
            return false;
        }
        let bits_per_second = (byte_size as f64 * 8.0) / duration_seconds;

        if self.samples.len() < self.capacity {
            self.samples.push(bits_per_second);
        } else {
            self.samples[self.cursor] = bits_per_second;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
        true
    }

    /// Mean bitrate over the window, `None` while below the sample minimum
    pub fn estimate(&self) -> Option<f64> {
        if self.samples.len() < self.min_samples {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.cursor = 0;
    }
}
