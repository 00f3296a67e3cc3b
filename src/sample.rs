//! Time-series storage for one tuning session.

use std::collections::VecDeque;

/// One recorded observation, time-stamped relative to session start.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    /// Seconds since the session's first sample.
    pub time: f32,
    /// Filtered process temperature, degrees C.
    pub temperature: f32,
    /// Setpoint in force when the sample was taken, degrees C.
    pub setpoint: f32,
    /// Heater drive fraction, 0.0 ..= 1.0.
    pub output: f32,
}

/// Bounded append-only buffer of session samples.
///
/// Appends are O(1); once the capacity is reached the oldest sample is
/// evicted. Analyses always look at recent windows, so eviction never
/// affects a live computation.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    buf: VecDeque<Sample>,
    capacity: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.buf.iter()
    }

    /// Samples taken at or after `time`, oldest first.
    pub fn collect_since(&self, time: f32) -> Vec<Sample> {
        self.buf
            .iter()
            .filter(|s| s.time >= time)
            .copied()
            .collect()
    }

    /// The most recent `n` samples, oldest first.
    pub fn collect_tail(&self, n: usize) -> Vec<Sample> {
        let skip = self.buf.len().saturating_sub(n);
        self.buf.iter().skip(skip).copied().collect()
    }

    /// Mean heater output over the most recent `n` samples.
    /// Returns 0.0 when the buffer is empty.
    pub fn mean_output_tail(&self, n: usize) -> f32 {
        let skip = self.buf.len().saturating_sub(n);
        let count = self.buf.len() - skip;
        if count == 0 {
            return 0.0;
        }
        let sum: f32 = self.buf.iter().skip(skip).map(|s| s.output).sum();
        sum / count as f32
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
