//! Bounded, time-sliced FIFO used to track recent base-fee, max-fee, and
//! priority-fee observations.
//!
//! Observations are bucketed into fixed-width time slices. A new sample that
//! lands within the same slice as the most recent entry overwrites it if the
//! new value is *lower* — the manager only ever wants the highest fee seen
//! within a slice, so a later, smaller read within the same window is noise,
//! not signal. A sample outside the most-recent slice is always appended,
//! evicting the oldest entry once the queue is at its configured length.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    value: u128,
}

#[derive(Debug, Clone)]
pub struct GasPriceHistory {
    max_queue_size: usize,
    slice_width: Duration,
    ignore_zero: bool,
    samples: VecDeque<Sample>,
}

impl GasPriceHistory {
    pub fn new(max_queue_size: usize, slice_width: Duration, ignore_zero: bool) -> Self {
        Self {
            max_queue_size: max_queue_size.max(1),
            slice_width,
            ignore_zero,
            samples: VecDeque::new(),
        }
    }

    /// Inserts `value` observed at `now`, applying the overwrite-if-lower
    /// rule, evicting the oldest sample if the queue is already at capacity.
    /// `value == 0` is dropped entirely when this history ignores zeroes.
    pub fn insert(&mut self, now: Instant, value: u128) {
        if value == 0 && self.ignore_zero {
            return;
        }
        match self.samples.back_mut() {
            Some(last) if now.saturating_duration_since(last.at) < self.slice_width => {
                if value < last.value {
                    last.value = value;
                    last.at = now;
                }
            }
            _ => {
                if self.samples.len() >= self.max_queue_size {
                    self.samples.pop_front();
                }
                self.samples.push_back(Sample { at: now, value });
            }
        }
    }

    /// The highest value retained across the whole window, or `None` if the
    /// history is empty.
    pub fn max(&self) -> Option<u128> {
        self.samples.iter().map(|s| s.value).max()
    }

    /// The lowest value retained across the whole window, or `None` if the
    /// history is empty.
    pub fn min(&self) -> Option<u128> {
        self.samples.iter().map(|s| s.value).min()
    }

    pub fn latest(&self) -> Option<u128> {
        self.samples.back().map(|s| s.value)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
