use std::collections::VecDeque;

/// Rolling statistics over the values currently held by a [`ChannelWindow`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub slope: f64,
    pub last: f64,
    pub delta: f64,
}

impl WindowStats {
    /// Stat name / value pairs in canonical emission order.
    pub fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("mean", self.mean),
            ("std", self.std),
            ("min", self.min),
            ("max", self.max),
            ("slope", self.slope),
            ("last", self.last),
            ("delta", self.delta),
        ]
    }
}

/// Largest magnitude a window accepts; inputs beyond it are clamped so squared
/// deviations stay finite for any realistic capacity.
pub const VALUE_LIMIT: f64 = 1.0e150;

/// Bounded FIFO of the most recent values for one channel.
///
/// Sums are kept relative to a reference value (`shift`) to limit
/// cancellation when the signal sits on a large offset, and are re-summed from
/// the buffer once per `capacity` evictions so drift cannot accumulate. Min and
/// max come from monotonic deques, which makes both `add` and `stats` O(1)
/// amortized.
#[derive(Debug, Clone)]
pub struct ChannelWindow {
    capacity: usize,
    values: VecDeque<f64>,
    /// Candidates for the minimum, increasing by value; tagged with insertion sequence.
    min_candidates: VecDeque<(u64, f64)>,
    /// Candidates for the maximum, decreasing by value.
    max_candidates: VecDeque<(u64, f64)>,
    next_seq: u64,
    shift: f64,
    sum: f64,
    sum_sq: f64,
    evictions_since_resum: usize,
    total_added: u64,
    last_value: f64,
    prev_value: f64,
}

impl ChannelWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity.min(4096)),
            min_candidates: VecDeque::new(),
            max_candidates: VecDeque::new(),
            next_seq: 0,
            shift: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
            evictions_since_resum: 0,
            total_added: 0,
            last_value: 0.0,
            prev_value: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Retained values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }

    /// Append a value, evicting the oldest one when the window is full.
    /// Values are clamped to `±VALUE_LIMIT`.
    pub fn add(&mut self, value: f64) {
        let value = value.clamp(-VALUE_LIMIT, VALUE_LIMIT);
        if self.total_added > 0 {
            self.prev_value = self.last_value;
        }
        self.last_value = value;
        self.total_added += 1;

        if self.capacity == 0 {
            return;
        }

        if self.values.is_empty() {
            self.shift = value;
            self.sum = 0.0;
            self.sum_sq = 0.0;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.values.push_back(value);
        let d = value - self.shift;
        self.sum += d;
        self.sum_sq += d * d;

        while self.min_candidates.back().is_some_and(|&(_, v)| v >= value) {
            self.min_candidates.pop_back();
        }
        self.min_candidates.push_back((seq, value));

        while self.max_candidates.back().is_some_and(|&(_, v)| v <= value) {
            self.max_candidates.pop_back();
        }
        self.max_candidates.push_back((seq, value));

        if self.values.len() > self.capacity {
            if let Some(old) = self.values.pop_front() {
                let d = old - self.shift;
                self.sum -= d;
                self.sum_sq -= d * d;
            }

            // Sequence number of the oldest value still in the window.
            let oldest = seq + 1 - self.capacity as u64;
            while self.min_candidates.front().is_some_and(|&(s, _)| s < oldest) {
                self.min_candidates.pop_front();
            }
            while self.max_candidates.front().is_some_and(|&(s, _)| s < oldest) {
                self.max_candidates.pop_front();
            }

            self.evictions_since_resum += 1;
            if self.evictions_since_resum >= self.capacity {
                self.resum();
            }
        }

        if !(self.sum.is_finite() && self.sum_sq.is_finite()) {
            self.resum();
        }
    }

    /// Recompute the running sums from the buffer, re-centred on its oldest value.
    fn resum(&mut self) {
        self.evictions_since_resum = 0;
        self.shift = self.values.front().copied().unwrap_or(0.0);
        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for v in &self.values {
            let d = v - self.shift;
            sum += d;
            sum_sq += d * d;
        }
        self.sum = sum;
        self.sum_sq = sum_sq;
    }

    /// Statistics over the current buffer. `window_ms` scales the slope.
    pub fn stats(&self, window_ms: u32) -> WindowStats {
        let n = self.values.len();
        if n == 0 {
            return WindowStats::default();
        }
        let nf = n as f64;

        let mean = self.shift + self.sum / nf;
        let std = if n > 1 {
            let variance = (self.sum_sq - self.sum * self.sum / nf) / (nf - 1.0);
            variance.max(0.0).sqrt()
        } else {
            0.0
        };

        let min = self.min_candidates.front().map_or(0.0, |&(_, v)| v);
        let max = self.max_candidates.front().map_or(0.0, |&(_, v)| v);

        let slope = match self.values.front() {
            Some(&oldest) if n >= 2 && window_ms > 0 => {
                (self.last_value - oldest) / f64::from(window_ms)
            }
            _ => 0.0,
        };

        let delta = if self.total_added >= 2 {
            self.last_value - self.prev_value
        } else {
            0.0
        };

        WindowStats {
            mean,
            std,
            min,
            max,
            slope,
            last: self.last_value,
            delta,
        }
    }
}
