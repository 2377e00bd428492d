use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use fusionguard_core::{feature_key, FeatureVector, TelemetryPoint, MISSING_RATIO_KEY};
use tracing::debug;

use crate::window::ChannelWindow;

/// Per-shot accumulator state.
#[derive(Debug, Default)]
struct ShotWindows {
    /// Accumulators keyed by `(window_ms, channel_name)`.
    windows: HashMap<(u32, String), ChannelWindow>,
    last_ts_unix_ns: Option<i64>,
}

/// How many ended shot ids are remembered to reject late points.
pub const DEFAULT_ENDED_SHOT_MEMORY: usize = 1024;

#[derive(Debug, Default)]
struct BuilderState {
    shots: HashMap<String, ShotWindows>,
    /// Recently ended shots, oldest first; mirrors `ended_set`.
    ended_order: VecDeque<String>,
    ended_set: HashSet<String>,
    out_of_order: u64,
    late: u64,
}

impl BuilderState {
    fn mark_ended(&mut self, shot_id: &str, memory: usize) {
        if memory == 0 || self.ended_set.contains(shot_id) {
            return;
        }
        while self.ended_order.len() >= memory {
            if let Some(oldest) = self.ended_order.pop_front() {
                self.ended_set.remove(&oldest);
            }
        }
        self.ended_order.push_back(shot_id.to_string());
        self.ended_set.insert(shot_id.to_string());
    }
}

/// Turns raw telemetry points into one feature vector per configured window.
///
/// Accumulators are partitioned by shot, so interleaved samples from
/// different shots that share a channel name never touch each other's
/// windows. A single lock guards all state; it is held for the whole of one
/// point so find-or-create, append and read-back happen atomically for every
/// window of that sample.
///
/// Ended shots are remembered (up to a bounded number of ids) so a point
/// delivered after its shot's end marker is dropped instead of re-creating
/// windows nothing would release.
#[derive(Debug)]
pub struct FeatureBuilder {
    windows_ms: Vec<u32>,
    expected: HashSet<String>,
    ended_memory: usize,
    state: Mutex<BuilderState>,
}

impl FeatureBuilder {
    pub fn new(windows_ms: Vec<u32>, expected_channels: impl IntoIterator<Item = String>) -> Self {
        Self {
            windows_ms,
            expected: expected_channels.into_iter().collect(),
            ended_memory: DEFAULT_ENDED_SHOT_MEMORY,
            state: Mutex::new(BuilderState::default()),
        }
    }

    /// Override how many ended shot ids are remembered.
    pub fn with_ended_shot_memory(mut self, memory: usize) -> Self {
        self.ended_memory = memory;
        self
    }

    pub fn windows_ms(&self) -> &[u32] {
        &self.windows_ms
    }

    /// Fraction of expected channels absent from the point.
    ///
    /// Counts distinct channel names in the point against the size of the
    /// expected set; unexpected channels are not rejected here.
    pub fn missing_ratio(&self, point: &TelemetryPoint) -> f64 {
        if self.expected.is_empty() {
            return 0.0;
        }
        let seen: HashSet<&str> = point.channels.iter().map(|c| c.name.as_str()).collect();
        let missing = self.expected.len().saturating_sub(seen.len());
        missing as f64 / self.expected.len() as f64
    }

    /// Feed one point through every window and emit the resulting vectors,
    /// in configured window order.
    ///
    /// Points for a shot that has already ended yield no vectors and are
    /// counted in [`late_count`](Self::late_count).
    pub fn process(&self, point: &TelemetryPoint) -> Vec<FeatureVector> {
        let missing = self.missing_ratio(point);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.ended_set.contains(&point.shot_id) {
            state.late += 1;
            debug!(shot_id = %point.shot_id, ts = point.ts_unix_ns, "point after shot end dropped");
            return Vec::new();
        }

        let is_out_of_order = {
            let shot = state.shots.entry(point.shot_id.clone()).or_default();
            let out_of_order = shot
                .last_ts_unix_ns
                .is_some_and(|prev| point.ts_unix_ns <= prev);
            shot.last_ts_unix_ns = Some(point.ts_unix_ns);
            out_of_order
        };
        if is_out_of_order {
            state.out_of_order += 1;
            debug!(shot_id = %point.shot_id, ts = point.ts_unix_ns, "non-increasing timestamp");
        }

        let shot = state.shots.entry(point.shot_id.clone()).or_default();
        let mut vectors = Vec::with_capacity(self.windows_ms.len());

        for &window_ms in &self.windows_ms {
            let mut features = BTreeMap::new();

            for sample in &point.channels {
                let win = shot
                    .windows
                    .entry((window_ms, sample.name.clone()))
                    .or_insert_with(|| ChannelWindow::new(window_ms as usize));
                win.add(sample.value);

                for (stat, value) in win.stats(window_ms).named() {
                    features.insert(feature_key(&sample.name, stat, window_ms), value);
                }
            }

            features.insert(MISSING_RATIO_KEY.to_string(), missing);
            vectors.push(FeatureVector {
                shot_id: point.shot_id.clone(),
                ts_unix_ns: point.ts_unix_ns,
                window_ms,
                features,
                missing_ratio: missing,
            });
        }

        vectors
    }

    /// Release all accumulators held for a finished shot and stop accepting
    /// its points.
    ///
    /// Returns `true` if the shot was being tracked.
    pub fn end_shot(&self, shot_id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.mark_ended(shot_id, self.ended_memory);
        state.shots.remove(shot_id).is_some()
    }

    /// Number of shots with live accumulator state.
    pub fn tracked_shots(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shots
            .len()
    }

    /// Count of points whose timestamp did not advance past the previous one for the same shot.
    pub fn out_of_order_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .out_of_order
    }

    /// Count of points dropped because their shot had already ended.
    pub fn late_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .late
    }
}
