use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-stage message accounting. Shared between the stage loop, its handler
/// tasks and the sink worker.
#[derive(Debug, Default)]
pub struct StageCounters {
    received: AtomicU64,
    processed: AtomicU64,
    malformed: AtomicU64,
    failed: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
    sink_dropped: AtomicU64,
}

/// Point-in-time copy of [`StageCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub processed: u64,
    pub malformed: u64,
    pub failed: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub sink_dropped: u64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// A handler error that was not an input problem.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_dropped(&self) {
        self.sink_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            sink_dropped: self.sink_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn snapshot_reflects_increments() {
        let c = StageCounters::new();
        c.record_received();
        c.record_received();
        c.record_malformed();
        c.record_published();
        c.record_sink_dropped();
        let s = c.snapshot();
        assert_eq!(s.received, 2);
        assert_eq!(s.malformed, 1);
        assert_eq!(s.published, 1);
        assert_eq!(s.sink_dropped, 1);
        assert_eq!(s.processed, 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let c = Arc::new(StageCounters::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.record_processed();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.snapshot().processed, 4000);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let json = serde_json::to_value(CounterSnapshot::default()).unwrap();
        assert_eq!(json["publish_failures"], 0);
        assert_eq!(json["sink_dropped"], 0);
    }
}
