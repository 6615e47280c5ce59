//! Counters reported by the service and executor
//!
//! Components only see the [`MetricsSink`] trait. [`Metrics`] is the
//! in-memory implementation used by default and by tests.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Monotonic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Counter {
    /// Messages accepted onto the write queue
    WritesEnqueued,
    /// Bytes accepted onto the queue
    WritesEnqueuedBytes,
    /// Messages taken off the queue by the writer
    WritesDequeued,
    /// Bytes taken off the queue
    WritesDequeuedBytes,
    /// Messages written and drained to the port
    WritesSucceeded,
    /// Bytes written
    WritesSucceededBytes,
    /// Messages the port rejected
    WritesFailed,
    /// Bytes the port rejected
    WritesFailedBytes,
    /// Messages too large for a pooled buffer
    WritesOmitted,
    /// Bytes of oversized messages
    WritesOmittedBytes,
    /// Messages dropped because the queue was full
    WritesQueueFull,
    /// Bytes dropped on a full queue
    WritesQueueFullBytes,
    /// Non-empty reads from the port
    Reads,
    /// Bytes read from the port
    ReadBytes,
    /// Pending bytes discarded because the assembler was full
    AssemblerOverflows,
    /// Frames popped from the assembler
    Pops,
    /// Frames that failed to decode
    DecodeErrors,
    /// Bytes in frames that failed to decode
    DecodeErrorBytes,
    /// Frames with an identifier outside the catalog
    UnknownIdentifiers,
    /// Static status requests sent
    StaticStatusRequests,
    /// Static status responses decoded
    StaticStatusResponses,
    /// Port opened
    Connects,
    /// Port closed
    Disconnects,
}

impl Counter {
    /// Every counter, in declaration order
    pub const ALL: [Counter; 23] = [
        Counter::WritesEnqueued,
        Counter::WritesEnqueuedBytes,
        Counter::WritesDequeued,
        Counter::WritesDequeuedBytes,
        Counter::WritesSucceeded,
        Counter::WritesSucceededBytes,
        Counter::WritesFailed,
        Counter::WritesFailedBytes,
        Counter::WritesOmitted,
        Counter::WritesOmittedBytes,
        Counter::WritesQueueFull,
        Counter::WritesQueueFullBytes,
        Counter::Reads,
        Counter::ReadBytes,
        Counter::AssemblerOverflows,
        Counter::Pops,
        Counter::DecodeErrors,
        Counter::DecodeErrorBytes,
        Counter::UnknownIdentifiers,
        Counter::StaticStatusRequests,
        Counter::StaticStatusResponses,
        Counter::Connects,
        Counter::Disconnects,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Receives counter increments
pub trait MetricsSink: Send + Sync {
    /// Add `value` to `counter`, stamped `at`
    fn add(&self, counter: Counter, value: u64, at: DateTime<Utc>);

    /// Increment by one, stamped now
    fn incr(&self, counter: Counter) {
        self.add(counter, 1, Utc::now());
    }
}

/// Discards every increment
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add(&self, _counter: Counter, _value: u64, _at: DateTime<Utc>) {}
}

/// In-memory counters
#[derive(Debug, Default)]
pub struct Metrics {
    values: [AtomicU64; Counter::ALL.len()],
    last_update: Mutex<Option<DateTime<Utc>>>,
}

impl Metrics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one counter
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Time of the most recent increment
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update.lock().ok().and_then(|guard| *guard)
    }

    /// Non-zero counters by name
    pub fn snapshot(&self) -> BTreeMap<Counter, u64> {
        Counter::ALL
            .iter()
            .map(|&counter| (counter, self.get(counter)))
            .filter(|(_, value)| *value > 0)
            .collect()
    }
}

impl MetricsSink for Metrics {
    fn add(&self, counter: Counter, value: u64, at: DateTime<Utc>) {
        self.values[counter.index()].fetch_add(value, Ordering::Relaxed);
        if let Ok(mut last) = self.last_update.lock() {
            if last.map_or(true, |prev| at > prev) {
                *last = Some(at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.incr(Counter::Reads);
        metrics.add(Counter::ReadBytes, 12, Utc::now());
        metrics.add(Counter::ReadBytes, 4, Utc::now());

        assert_eq!(metrics.get(Counter::Reads), 1);
        assert_eq!(metrics.get(Counter::ReadBytes), 16);
        assert_eq!(metrics.get(Counter::Pops), 0);
        assert_eq!(metrics.snapshot().len(), 2);
    }

    #[test]
    fn test_last_update_is_monotonic() {
        let metrics = Metrics::new();
        let later = Utc.with_ymd_and_hms(2024, 10, 2, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();

        metrics.add(Counter::Connects, 1, later);
        metrics.add(Counter::Disconnects, 1, earlier);
        assert_eq!(metrics.last_update(), Some(later));
    }

    #[test]
    fn test_counter_indices_match_catalog() {
        for (n, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), n);
        }
    }
}
