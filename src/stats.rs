//! Pipeline accounting: per-kind event counters and an ingress-to-dispatch
//! latency histogram.

use hdrhistogram::Histogram;

use crate::clock::Nanos;
use crate::event::EventKind;

/// Per-kind event tallies for one end of the pipe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub total: u64,
    pub new: u64,
    pub cancel: u64,
    pub replace: u64,
}

impl EventCounts {
    /// Counts one event of `kind`.
    #[inline]
    pub fn bump(&mut self, kind: EventKind) {
        self.total += 1;
        match kind {
            EventKind::New => self.new += 1,
            EventKind::Cancel => self.cancel += 1,
            EventKind::Replace => self.replace += 1,
        }
    }
}

/// Latency percentile snapshot, all values in nanoseconds.
#[derive(Clone, Copy, Debug)]
pub struct LatencySummary {
    pub count: u64,
    pub min: Nanos,
    pub p50: Nanos,
    pub p95: Nanos,
    pub p99: Nanos,
    pub p999: Nanos,
    pub max: Nanos,
}

/// Records per-event latencies into an HDR histogram.
///
/// Tracks 1ns..=60s at three significant figures; out-of-range samples are
/// clamped rather than dropped.
pub struct LatencyRecorder {
    hist: Histogram<u64>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        let hist = Histogram::new_with_bounds(1, 60_000_000_000, 3)
            .expect("static histogram bounds are valid");
        Self { hist }
    }

    #[inline]
    pub fn record(&mut self, nanos: Nanos) {
        self.hist.saturating_record(nanos.max(1));
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.hist.len(),
            min: self.hist.min(),
            p50: self.hist.value_at_quantile(0.50),
            p95: self.hist.value_at_quantile(0.95),
            p99: self.hist.value_at_quantile(0.99),
            p999: self.hist.value_at_quantile(0.999),
            max: self.hist.max(),
        }
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Merged statistics for one pipeline run.
pub struct PipelineStats {
    /// Events the producer pushed into the ring.
    pub produced: EventCounts,
    /// Events the consumer dispatched to the book.
    pub consumed: EventCounts,
    /// Ingress-to-dispatch latency.
    pub latency: LatencyRecorder,
}
