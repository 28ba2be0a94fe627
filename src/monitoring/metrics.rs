//! Protocol metrics.
//!
//! Lock-free counters and gauges grouped per pipeline stage.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64, // Store as bits for f64
}

impl Gauge {
    /// Create a new gauge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gauge value.
    pub fn set(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// A histogram of latencies in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a histogram with latency buckets suited to tier budgets.
    pub fn new() -> Self {
        Self::with_buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])
    }

    /// Create with custom buckets.
    pub fn with_buckets(buckets: Vec<f64>) -> Self {
        let bucket_counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            bucket_counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Observe a value.
    pub fn observe(&self, value: f64) {
        for (i, bucket) in self.buckets.iter().enumerate() {
            if value <= *bucket {
                self.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }

        // Compare-and-swap on the f64 bit pattern so concurrent observers don't lose updates
        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .sum
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get observation count.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Cumulative counts as `(upper bound, observations <= bound)` pairs.
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(&self.bucket_counts)
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }

    /// Get mean value.
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            f64::from_bits(self.sum.load(Ordering::Relaxed)) / count as f64
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// All protocol counters, shared by the pipeline stages through an `Arc`.
#[derive(Debug, Default)]
pub struct ProtocolMetrics {
    /// Samples dropped for arriving after the jitter window
    pub dropped_late: Counter,
    /// Windows whose aggregate ambiguity exceeded the ceiling
    pub ambiguity_overflows: Counter,
    /// Frames encoded in full
    pub frames_full: Counter,
    /// Frames encoded as a delta against a prior frame
    pub frames_delta: Counter,
    /// Frames repaired by parity
    pub frames_correctable: Counter,
    /// Symbols repaired by parity
    pub symbols_corrected: Counter,
    /// Frames discarded as uncorrectable
    pub frames_uncorrectable: Counter,
    /// Frames rejected for an unknown schema version
    pub schema_mismatches: Counter,
    /// Envelopes that reached quorum
    pub routes_acknowledged: Counter,
    /// Envelopes whose deadline elapsed
    pub routes_timed_out: Counter,
    /// Envelopes rejected during resolution
    pub routes_rejected: Counter,
    /// Requests refused because a lane was full
    pub backpressure_rejections: Counter,
    /// Current standard-lane depth
    pub pending_depth: Gauge,
    /// Dispatch-to-terminal latency
    pub dispatch_latency_ms: Histogram,
}

impl ProtocolMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a serializable point-in-time copy.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dropped_late: self.dropped_late.get(),
            ambiguity_overflows: self.ambiguity_overflows.get(),
            frames_full: self.frames_full.get(),
            frames_delta: self.frames_delta.get(),
            frames_correctable: self.frames_correctable.get(),
            symbols_corrected: self.symbols_corrected.get(),
            frames_uncorrectable: self.frames_uncorrectable.get(),
            schema_mismatches: self.schema_mismatches.get(),
            routes_acknowledged: self.routes_acknowledged.get(),
            routes_timed_out: self.routes_timed_out.get(),
            routes_rejected: self.routes_rejected.get(),
            backpressure_rejections: self.backpressure_rejections.get(),
            pending_depth: self.pending_depth.get(),
            mean_dispatch_latency_ms: self.dispatch_latency_ms.mean(),
            dispatch_latency_buckets: self.dispatch_latency_ms.buckets(),
        }
    }
}

/// Point-in-time metric values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub dropped_late: u64,
    pub ambiguity_overflows: u64,
    pub frames_full: u64,
    pub frames_delta: u64,
    pub frames_correctable: u64,
    pub symbols_corrected: u64,
    pub frames_uncorrectable: u64,
    pub schema_mismatches: u64,
    pub routes_acknowledged: u64,
    pub routes_timed_out: u64,
    pub routes_rejected: u64,
    pub backpressure_rejections: u64,
    pub pending_depth: f64,
    pub mean_dispatch_latency_ms: f64,
    pub dispatch_latency_buckets: Vec<(f64, u64)>,
}
