//! Monitoring Module
//!
//! Provides observability for Rasoom:
//! - Protocol counters and latency histogram
//! - Tracing subscriber setup

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{Counter, Gauge, Histogram, MetricsSnapshot, ProtocolMetrics};
