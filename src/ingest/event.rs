//! Modality samples and normalized events.

use crate::core::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input channel of an interaction signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modality {
    Gaze,
    Touch,
    Pointer,
    Voice,
    Gesture,
    Text,
    /// Explicit idle gap reported by the capture layer
    Idle,
}

impl Modality {
    /// Whether this modality represents the absence of activity.
    pub fn is_idle(self) -> bool {
        matches!(self, Modality::Idle)
    }
}

/// A raw sample as delivered by a capture device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModalitySample {
    /// Modality tag
    pub modality: Modality,
    /// Monotonic capture time in milliseconds
    pub timestamp_ms: u64,
    /// Device-normalized values
    pub values: Vec<f32>,
    /// Device-reported confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl ModalitySample {
    /// Create a sample.
    pub fn new(modality: Modality, timestamp_ms: u64, values: Vec<f32>, confidence: f32) -> Self {
        Self {
            modality,
            timestamp_ms,
            values,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Idle-gap marker with full confidence.
    pub fn idle(timestamp_ms: u64) -> Self {
        Self::new(Modality::Idle, timestamp_ms, vec![0.0], 1.0)
    }
}

/// A normalized event. Immutable once captured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    modality: Modality,
    timestamp_ms: u64,
    values: Vec<f32>,
    ambiguity: f32,
}

impl RawEvent {
    pub(crate) fn new(modality: Modality, timestamp_ms: u64, values: Vec<f32>, ambiguity: f32) -> Self {
        Self {
            modality,
            timestamp_ms,
            values,
            ambiguity: ambiguity.clamp(0.0, 1.0),
        }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Ambiguity score (0.0 - 1.0).
    pub fn ambiguity(&self) -> f32 {
        self.ambiguity
    }
}

/// A timestamp-ordered snapshot of normalized events.
///
/// Cloning is cheap; the events are shared read-only.
#[derive(Clone, Debug)]
pub struct EventStream {
    events: Arc<[RawEvent]>,
    dropped_late: u64,
    captured_at: Timestamp,
}

impl EventStream {
    pub(crate) fn new(events: Vec<RawEvent>, dropped_late: u64) -> Self {
        Self {
            events: events.into(),
            dropped_late,
            captured_at: now(),
        }
    }

    /// Build a stream from events that are already normalized.
    pub fn from_events(mut events: Vec<RawEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp_ms);
        Self::new(events, 0)
    }

    /// Shared handle to the events.
    pub fn snapshot(&self) -> Arc<[RawEvent]> {
        Arc::clone(&self.events)
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Samples dropped while this stream was normalized.
    pub fn dropped_late(&self) -> u64 {
        self.dropped_late
    }

    /// Wall-clock time the snapshot was taken.
    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Timestamp span `(first, last)` or `None` when empty.
    pub fn span(&self) -> Option<(u64, u64)> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => Some((first.timestamp_ms, last.timestamp_ms)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_confidence_clamped() {
        let sample = ModalitySample::new(Modality::Gaze, 10, vec![0.5], 1.7);
        assert_eq!(sample.confidence, 1.0);
    }

    #[test]
    fn test_stream_from_events_sorted() {
        let stream = EventStream::from_events(vec![
            RawEvent::new(Modality::Touch, 30, vec![0.1], 0.1),
            RawEvent::new(Modality::Gaze, 10, vec![0.2], 0.1),
        ]);
        assert_eq!(stream.span(), Some((10, 30)));
        assert_eq!(stream.events()[0].modality(), Modality::Gaze);
    }

    #[test]
    fn test_snapshot_shares_events() {
        let stream = EventStream::from_events(vec![RawEvent::new(Modality::Voice, 1, vec![], 0.0)]);
        let a = stream.snapshot();
        let b = stream.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
