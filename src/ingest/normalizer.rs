//! Event normalizer.
//!
//! Buffers samples for a jitter window so that out-of-order arrivals are
//! emitted in timestamp order. Samples that arrive after their window closed
//! are dropped and counted; this is never fatal.

use crate::core::config::NormalizerConfig;
use crate::core::IngestError;
use crate::ingest::ambiguity::{AgreementScorer, AmbiguityScorer};
use crate::ingest::event::{EventStream, ModalitySample, RawEvent};
use crate::monitoring::ProtocolMetrics;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Jitter-window reordering buffer with ambiguity scoring.
pub struct EventNormalizer {
    jitter_window_ms: u64,
    scorer: Arc<dyn AmbiguityScorer>,
    /// Keyed by (timestamp, arrival order) so equal timestamps keep arrival order
    buffer: BTreeMap<(u64, u64), ModalitySample>,
    /// Recently emitted samples kept as peers for scoring
    recent: VecDeque<ModalitySample>,
    arrivals: u64,
    watermark_ms: Option<u64>,
    last_emitted_ms: Option<u64>,
    dropped_late: u64,
    metrics: Option<Arc<ProtocolMetrics>>,
}

impl EventNormalizer {
    /// Create a normalizer with the default agreement scorer.
    pub fn new(config: &NormalizerConfig) -> Self {
        Self::with_scorer(config, Arc::new(AgreementScorer::default()))
    }

    /// Create a normalizer with a custom scorer.
    pub fn with_scorer(config: &NormalizerConfig, scorer: Arc<dyn AmbiguityScorer>) -> Self {
        Self {
            jitter_window_ms: config.jitter_window_ms,
            scorer,
            buffer: BTreeMap::new(),
            recent: VecDeque::new(),
            arrivals: 0,
            watermark_ms: None,
            last_emitted_ms: None,
            dropped_late: 0,
            metrics: None,
        }
    }

    /// Report drops into shared protocol metrics.
    pub fn with_metrics(mut self, metrics: Arc<ProtocolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Earliest timestamp still accepted.
    pub fn cutoff_ms(&self) -> u64 {
        let window_floor = self
            .watermark_ms
            .map(|w| w.saturating_sub(self.jitter_window_ms))
            .unwrap_or(0);
        window_floor.max(self.last_emitted_ms.unwrap_or(0))
    }

    /// Buffer one sample.
    pub fn push(&mut self, sample: ModalitySample) -> Result<(), IngestError> {
        if sample.values.is_empty() {
            return Err(IngestError::EmptySample);
        }

        let cutoff_ms = self.cutoff_ms();
        if self.watermark_ms.is_some() && sample.timestamp_ms < cutoff_ms {
            self.dropped_late += 1;
            if let Some(metrics) = &self.metrics {
                metrics.dropped_late.inc();
            }
            warn!(
                modality = ?sample.modality,
                timestamp_ms = sample.timestamp_ms,
                cutoff_ms,
                "dropping late sample"
            );
            return Err(IngestError::DroppedLate {
                timestamp_ms: sample.timestamp_ms,
                cutoff_ms,
            });
        }

        self.watermark_ms = Some(
            self.watermark_ms
                .map_or(sample.timestamp_ms, |w| w.max(sample.timestamp_ms)),
        );
        self.buffer.insert((sample.timestamp_ms, self.arrivals), sample);
        self.arrivals += 1;
        Ok(())
    }

    /// Emit every sample whose jitter window has closed.
    pub fn drain_ready(&mut self) -> Vec<RawEvent> {
        let Some(watermark) = self.watermark_ms else {
            return Vec::new();
        };
        let cutoff = watermark.saturating_sub(self.jitter_window_ms);
        let pending = self.buffer.split_off(&(cutoff, 0));
        let ready = std::mem::replace(&mut self.buffer, pending);
        self.emit(ready)
    }

    /// Emit everything still buffered, e.g. at the end of a capture session.
    pub fn flush(&mut self) -> Vec<RawEvent> {
        let ready = std::mem::take(&mut self.buffer);
        self.emit(ready)
    }

    /// Normalize a batch of samples into an ordered stream.
    pub fn normalize(&mut self, samples: impl IntoIterator<Item = ModalitySample>) -> EventStream {
        let dropped_before = self.dropped_late;
        let mut events = Vec::new();
        for sample in samples {
            if let Err(err) = self.push(sample) {
                debug!(error = %err, "sample skipped");
            }
            events.extend(self.drain_ready());
        }
        events.extend(self.flush());

        debug!(
            events = events.len(),
            dropped = self.dropped_late - dropped_before,
            "normalized sample batch"
        );
        EventStream::new(events, self.dropped_late - dropped_before)
    }

    /// Total samples dropped for lateness.
    pub fn dropped_late(&self) -> u64 {
        self.dropped_late
    }

    /// Samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn emit(&mut self, ready: BTreeMap<(u64, u64), ModalitySample>) -> Vec<RawEvent> {
        if ready.is_empty() {
            return Vec::new();
        }

        let events: Vec<RawEvent> = {
            let context: Vec<&ModalitySample> = self
                .recent
                .iter()
                .chain(ready.values())
                .chain(self.buffer.values())
                .collect();

            ready
                .values()
                .map(|sample| {
                    let peers: Vec<&ModalitySample> = context
                        .iter()
                        .copied()
                        .filter(|peer| {
                            !std::ptr::eq(*peer, sample)
                                && peer.timestamp_ms.abs_diff(sample.timestamp_ms)
                                    <= self.jitter_window_ms
                        })
                        .collect();
                    let ambiguity = self.scorer.score(sample, &peers);
                    RawEvent::new(
                        sample.modality,
                        sample.timestamp_ms,
                        sample.values.clone(),
                        ambiguity,
                    )
                })
                .collect()
        };

        if let Some(last) = events.last() {
            self.last_emitted_ms = Some(last.timestamp_ms());
            let horizon = last.timestamp_ms().saturating_sub(self.jitter_window_ms);
            self.recent.extend(ready.into_values());
            self.recent.retain(|s| s.timestamp_ms >= horizon);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::event::Modality;

    fn sample(modality: Modality, ts: u64) -> ModalitySample {
        ModalitySample::new(modality, ts, vec![0.5, 0.5], 0.9)
    }

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(&NormalizerConfig::default())
    }

    #[test]
    fn test_reorders_within_jitter_window() {
        let mut norm = normalizer();
        let stream = norm.normalize(vec![
            sample(Modality::Gaze, 0),
            sample(Modality::Touch, 30),
            sample(Modality::Voice, 10),
        ]);

        let order: Vec<u64> = stream.events().iter().map(|e| e.timestamp_ms()).collect();
        assert_eq!(order, vec![0, 10, 30]);
        assert_eq!(stream.dropped_late(), 0);
    }

    #[test]
    fn test_drops_samples_older_than_window() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let mut norm = normalizer().with_metrics(Arc::clone(&metrics));
        let stream = norm.normalize(vec![
            sample(Modality::Gaze, 0),
            sample(Modality::Touch, 100),
            sample(Modality::Voice, 20),
        ]);

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.dropped_late(), 1);
        assert_eq!(metrics.dropped_late.get(), 1);
    }

    #[test]
    fn test_push_reports_late_sample() {
        let mut norm = normalizer();
        norm.push(sample(Modality::Gaze, 200)).unwrap();
        let err = norm.push(sample(Modality::Touch, 100)).unwrap_err();
        assert_eq!(
            err,
            IngestError::DroppedLate {
                timestamp_ms: 100,
                cutoff_ms: 150
            }
        );
        assert_eq!(norm.dropped_late(), 1);
    }

    #[test]
    fn test_drain_holds_samples_inside_window() {
        let mut norm = normalizer();
        norm.push(sample(Modality::Gaze, 0)).unwrap();
        norm.push(sample(Modality::Gaze, 40)).unwrap();
        assert!(norm.drain_ready().is_empty());
        assert_eq!(norm.buffered(), 2);

        norm.push(sample(Modality::Gaze, 70)).unwrap();
        let ready = norm.drain_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].timestamp_ms(), 0);
    }

    #[test]
    fn test_no_regression_after_flush() {
        let mut norm = normalizer();
        norm.normalize(vec![sample(Modality::Gaze, 500)]);
        let later = norm.normalize(vec![sample(Modality::Touch, 480)]);
        assert!(later.is_empty());
        assert_eq!(later.dropped_late(), 1);
    }

    #[test]
    fn test_empty_sample_rejected() {
        let mut norm = normalizer();
        let empty = ModalitySample::new(Modality::Text, 0, vec![], 1.0);
        assert_eq!(norm.push(empty), Err(IngestError::EmptySample));
    }

    #[test]
    fn test_cross_modal_ambiguity() {
        let mut norm = normalizer();
        let stream = norm.normalize(vec![
            ModalitySample::new(Modality::Gaze, 0, vec![0.1], 0.9),
            ModalitySample::new(Modality::Voice, 10, vec![0.1], 0.1),
        ]);
        let gaze = &stream.events()[0];
        assert!(gaze.ambiguity() > 0.1 + 1e-3);
    }
}
