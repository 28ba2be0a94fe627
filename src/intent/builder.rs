//! Multi-resolution intent tree builder.
//!
//! Each resolution slices the event stream into fixed windows aligned to
//! the first event. A window becomes a `Segment` node whose children are the
//! actions detected inside it; empty windows become `Idle` nodes so that
//! time continuity is preserved.

use crate::codec::MAX_PAYLOAD;
use crate::core::config::TreeConfig;
use crate::core::{Error, Resolution, Result, SymbolicError};
use crate::ingest::event::{EventStream, RawEvent};
use crate::intent::node::{AffectVector, ContextFrame, IntentLabel, IntentTree};
use crate::monitoring::ProtocolMetrics;
use crate::symbolic::packing::WORDS_PER_TOKEN;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Most nodes a tree may have: each node packs into at least
/// `WORDS_PER_TOKEN` bytes of uncompressed body.
pub const MAX_TREE_NODES: usize = MAX_PAYLOAD / WORDS_PER_TOKEN;

/// The three trees of one capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeSet {
    pub coarse: IntentTree,
    pub medium: IntentTree,
    pub atomic: IntentTree,
}

impl TreeSet {
    /// Tree for a resolution.
    pub fn get(&self, resolution: Resolution) -> &IntentTree {
        match resolution {
            Resolution::Coarse => &self.coarse,
            Resolution::Medium => &self.medium,
            Resolution::Atomic => &self.atomic,
        }
    }

    /// Iterate coarse, medium, atomic.
    pub fn iter(&self) -> impl Iterator<Item = &IntentTree> {
        [&self.coarse, &self.medium, &self.atomic].into_iter()
    }

    fn degraded(self) -> Self {
        Self {
            coarse: self.coarse.degraded(),
            medium: self.medium.degraded(),
            atomic: self.atomic.degraded(),
        }
    }
}

/// Window ambiguity exceeded the ceiling.
///
/// Carries the trees that were built so the caller can either ask the user
/// to clarify or continue with degraded confidence.
#[derive(Clone, Debug)]
pub struct AmbiguityOverflow {
    /// Resolution whose window had the highest aggregate
    pub resolution: Resolution,
    /// Offending window
    pub window_index: u32,
    /// Mean ambiguity of that window
    pub aggregate: f32,
    /// Configured ceiling
    pub ceiling: f32,
    trees: TreeSet,
}

impl AmbiguityOverflow {
    /// Trees as built, still marked nominal.
    pub fn trees(&self) -> &TreeSet {
        &self.trees
    }

    /// Continue with every tree marked `Confidence::Degraded`.
    pub fn proceed_degraded(self) -> TreeSet {
        self.trees.degraded()
    }
}

impl fmt::Display for AmbiguityOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ambiguity overflow: {} window {} aggregate {:.3} exceeds ceiling {:.3}",
            self.resolution, self.window_index, self.aggregate, self.ceiling
        )
    }
}

impl std::error::Error for AmbiguityOverflow {}

/// One tree plus the worst window that crossed the ceiling, if any.
#[derive(Clone, Debug)]
pub struct BuiltTree {
    pub tree: IntentTree,
    pub overflow: Option<WindowOverflow>,
}

/// A window whose mean ambiguity exceeded the ceiling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowOverflow {
    pub window_index: u32,
    pub aggregate: f32,
}

/// Builds intent trees from normalized event streams.
#[derive(Clone)]
pub struct TreeBuilder {
    config: TreeConfig,
    metrics: Option<Arc<ProtocolMetrics>>,
}

impl TreeBuilder {
    /// Create a builder.
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Count overflows in shared protocol metrics.
    pub fn with_metrics(mut self, metrics: Arc<ProtocolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Window length for a resolution.
    pub fn window_ms(&self, resolution: Resolution) -> u64 {
        match resolution {
            Resolution::Coarse => self.config.coarse_window_ms,
            Resolution::Medium => self.config.medium_window_ms,
            Resolution::Atomic => self.config.atomic_window_ms,
        }
        .max(1)
    }

    /// Build all three trees concurrently from one snapshot.
    ///
    /// Returns `Error::AmbiguityOverflow` when any window crosses the
    /// ceiling; the error carries the finished trees.
    pub async fn build_trees(&self, stream: &EventStream) -> Result<TreeSet> {
        let events = stream.snapshot();
        let spawn = |resolution: Resolution| {
            let builder = self.clone();
            let events = Arc::clone(&events);
            tokio::task::spawn_blocking(move || builder.build_tree(&events, resolution))
        };

        let (coarse, medium, atomic) = tokio::try_join!(
            spawn(Resolution::Coarse),
            spawn(Resolution::Medium),
            spawn(Resolution::Atomic)
        )
        .map_err(|e| Error::Internal(format!("tree builder task failed: {}", e)))?;
        let (coarse, medium, atomic) = (coarse?, medium?, atomic?);

        let worst = [
            (Resolution::Coarse, coarse.overflow),
            (Resolution::Medium, medium.overflow),
            (Resolution::Atomic, atomic.overflow),
        ]
        .into_iter()
        .filter_map(|(resolution, overflow)| overflow.map(|o| (resolution, o)))
        .fold(None, |acc: Option<(Resolution, WindowOverflow)>, cur| match acc {
            Some(best) if best.1.aggregate >= cur.1.aggregate => Some(best),
            _ => Some(cur),
        });

        let trees = TreeSet {
            coarse: coarse.tree,
            medium: medium.tree,
            atomic: atomic.tree,
        };

        debug!(
            events = stream.len(),
            coarse = trees.coarse.len(),
            medium = trees.medium.len(),
            atomic = trees.atomic.len(),
            "built intent trees"
        );

        match worst {
            None => Ok(trees),
            Some((resolution, overflow)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.ambiguity_overflows.inc();
                }
                warn!(
                    %resolution,
                    window = overflow.window_index,
                    aggregate = overflow.aggregate,
                    ceiling = self.config.ambiguity_ceiling,
                    "ambiguity overflow"
                );
                Err(AmbiguityOverflow {
                    resolution,
                    window_index: overflow.window_index,
                    aggregate: overflow.aggregate,
                    ceiling: self.config.ambiguity_ceiling,
                    trees,
                }
                .into())
            }
        }
    }

    /// Build the tree for one resolution. `events` must be timestamp ordered.
    ///
    /// Fails before allocating anything when the span would need more than
    /// [`MAX_TREE_NODES`] window nodes.
    pub fn build_tree(&self, events: &[RawEvent], resolution: Resolution) -> Result<BuiltTree> {
        let window = self.window_ms(resolution);

        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            let mut tree = IntentTree::with_root(
                resolution,
                frame(0, 0, 0, 0),
                AffectVector::neutral(),
                0.0,
            );
            tree.push(
                0,
                IntentLabel::Idle,
                frame(0, 0, window, 0),
                AffectVector::neutral(),
                0.0,
                0.0,
            );
            return Ok(BuiltTree {
                tree,
                overflow: None,
            });
        };

        let start = first.timestamp_ms();
        let span = last.timestamp_ms() - start;
        let window_count = span / window + 1;
        if window_count >= MAX_TREE_NODES as u64 {
            warn!(%resolution, span, window, windows = window_count, "event span too wide to encode");
            return Err(SymbolicError::TreeTooLarge {
                nodes: window_count.saturating_add(1),
                max: MAX_TREE_NODES,
            }
            .into());
        }

        let mut tree = IntentTree::with_root(
            resolution,
            frame(0, start, span, events.len()),
            AffectVector::from_events(events),
            mean_ambiguity(events),
        );

        let mut overflow: Option<WindowOverflow> = None;
        let mut cursor = 0usize;

        for w in 0..window_count {
            let window_index = u32::try_from(w).unwrap_or(u32::MAX);
            let w_start = start + w * window;
            let w_end = w_start + window;
            let from = cursor;
            while cursor < events.len() && events[cursor].timestamp_ms() < w_end {
                cursor += 1;
            }
            let slice = &events[from..cursor];

            if slice.is_empty() {
                tree.push(
                    0,
                    IntentLabel::Idle,
                    frame(window_index, w_start, window, 0),
                    AffectVector::neutral(),
                    0.0,
                    0.0,
                );
                continue;
            }

            let aggregate = mean_ambiguity(slice);
            if aggregate > self.config.ambiguity_ceiling
                && overflow.map_or(true, |o| aggregate > o.aggregate)
            {
                overflow = Some(WindowOverflow {
                    window_index,
                    aggregate,
                });
            }

            let density = slice.len() as f32 / events.len() as f32;
            let segment = tree.push(
                0,
                IntentLabel::Segment,
                frame(window_index, w_start, window, slice.len()),
                AffectVector::from_events(slice),
                aggregate,
                density * (1.0 - aggregate),
            );

            for run in split_actions(slice, window / 4) {
                let run_start = run[0].timestamp_ms();
                let run_end = run[run.len() - 1].timestamp_ms();
                let ambiguity = mean_ambiguity(run);
                let density = run.len() as f32 / slice.len() as f32;
                tree.push(
                    segment,
                    IntentLabel::for_modality(run[0].modality()),
                    frame(window_index, run_start, run_end - run_start, run.len()),
                    AffectVector::from_events(run),
                    ambiguity,
                    density * (1.0 - ambiguity),
                );
            }
        }

        Ok(BuiltTree { tree, overflow })
    }
}

/// Split a window into runs at modality changes and gaps wider than `max_gap_ms`.
fn split_actions(events: &[RawEvent], max_gap_ms: u64) -> Vec<&[RawEvent]> {
    let mut runs = Vec::new();
    let mut from = 0;
    for i in 1..events.len() {
        let prev = &events[i - 1];
        let cur = &events[i];
        if cur.modality() != prev.modality()
            || cur.timestamp_ms() - prev.timestamp_ms() > max_gap_ms
        {
            runs.push(&events[from..i]);
            from = i;
        }
    }
    if from < events.len() {
        runs.push(&events[from..]);
    }
    runs
}

fn mean_ambiguity(events: &[RawEvent]) -> f32 {
    if events.is_empty() {
        return 0.0;
    }
    events.iter().map(|e| e.ambiguity()).sum::<f32>() / events.len() as f32
}

fn frame(window_index: u32, start_ms: u64, duration_ms: u64, event_count: usize) -> ContextFrame {
    ContextFrame {
        window_index,
        start_ms,
        duration_ms: u32::try_from(duration_ms).unwrap_or(u32::MAX),
        event_count: u32::try_from(event_count).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::event::Modality;
    use crate::intent::node::Confidence;

    fn event(modality: Modality, ts: u64, ambiguity: f32) -> RawEvent {
        RawEvent::new(modality, ts, vec![0.2, 0.3], ambiguity)
    }

    fn builder() -> TreeBuilder {
        TreeBuilder::new(TreeConfig::default())
    }

    #[test]
    fn test_gaze_touch_idle_medium_tree() {
        let events = vec![
            event(Modality::Gaze, 0, 0.1),
            event(Modality::Touch, 150, 0.1),
            event(Modality::Idle, 300, 0.0),
        ];
        let built = builder().build_tree(&events, Resolution::Medium).unwrap();
        let tree = built.tree;

        assert!(built.overflow.is_none());
        assert_eq!(tree.action_nodes().count(), 2);
        assert_eq!(tree.idle_nodes().count(), 1);
        let labels: Vec<IntentLabel> = tree.action_nodes().map(|n| n.label).collect();
        assert_eq!(labels, vec![IntentLabel::Attend, IntentLabel::Select]);
        assert!(tree.is_preorder());
    }

    #[test]
    fn test_gap_splits_same_modality() {
        let events = vec![
            event(Modality::Gaze, 0, 0.1),
            event(Modality::Gaze, 20, 0.1),
            event(Modality::Gaze, 90, 0.1),
        ];
        // atomic window 100ms: gap limit 25ms
        let tree = builder().build_tree(&events, Resolution::Atomic).unwrap().tree;
        assert_eq!(tree.action_nodes().count(), 2);
    }

    #[test]
    fn test_empty_window_becomes_idle() {
        let events = vec![event(Modality::Voice, 0, 0.2), event(Modality::Voice, 250, 0.2)];
        let tree = builder().build_tree(&events, Resolution::Atomic).unwrap().tree;
        // windows 0, 1, 2: the middle one is empty
        let idle: Vec<u32> = tree.idle_nodes().map(|n| n.context.window_index).collect();
        assert_eq!(idle, vec![1]);
        assert_eq!(tree.action_nodes().count(), 2);
    }

    #[test]
    fn test_empty_stream_yields_idle_tree() {
        let tree = builder().build_tree(&[], Resolution::Coarse).unwrap().tree;
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.idle_nodes().count(), 1);
    }

    #[test]
    fn test_weight_reflects_density_and_ambiguity() {
        let events = vec![
            event(Modality::Gaze, 0, 0.5),
            event(Modality::Gaze, 10, 0.5),
            event(Modality::Touch, 20, 0.0),
        ];
        let tree = builder().build_tree(&events, Resolution::Medium).unwrap().tree;
        let weights: Vec<f32> = tree.action_nodes().map(|n| n.weight).collect();
        assert!((weights[0] - (2.0 / 3.0) * 0.5).abs() < 1e-6);
        assert!((weights[1] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_overflow_reports_worst_window() {
        let window = builder().window_ms(Resolution::Atomic);
        let events = vec![
            event(Modality::Gaze, 0, 0.9),
            event(Modality::Gaze, window, 0.95),
            event(Modality::Gaze, 2 * window, 0.88),
        ];
        let overflow = builder()
            .build_tree(&events, Resolution::Atomic)
            .unwrap()
            .overflow
            .unwrap();
        assert_eq!(overflow.window_index, 1);
        assert!((overflow.aggregate - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_wide_span_rejected_up_front() {
        let events = vec![event(Modality::Gaze, 0, 0.1), event(Modality::Gaze, u64::MAX / 2, 0.1)];
        let err = builder().build_tree(&events, Resolution::Atomic).unwrap_err();
        assert!(matches!(
            err,
            Error::Symbolic(SymbolicError::TreeTooLarge { max: MAX_TREE_NODES, .. })
        ));

        // just under the limit still builds
        let window = builder().window_ms(Resolution::Coarse);
        let last = (MAX_TREE_NODES as u64 - 2) * window;
        let events = vec![event(Modality::Gaze, 0, 0.1), event(Modality::Gaze, last, 0.1)];
        let tree = builder().build_tree(&events, Resolution::Coarse).unwrap().tree;
        assert_eq!(tree.action_nodes().count(), 2);
        assert_eq!(tree.idle_nodes().count(), MAX_TREE_NODES - 3);
    }

    #[tokio::test]
    async fn test_build_trees_concurrently() {
        let stream = EventStream::from_events(vec![
            event(Modality::Gaze, 0, 0.1),
            event(Modality::Touch, 150, 0.1),
            event(Modality::Text, 900, 0.1),
        ]);
        let trees = builder().build_trees(&stream).await.unwrap();
        assert_eq!(trees.coarse.resolution(), Resolution::Coarse);
        assert_eq!(trees.medium.resolution(), Resolution::Medium);
        assert_eq!(trees.atomic.resolution(), Resolution::Atomic);
        assert!(trees.iter().all(|t| t.confidence() == Confidence::Nominal));
        assert_eq!(trees.coarse.action_nodes().count(), 3);
    }

    #[tokio::test]
    async fn test_overflow_carries_trees() {
        let metrics = Arc::new(ProtocolMetrics::new());
        let stream = EventStream::from_events(vec![
            event(Modality::Gaze, 0, 0.9),
            event(Modality::Voice, 40, 0.9),
        ]);
        let err = builder()
            .with_metrics(Arc::clone(&metrics))
            .build_trees(&stream)
            .await
            .unwrap_err();

        let overflow = match err {
            Error::AmbiguityOverflow(overflow) => overflow,
            other => panic!("unexpected error: {other}"),
        };
        assert!((overflow.aggregate - 0.9).abs() < 1e-6);
        assert_eq!(overflow.ceiling, 0.85);
        assert_eq!(metrics.ambiguity_overflows.get(), 1);

        let trees = (*overflow).proceed_degraded();
        assert!(trees.iter().all(|t| t.confidence() == Confidence::Degraded));
    }
}
