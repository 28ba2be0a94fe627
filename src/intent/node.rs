//! Intent tree representation.
//!
//! Trees are stored as an arena: node ids are indices, node 0 is the root
//! and every other node points to a parent with a smaller id.

use crate::core::{Result, Resolution, SymbolicError};
use crate::ingest::event::{Modality, RawEvent};
use serde::{Deserialize, Serialize};

/// Intent label attached to each node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentLabel {
    /// Root of a capture session
    Session,
    /// One time window
    Segment,
    /// No activity
    Idle,
    /// Looking at something
    Attend,
    /// Touching or pointing at something
    Select,
    /// Speaking
    Speak,
    /// Free-form gesture
    Gesture,
    /// Typing
    Compose,
}

impl IntentLabel {
    /// All labels in canonical order.
    pub const ALL: [IntentLabel; 8] = [
        IntentLabel::Session,
        IntentLabel::Segment,
        IntentLabel::Idle,
        IntentLabel::Attend,
        IntentLabel::Select,
        IntentLabel::Speak,
        IntentLabel::Gesture,
        IntentLabel::Compose,
    ];

    /// Label produced by a run of events of one modality.
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Gaze => IntentLabel::Attend,
            Modality::Touch | Modality::Pointer => IntentLabel::Select,
            Modality::Voice => IntentLabel::Speak,
            Modality::Gesture => IntentLabel::Gesture,
            Modality::Text => IntentLabel::Compose,
            Modality::Idle => IntentLabel::Idle,
        }
    }

    /// Whether the label marks a user action (not structure, not idle).
    pub fn is_action(self) -> bool {
        !matches!(
            self,
            IntentLabel::Session | IntentLabel::Segment | IntentLabel::Idle
        )
    }
}

/// Where and when a node happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFrame {
    /// Window index within the session
    pub window_index: u32,
    /// Start timestamp (ms)
    pub start_ms: u64,
    /// Covered duration (ms)
    pub duration_ms: u32,
    /// Number of events folded into the node
    pub event_count: u32,
}

/// Continuous affect estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectVector {
    /// Negative to positive (-1.0 - 1.0)
    pub valence: f32,
    /// Calm to urgent (0.0 - 1.0)
    pub arousal: f32,
    /// Tentative to assertive (0.0 - 1.0)
    pub dominance: f32,
}

impl AffectVector {
    /// Create a clamped affect vector.
    pub fn new(valence: f32, arousal: f32, dominance: f32) -> Self {
        Self {
            valence: valence.clamp(-1.0, 1.0),
            arousal: arousal.clamp(0.0, 1.0),
            dominance: dominance.clamp(0.0, 1.0),
        }
    }

    /// Neutral affect.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Estimate affect from a run of events.
    ///
    /// Valence is the mean of the first value channel, arousal the mean
    /// magnitude of the second, dominance the mean certainty.
    pub fn from_events(events: &[RawEvent]) -> Self {
        let active: Vec<&RawEvent> = events.iter().filter(|e| !e.modality().is_idle()).collect();
        if active.is_empty() {
            return Self::neutral();
        }
        let n = active.len() as f32;
        let valence = active
            .iter()
            .map(|e| e.values().first().copied().unwrap_or(0.0))
            .sum::<f32>()
            / n;
        let arousal = active
            .iter()
            .map(|e| e.values().get(1).map(|v| v.abs()).unwrap_or(0.0))
            .sum::<f32>()
            / n;
        let certainty = active.iter().map(|e| 1.0 - e.ambiguity()).sum::<f32>() / n;
        Self::new(valence, arousal, certainty)
    }

    /// Whether every component is finite and inside its range.
    pub fn in_range(&self) -> bool {
        (-1.0..=1.0).contains(&self.valence)
            && (0.0..=1.0).contains(&self.arousal)
            && (0.0..=1.0).contains(&self.dominance)
    }

    /// Component-wise comparison within `tolerance`.
    pub fn approx_eq(&self, other: &AffectVector, tolerance: f32) -> bool {
        (self.valence - other.valence).abs() <= tolerance
            && (self.arousal - other.arousal).abs() <= tolerance
            && (self.dominance - other.dominance).abs() <= tolerance
    }
}

/// A node in an intent tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentNode {
    /// Node id (index in the arena)
    pub id: u32,
    /// Parent id; `None` only for the root
    pub parent: Option<u32>,
    /// Intent label
    pub label: IntentLabel,
    /// Context frame
    pub context: ContextFrame,
    /// Affect vector
    pub affect: AffectVector,
    /// Ambiguity score (0.0 - 1.0)
    pub ambiguity: f32,
    /// Weight from event density and certainty (0.0 - 1.0)
    pub weight: f32,
    /// Resolution this node was built for
    pub resolution: Resolution,
}

/// Whether a tree was built within the ambiguity ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Nominal,
    /// Built despite an ambiguity overflow
    Degraded,
}

/// A weighted intent tree for one resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentTree {
    resolution: Resolution,
    confidence: Confidence,
    nodes: Vec<IntentNode>,
}

impl IntentTree {
    /// Start a tree with its root node.
    pub(crate) fn with_root(
        resolution: Resolution,
        context: ContextFrame,
        affect: AffectVector,
        ambiguity: f32,
    ) -> Self {
        Self {
            resolution,
            confidence: Confidence::Nominal,
            nodes: vec![IntentNode {
                id: 0,
                parent: None,
                label: IntentLabel::Session,
                context,
                affect,
                ambiguity: ambiguity.clamp(0.0, 1.0),
                weight: 1.0,
                resolution,
            }],
        }
    }

    /// Append a child node and return its id.
    pub(crate) fn push(
        &mut self,
        parent: u32,
        label: IntentLabel,
        context: ContextFrame,
        affect: AffectVector,
        ambiguity: f32,
        weight: f32,
    ) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(IntentNode {
            id,
            parent: Some(parent),
            label,
            context,
            affect,
            ambiguity: ambiguity.clamp(0.0, 1.0),
            weight: weight.clamp(0.0, 1.0),
            resolution: self.resolution,
        });
        id
    }

    /// Rebuild a tree from raw parts, checking that it is well formed.
    pub fn from_parts(
        resolution: Resolution,
        confidence: Confidence,
        nodes: Vec<IntentNode>,
    ) -> std::result::Result<Self, SymbolicError> {
        let tree = Self {
            resolution,
            confidence,
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Check the arena invariants and node value ranges.
    pub fn validate(&self) -> std::result::Result<(), SymbolicError> {
        let root = self
            .nodes
            .first()
            .ok_or_else(|| SymbolicError::MalformedTree("tree has no root".into()))?;
        if root.parent.is_some() {
            return Err(SymbolicError::MalformedTree("root has a parent".into()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id as usize != index {
                return Err(SymbolicError::MalformedTree(format!(
                    "node at {} has id {}",
                    index, node.id
                )));
            }
            if node.resolution != self.resolution {
                return Err(SymbolicError::MalformedTree(format!(
                    "node {} has resolution {}",
                    index, node.resolution
                )));
            }
            if !node.affect.in_range() {
                return Err(SymbolicError::MalformedTree(format!(
                    "node {} has affect out of range: {:?}",
                    index, node.affect
                )));
            }
            // NaN fails both range checks
            if !(0.0..=1.0).contains(&node.ambiguity) || !(0.0..=1.0).contains(&node.weight) {
                return Err(SymbolicError::MalformedTree(format!(
                    "node {} has ambiguity {} and weight {}",
                    index, node.ambiguity, node.weight
                )));
            }
            if index > 0 {
                match node.parent {
                    Some(parent) if (parent as usize) < index => {}
                    _ => {
                        return Err(SymbolicError::MalformedTree(format!(
                            "node {} has invalid parent {:?}",
                            index, node.parent
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Copy of this tree marked as degraded.
    pub fn degraded(&self) -> Self {
        Self {
            confidence: Confidence::Degraded,
            ..self.clone()
        }
    }

    pub fn root(&self) -> &IntentNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[IntentNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&IntentNode> {
        self.nodes.get(id as usize)
    }

    /// Direct children of a node, in id order.
    pub fn children(&self, id: u32) -> impl Iterator<Item = &IntentNode> {
        self.nodes.iter().filter(move |n| n.parent == Some(id))
    }

    /// Nodes that represent user actions.
    pub fn action_nodes(&self) -> impl Iterator<Item = &IntentNode> {
        self.nodes.iter().filter(|n| n.label.is_action())
    }

    /// Idle nodes (empty windows and idle gaps).
    pub fn idle_nodes(&self) -> impl Iterator<Item = &IntentNode> {
        self.nodes.iter().filter(|n| n.label == IntentLabel::Idle)
    }

    /// Highest ambiguity over the root and any window or action.
    pub fn peak_ambiguity(&self) -> f32 {
        self.nodes.iter().map(|n| n.ambiguity).fold(0.0, f32::max)
    }

    /// Highest arousal among action nodes.
    pub fn urgency(&self) -> f32 {
        self.action_nodes().map(|n| n.affect.arousal).fold(0.0, f32::max)
    }

    /// Whether arena order equals depth-first preorder.
    pub fn is_preorder(&self) -> bool {
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); self.nodes.len()];
        for node in self.nodes.iter().skip(1) {
            if let Some(parent) = node.parent {
                children[parent as usize].push(node.id);
            }
        }

        let mut expected = 0u32;
        let mut stack = vec![0u32];
        while let Some(id) = stack.pop() {
            if id != expected {
                return false;
            }
            expected += 1;
            for child in children[id as usize].iter().rev() {
                stack.push(*child);
            }
        }
        expected as usize == self.nodes.len()
    }

    /// Structural equality with affect compared within `tolerance`.
    pub fn approx_eq(&self, other: &IntentTree, tolerance: f32) -> bool {
        self.resolution == other.resolution
            && self.confidence == other.confidence
            && self.nodes.len() == other.nodes.len()
            && self.nodes.iter().zip(&other.nodes).all(|(a, b)| {
                a.id == b.id
                    && a.parent == b.parent
                    && a.label == b.label
                    && a.context == b.context
                    && a.ambiguity == b.ambiguity
                    && a.weight == b.weight
                    && a.resolution == b.resolution
                    && a.affect.approx_eq(&b.affect, tolerance)
            })
    }

    /// Serialize to binary for replay and audit.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tree: Self = bincode::deserialize(bytes)?;
        tree.validate()?;
        Ok(tree)
    }
}
