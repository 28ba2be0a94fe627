//! Routing envelopes and their delivery states.

use crate::codec::wire::WireMessage;
use crate::core::{now, RejectReason, Tier, TargetId, Timestamp};
use crate::intent::node::IntentTree;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How many targets receive a message and how many must acknowledge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryPattern {
    /// Best eligible target; one acknowledgement
    Unicast,
    /// Every eligible target; `quorum` acknowledgements. A quorum of 0
    /// takes the router's configured default.
    Multicast { quorum: usize },
    /// Every eligible target; a majority must acknowledge
    BroadcastAggregate,
    /// Best Strategic target on the bypass lane; no acknowledgement awaited
    Bypass,
}

impl DeliveryPattern {
    /// Acknowledgements needed when `targets` receive the message.
    pub fn required_acks(&self, targets: usize) -> usize {
        match self {
            DeliveryPattern::Unicast => targets.min(1),
            DeliveryPattern::Multicast { quorum } => (*quorum).clamp(1, targets.max(1)).min(targets),
            DeliveryPattern::BroadcastAggregate => {
                if targets == 0 {
                    0
                } else {
                    targets / 2 + 1
                }
            }
            DeliveryPattern::Bypass => 0,
        }
    }

    /// Whether all eligible targets receive the message.
    pub fn fans_out(&self) -> bool {
        matches!(
            self,
            DeliveryPattern::Multicast { .. } | DeliveryPattern::BroadcastAggregate
        )
    }
}

/// Who an envelope is addressed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// Explicit targets
    Targets(Vec<TargetId>),
    /// Every target advertising a capability
    Topic(String),
    /// Every target of the message tier
    Tier,
}

/// Lifecycle of an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeState {
    Resolving,
    Dispatched,
    Acknowledged,
    TimedOut,
    Rejected,
}

impl EnvelopeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnvelopeState::Acknowledged | EnvelopeState::TimedOut | EnvelopeState::Rejected
        )
    }

    /// Allowed transitions of the delivery state machine.
    pub fn can_transition_to(self, next: EnvelopeState) -> bool {
        matches!(
            (self, next),
            (EnvelopeState::Resolving, EnvelopeState::Dispatched)
                | (EnvelopeState::Resolving, EnvelopeState::Rejected)
                | (EnvelopeState::Dispatched, EnvelopeState::Acknowledged)
                | (EnvelopeState::Dispatched, EnvelopeState::TimedOut)
        )
    }
}

/// Terminal outcome retained after the envelope is dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Acknowledged { targets: Vec<TargetId> },
    TimedOut {
        acknowledged: usize,
        required: usize,
        refused: usize,
    },
    Rejected(RejectReason),
}

impl DeliveryStatus {
    pub fn state(&self) -> EnvelopeState {
        match self {
            DeliveryStatus::Acknowledged { .. } => EnvelopeState::Acknowledged,
            DeliveryStatus::TimedOut { .. } => EnvelopeState::TimedOut,
            DeliveryStatus::Rejected(_) => EnvelopeState::Rejected,
        }
    }
}

/// A wire message on its way to one or more targets.
#[derive(Clone, Debug)]
pub struct RoutingEnvelope {
    id: Uuid,
    message: Arc<WireMessage>,
    pattern: DeliveryPattern,
    addressing: Addressing,
    deadline: Duration,
    created_at: Timestamp,
}

impl RoutingEnvelope {
    pub(crate) fn new(
        message: Arc<WireMessage>,
        pattern: DeliveryPattern,
        addressing: Addressing,
        deadline: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            pattern,
            addressing,
            deadline,
            created_at: now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn message(&self) -> &Arc<WireMessage> {
        &self.message
    }

    pub fn pattern(&self) -> DeliveryPattern {
        self.pattern
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// Time allowed between dispatch and quorum.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn tier(&self) -> Tier {
        self.message.header().tier
    }
}

/// A request to route one message.
#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub message: Arc<WireMessage>,
    pub pattern: DeliveryPattern,
    pub addressing: Addressing,
    /// Overrides the tier budget
    pub deadline: Option<Duration>,
}

impl RouteRequest {
    /// Unicast to the best target of the message tier.
    pub fn to_tier(message: Arc<WireMessage>) -> Self {
        Self {
            message,
            pattern: DeliveryPattern::Unicast,
            addressing: Addressing::Tier,
            deadline: None,
        }
    }

    /// Unicast to one named target.
    pub fn to_target(message: Arc<WireMessage>, target: TargetId) -> Self {
        Self {
            message,
            pattern: DeliveryPattern::Unicast,
            addressing: Addressing::Targets(vec![target]),
            deadline: None,
        }
    }

    /// Deliver to every target subscribed to `topic`.
    pub fn to_topic(message: Arc<WireMessage>, topic: impl Into<String>, pattern: DeliveryPattern) -> Self {
        Self {
            message,
            pattern,
            addressing: Addressing::Topic(topic.into()),
            deadline: None,
        }
    }

    pub fn with_pattern(mut self, pattern: DeliveryPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Affect and ambiguity markers the router bases tier decisions on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentSignals {
    /// Highest ambiguity anywhere in the tree (0.0 - 1.0)
    pub ambiguity: f32,
    /// Highest arousal among actions (0.0 - 1.0)
    pub urgency: f32,
    /// Overall certainty (0.0 - 1.0)
    pub confidence: f32,
}

impl IntentSignals {
    pub fn from_tree(tree: &IntentTree) -> Self {
        Self {
            ambiguity: tree.peak_ambiguity(),
            urgency: tree.urgency(),
            confidence: 1.0 - tree.root().ambiguity,
        }
    }

    /// Signals for traffic that does not originate from an intent tree.
    pub fn neutral() -> Self {
        Self {
            ambiguity: 0.0,
            urgency: 0.0,
            confidence: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_acks() {
        assert_eq!(DeliveryPattern::Unicast.required_acks(3), 1);
        assert_eq!(DeliveryPattern::Unicast.required_acks(0), 0);
        assert_eq!(DeliveryPattern::Multicast { quorum: 2 }.required_acks(5), 2);
        assert_eq!(DeliveryPattern::Multicast { quorum: 4 }.required_acks(3), 3);
        assert_eq!(DeliveryPattern::Multicast { quorum: 0 }.required_acks(3), 1);
        assert_eq!(DeliveryPattern::BroadcastAggregate.required_acks(4), 3);
        assert_eq!(DeliveryPattern::BroadcastAggregate.required_acks(5), 3);
        assert_eq!(DeliveryPattern::Bypass.required_acks(1), 0);
    }

    #[test]
    fn test_state_machine() {
        use EnvelopeState::*;
        assert!(Resolving.can_transition_to(Dispatched));
        assert!(Resolving.can_transition_to(Rejected));
        assert!(!Resolving.can_transition_to(Acknowledged));
        assert!(Dispatched.can_transition_to(TimedOut));
        assert!(!Dispatched.can_transition_to(Rejected));
        assert!(!Dispatched.can_transition_to(Resolving));
        assert!(!Acknowledged.can_transition_to(Rejected));
        assert!(TimedOut.is_terminal());
        assert!(!Dispatched.is_terminal());
    }

    #[test]
    fn test_status_state() {
        let status = DeliveryStatus::Rejected(RejectReason::NoEligibleTargets);
        assert_eq!(status.state(), EnvelopeState::Rejected);
    }
}
