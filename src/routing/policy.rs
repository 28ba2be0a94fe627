//! Security/policy hook consulted before dispatch.

use crate::core::Tier;
use crate::routing::envelope::RoutingEnvelope;
use std::collections::HashSet;

/// Verdict of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

/// Policy check; a `Deny` rejects the envelope before dispatch.
pub trait PolicyHook: Send + Sync {
    fn policy_check(&self, envelope: &RoutingEnvelope) -> PolicyDecision;
}

impl<F> PolicyHook for F
where
    F: Fn(&RoutingEnvelope) -> PolicyDecision + Send + Sync,
{
    fn policy_check(&self, envelope: &RoutingEnvelope) -> PolicyDecision {
        self(envelope)
    }
}

/// Allows everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl PolicyHook for AllowAll {
    fn policy_check(&self, _envelope: &RoutingEnvelope) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Denies delivery to a set of tiers.
#[derive(Clone, Debug, Default)]
pub struct TierDenyList {
    denied: HashSet<Tier>,
}

impl TierDenyList {
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Self {
        Self {
            denied: tiers.into_iter().collect(),
        }
    }
}

impl PolicyHook for TierDenyList {
    fn policy_check(&self, envelope: &RoutingEnvelope) -> PolicyDecision {
        if self.denied.contains(&envelope.tier()) {
            PolicyDecision::Deny(format!("tier {} is closed", envelope.tier()))
        } else {
            PolicyDecision::Allow
        }
    }
}
