//! Capability → target table.
//!
//! Targets live in an arena with id, tier and capability indexes. The table
//! is never mutated in place: every update builds a new table and swaps the
//! shared `Arc`, so readers keep a consistent snapshot for a whole dispatch.

use crate::core::{Tier, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Reported target health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Health {
    Healthy,
    /// Eligible, ranked after healthy targets
    Degraded,
    Down,
}

/// Live health source, consulted over the table's own health field.
pub trait HealthFeed: Send + Sync {
    fn health(&self, target: &TargetId) -> Option<Health>;
}

/// A delivery target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub tier: Tier,
    /// Topics / capabilities served
    pub capabilities: Vec<String>,
    /// Preference score (0.0 - 1.0)
    pub score: f32,
    /// Load factor (0.0 = idle, 1.0 = fully loaded)
    pub load: f32,
    pub health: Health,
}

impl TargetDescriptor {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: TargetId::new(id),
            tier,
            capabilities: Vec::new(),
            score: 1.0,
            load: 0.0,
            health: Health::Healthy,
        }
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score.clamp(0.0, 1.0);
        self
    }

    pub fn with_health(mut self, health: Health) -> Self {
        self.health = health;
        self
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Ranking score: preference scaled by spare capacity.
    pub fn rank(&self, health: Health) -> f32 {
        let health_factor = match health {
            Health::Healthy => 1.0,
            Health::Degraded => 0.5,
            Health::Down => 0.0,
        };
        self.score * (1.0 - self.load) * health_factor
    }
}

/// Immutable snapshot of all targets.
#[derive(Clone, Debug, Default)]
pub struct TargetTable {
    arena: Vec<TargetDescriptor>,
    by_id: HashMap<TargetId, usize>,
    by_tier: HashMap<Tier, Vec<usize>>,
    by_capability: HashMap<String, Vec<usize>>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_targets(targets: Vec<TargetDescriptor>) -> Self {
        let mut table = Self {
            arena: targets,
            ..Self::default()
        };
        for (index, target) in table.arena.iter().enumerate() {
            table.by_id.insert(target.id.clone(), index);
            table.by_tier.entry(target.tier).or_default().push(index);
            for capability in &target.capabilities {
                table.by_capability.entry(capability.clone()).or_default().push(index);
            }
        }
        table
    }

    /// New table with `target` added or replaced.
    pub fn with_target(&self, target: TargetDescriptor) -> Self {
        let mut targets = self.arena.clone();
        match self.by_id.get(&target.id) {
            Some(index) => targets[*index] = target,
            None => targets.push(target),
        }
        Self::from_targets(targets)
    }

    /// New table without `id`.
    pub fn without_target(&self, id: &TargetId) -> Self {
        Self::from_targets(self.arena.iter().filter(|t| &t.id != id).cloned().collect())
    }

    /// New table with one target modified.
    pub fn with_updated(&self, id: &TargetId, update: impl FnOnce(&mut TargetDescriptor)) -> Self {
        let mut targets = self.arena.clone();
        if let Some(index) = self.by_id.get(id) {
            update(&mut targets[*index]);
        }
        Self::from_targets(targets)
    }

    pub fn get(&self, id: &TargetId) -> Option<&TargetDescriptor> {
        self.by_id.get(id).map(|i| &self.arena[*i])
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.arena
    }

    pub fn for_tier(&self, tier: Tier) -> impl Iterator<Item = &TargetDescriptor> {
        self.by_tier
            .get(&tier)
            .into_iter()
            .flatten()
            .map(move |i| &self.arena[*i])
    }

    pub fn for_capability(&self, capability: &str) -> impl Iterator<Item = &TargetDescriptor> {
        self.by_capability
            .get(capability)
            .into_iter()
            .flatten()
            .map(move |i| &self.arena[*i])
    }

    /// Targets in `tier` that are not down, best ranked first.
    ///
    /// `capability` narrows to a topic; `named` narrows to explicit ids.
    pub fn eligible(
        &self,
        tier: Tier,
        capability: Option<&str>,
        named: Option<&[TargetId]>,
        feed: Option<&dyn HealthFeed>,
    ) -> Vec<&TargetDescriptor> {
        let mut ranked: Vec<(&TargetDescriptor, f32)> = self
            .for_tier(tier)
            .filter(|t| capability.map_or(true, |c| t.supports(c)))
            .filter(|t| named.map_or(true, |ids| ids.contains(&t.id)))
            .filter_map(|t| {
                let health = feed.and_then(|f| f.health(&t.id)).unwrap_or(t.health);
                (health != Health::Down).then(|| (t, t.rank(health)))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().map(|(t, _)| t).collect()
    }
}

/// Copy-on-write handle to the current target table.
#[derive(Debug, Default)]
pub struct SharedTargetTable {
    current: RwLock<Arc<TargetTable>>,
}

impl SharedTargetTable {
    pub fn new(table: TargetTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Current snapshot; unaffected by later updates.
    pub fn snapshot(&self) -> Arc<TargetTable> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the table with `update(current)`.
    pub fn update(&self, update: impl FnOnce(&TargetTable) -> TargetTable) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = update(&guard);
        *guard = Arc::new(next);
    }

    pub fn register(&self, target: TargetDescriptor) {
        self.update(|t| t.with_target(target));
    }

    pub fn unregister(&self, id: &TargetId) {
        self.update(|t| t.without_target(id));
    }

    pub fn set_health(&self, id: &TargetId, health: Health) {
        self.update(|t| t.with_updated(id, |d| d.health = health));
    }

    pub fn set_load(&self, id: &TargetId, load: f32) {
        self.update(|t| t.with_updated(id, |d| d.load = load.clamp(0.0, 1.0)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TargetTable {
        TargetTable::new()
            .with_target(TargetDescriptor::new("w1", Tier::Worker).with_capability("touch"))
            .with_target(
                TargetDescriptor::new("w2", Tier::Worker)
                    .with_capability("touch")
                    .with_score(0.5),
            )
            .with_target(TargetDescriptor::new("s1", Tier::Strategic))
    }

    #[test]
    fn test_indexes() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.for_tier(Tier::Worker).count(), 2);
        assert_eq!(table.for_capability("touch").count(), 2);
        assert_eq!(table.get(&TargetId::from("s1")).map(|t| t.tier), Some(Tier::Strategic));
    }

    #[test]
    fn test_eligible_ranked_and_filtered() {
        let table = table();
        let ids: Vec<&str> = table
            .eligible(Tier::Worker, Some("touch"), None, None)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["w1", "w2"]);

        let down = table.with_updated(&TargetId::from("w1"), |t| t.health = Health::Down);
        let ids: Vec<&str> = down
            .eligible(Tier::Worker, None, None, None)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["w2"]);

        let named = [TargetId::from("w2")];
        assert_eq!(table.eligible(Tier::Worker, None, Some(&named), None).len(), 1);
        assert!(table.eligible(Tier::Specialist, None, None, None).is_empty());
    }

    struct AllDown;

    impl HealthFeed for AllDown {
        fn health(&self, _target: &TargetId) -> Option<Health> {
            Some(Health::Down)
        }
    }

    #[test]
    fn test_health_feed_overrides_table() {
        let table = table();
        assert!(table.eligible(Tier::Worker, None, None, Some(&AllDown)).is_empty());
    }

    #[test]
    fn test_snapshots_are_copy_on_write() {
        let shared = SharedTargetTable::new(table());
        let before = shared.snapshot();
        shared.unregister(&TargetId::from("w1"));
        shared.register(TargetDescriptor::new("p1", Tier::Specialist));

        assert_eq!(before.len(), 3);
        let after = shared.snapshot();
        assert_eq!(after.len(), 3);
        assert!(after.get(&TargetId::from("w1")).is_none());
        assert!(after.get(&TargetId::from("p1")).is_some());
    }

    #[test]
    fn test_load_lowers_rank() {
        let shared = SharedTargetTable::new(table());
        shared.set_load(&TargetId::from("w1"), 0.9);
        let snapshot = shared.snapshot();
        let best = snapshot.eligible(Tier::Worker, None, None, None);
        assert_eq!(best[0].id.as_str(), "w2");
    }
}
