//! Protocol configuration.
//!
//! Every stage has its own section with defaults; the whole document can be
//! loaded from JSON.

use crate::core::{Error, Result, Tier};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RasoomConfig {
    /// Event normalizer settings
    pub normalizer: NormalizerConfig,
    /// Intent tree builder settings
    pub tree: TreeConfig,
    /// Binary codec settings
    pub codec: CodecConfig,
    /// Tier router settings
    pub router: RouterConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl RasoomConfig {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        check_unit("tree.ambiguity_ceiling", self.tree.ambiguity_ceiling)?;
        check_unit("codec.delta_similarity", self.codec.delta_similarity)?;
        check_unit("router.ambiguity_threshold", self.router.ambiguity_threshold)?;
        check_unit("router.urgency_threshold", self.router.urgency_threshold)?;
        check_unit("router.confidence_threshold", self.router.confidence_threshold)?;
        if self.tree.coarse_window_ms == 0
            || self.tree.medium_window_ms == 0
            || self.tree.atomic_window_ms == 0
        {
            return Err(Error::Config("tree windows must be non-zero".into()));
        }
        if self.router.max_pending == 0 || self.router.bypass_lane_capacity == 0 {
            return Err(Error::Config("router lanes need capacity".into()));
        }
        if self.router.multicast_quorum == 0 {
            return Err(Error::Config("router.multicast_quorum must be > 0".into()));
        }
        if self.router.max_tracked_sequences == 0 {
            return Err(Error::Config("router.max_tracked_sequences must be > 0".into()));
        }
        if self.codec.reference_cache_capacity == 0 {
            return Err(Error::Config("codec.reference_cache_capacity must be > 0".into()));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

/// Event normalizer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Out-of-order tolerance in milliseconds
    pub jitter_window_ms: u64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { jitter_window_ms: 50 }
    }
}

/// Intent tree builder configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Coarse window size (ms)
    pub coarse_window_ms: u64,
    /// Medium window size (ms)
    pub medium_window_ms: u64,
    /// Atomic window size (ms)
    pub atomic_window_ms: u64,
    /// Aggregate window ambiguity above which the builder signals overflow
    pub ambiguity_ceiling: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            coarse_window_ms: 2_000,
            medium_window_ms: 500,
            atomic_window_ms: 100,
            ambiguity_ceiling: 0.85,
        }
    }
}

/// Binary codec configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Minimum word similarity to the prior message before delta encoding
    pub delta_similarity: f32,
    /// How many decoded messages a session decoder keeps for delta references
    pub reference_cache_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            delta_similarity: 0.5,
            reference_cache_capacity: 16,
        }
    }
}

/// Per-tier latency budgets used as default envelope deadlines.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBudgets {
    pub strategic_ms: u64,
    pub specialist_ms: u64,
    pub worker_ms: u64,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            strategic_ms: 1_000,
            specialist_ms: 250,
            worker_ms: 50,
        }
    }
}

impl TierBudgets {
    /// Deadline budget for a tier.
    pub fn for_tier(&self, tier: Tier) -> Duration {
        let ms = match tier {
            Tier::Strategic => self.strategic_ms,
            Tier::Specialist => self.specialist_ms,
            Tier::Worker => self.worker_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Tier router configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Tree ambiguity above which routing stays on the Worker tier
    pub ambiguity_threshold: f32,
    /// Urgency marker required for priority bypass
    pub urgency_threshold: f32,
    /// Confidence marker required for priority bypass
    pub confidence_threshold: f32,
    /// Pending-dispatch depth before fail-fast rejection
    pub max_pending: usize,
    /// Capacity of the dedicated bypass lane
    pub bypass_lane_capacity: usize,
    /// Default multicast quorum
    pub multicast_quorum: usize,
    /// Terminal statuses retained for `delivery_status` queries
    pub status_retention: usize,
    /// (session, target) sequence entries kept before idle ones are evicted
    pub max_tracked_sequences: usize,
    /// Idle time after which a (session, target) sequence entry may be evicted
    pub sequence_idle_ttl_ms: u64,
    /// Idle time after which a per-target delivery worker stops
    pub worker_idle_ms: u64,
    /// Per-tier deadline budgets
    pub budgets: TierBudgets,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ambiguity_threshold: 0.6,
            urgency_threshold: 0.8,
            confidence_threshold: 0.7,
            max_pending: 1_024,
            bypass_lane_capacity: 64,
            multicast_quorum: 2,
            status_retention: 4_096,
            max_tracked_sequences: 65_536,
            sequence_idle_ttl_ms: 300_000,
            worker_idle_ms: 30_000,
            budgets: TierBudgets::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `rasoom=debug`
    pub filter: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RasoomConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.normalizer.jitter_window_ms, 50);
        assert_eq!(config.tree.ambiguity_ceiling, 0.85);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RasoomConfig::from_json(r#"{"router": {"max_pending": 8}}"#).unwrap();
        assert_eq!(config.router.max_pending, 8);
        assert_eq!(config.router.budgets.worker_ms, 50);
        assert_eq!(config.tree.medium_window_ms, 500);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = RasoomConfig::from_json(r#"{"tree": {"ambiguity_ceiling": 1.5}}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = RasoomConfig::default();
        let json = config.to_json().unwrap();
        let parsed = RasoomConfig::from_json(&json).unwrap();
        assert_eq!(parsed.codec.reference_cache_capacity, 16);
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let result = RasoomConfig::from_json(r#"{"router": {"multicast_quorum": 0}}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_tier_budgets() {
        let budgets = TierBudgets::default();
        assert!(budgets.for_tier(Tier::Worker) < budgets.for_tier(Tier::Strategic));
    }
}
