//! Common types used across Rasoom modules.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Timestamp wrapper for consistent serialization.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Get current UTC timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Identifier of an encoded wire message, used as the delta-reference id.
///
/// Derived from the first eight bytes of the SHA3-256 digest of the
/// FEC-protected frame content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Derive a message id from frame bytes.
    pub fn digest(bytes: &[u8]) -> Self {
        let hash = Sha3_256::digest(bytes);
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&hash[..8]);
        Self(u64::from_be_bytes(arr))
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Capture session identifier. Ordering guarantees are scoped to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Create a random session id.
    pub fn random() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let bytes = uuid.as_bytes();
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&bytes[..8]);
        Self(u64::from_be_bytes(arr))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{:016x}", self.0)
    }
}

/// Identifier of a delivery target (an agent or service endpoint).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    /// Create a target id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Logical layer of message consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Coordination layer with the widest authority and latency budget
    Strategic,
    /// Domain specialists
    Specialist,
    /// Local, lowest-latency executors
    Worker,
}

impl Tier {
    /// Wire code carried in the `tier_target` header field.
    pub fn code(self) -> u16 {
        match self {
            Tier::Strategic => 1,
            Tier::Specialist => 2,
            Tier::Worker => 3,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Tier::Strategic),
            2 => Some(Tier::Specialist),
            3 => Some(Tier::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Strategic => write!(f, "strategic"),
            Tier::Specialist => write!(f, "specialist"),
            Tier::Worker => write!(f, "worker"),
        }
    }
}

/// Priority class carried in the header and the series routing metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityClass {
    Background = 0,
    Normal = 1,
    Urgent = 2,
    /// Consumed by the dedicated low-latency bypass lane
    Bypass = 3,
}

impl PriorityClass {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PriorityClass::Background),
            1 => Some(PriorityClass::Normal),
            2 => Some(PriorityClass::Urgent),
            3 => Some(PriorityClass::Bypass),
            _ => None,
        }
    }
}

impl Default for PriorityClass {
    fn default() -> Self {
        Self::Normal
    }
}

/// Target resolution of an intent tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    Coarse,
    Medium,
    Atomic,
}

impl Resolution {
    /// All resolutions, coarse first.
    pub const ALL: [Resolution; 3] = [Resolution::Coarse, Resolution::Medium, Resolution::Atomic];

    /// Numeric code used in packed series.
    pub fn code(self) -> u8 {
        match self {
            Resolution::Coarse => 0,
            Resolution::Medium => 1,
            Resolution::Atomic => 2,
        }
    }

    /// Parse a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Resolution::Coarse),
            1 => Some(Resolution::Medium),
            2 => Some(Resolution::Atomic),
            _ => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Coarse => write!(f, "coarse"),
            Resolution::Medium => write!(f, "medium"),
            Resolution::Atomic => write!(f, "atomic"),
        }
    }
}

/// Routing metadata embedded in a numeric series and mirrored in the wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingMetadata {
    /// Target tier
    pub tier: Tier,
    /// Priority class
    pub priority: PriorityClass,
}

impl Default for RoutingMetadata {
    fn default() -> Self {
        Self {
            tier: Tier::Worker,
            priority: PriorityClass::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_is_stable() {
        let a = MessageId::digest(b"frame");
        let b = MessageId::digest(b"frame");
        assert_eq!(a, b);
        assert_ne!(a, MessageId::digest(b"other"));
        assert_eq!(a.to_hex().len(), 16);
    }

    #[test]
    fn test_tier_codes() {
        for tier in [Tier::Strategic, Tier::Specialist, Tier::Worker] {
            assert_eq!(Tier::from_code(tier.code()), Some(tier));
        }
        assert_eq!(Tier::from_code(0), None);
    }

    #[test]
    fn test_priority_codes() {
        assert_eq!(PriorityClass::from_code(3), Some(PriorityClass::Bypass));
        assert_eq!(PriorityClass::from_code(9), None);
        assert!(PriorityClass::Bypass > PriorityClass::Normal);
    }

    #[test]
    fn test_resolution_codes() {
        for res in Resolution::ALL {
            assert_eq!(Resolution::from_code(res.code()), Some(res));
        }
    }
}
