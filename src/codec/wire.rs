//! Wire message layout.
//!
//! ```text
//! [u8 schema_version][u8 policy_flags][u16 tier_target][u8 priority][u32 payload_len]
//! [payload][FEC parity block][u32 crc]
//! ```
//!
//! All integers are big-endian. The payload starts with a prelude:
//! `[u8 body_format][u64 session][u32 sequence][u64 reference_id if delta][body]`.

use crate::core::{MessageId, PriorityClass, RoutingMetadata, SessionId, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Current wire schema version.
pub const SCHEMA_VERSION: u8 = 1;
/// Fixed header size.
pub const HEADER_LEN: usize = 9;
/// Trailing checksum size.
pub const CRC_LEN: usize = 4;

/// Per-message policy bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyFlags(u8);

impl PolicyFlags {
    /// Body is delta-coded against a reference message
    pub const DELTA: PolicyFlags = PolicyFlags(0x01);
    /// Body is LZ4-compressed
    pub const COMPRESSED: PolicyFlags = PolicyFlags(0x02);
    /// Sender expects acknowledgements
    pub const REQUIRES_ACK: PolicyFlags = PolicyFlags(0x04);
    /// Originating intent was built with degraded confidence
    pub const AMBIGUOUS: PolicyFlags = PolicyFlags(0x08);
    /// Travels on the priority bypass lane
    pub const BYPASS: PolicyFlags = PolicyFlags(0x10);

    pub const fn empty() -> Self {
        PolicyFlags(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        PolicyFlags(bits)
    }

    pub const fn contains(self, other: PolicyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PolicyFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: PolicyFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for PolicyFlags {
    type Output = PolicyFlags;

    fn bitor(self, rhs: PolicyFlags) -> PolicyFlags {
        PolicyFlags(self.0 | rhs.0)
    }
}

/// Body format byte at the start of the payload prelude.
pub mod body_format {
    pub const DELTA: u8 = 0x01;
    pub const LZ4: u8 = 0x02;
}

/// Fixed-size frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireHeader {
    pub schema_version: u8,
    pub flags: PolicyFlags,
    pub tier: Tier,
    pub priority: PriorityClass,
    pub payload_len: u32,
}

impl WireHeader {
    pub fn routing(&self) -> RoutingMetadata {
        RoutingMetadata {
            tier: self.tier,
            priority: self.priority,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.schema_version;
        out[1] = self.flags.bits();
        out[2..4].copy_from_slice(&self.tier.code().to_be_bytes());
        out[4] = self.priority.code();
        out[5..9].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }

    /// Parse header fields. `None` when tier or priority codes are unknown.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self {
            schema_version: bytes[0],
            flags: PolicyFlags::from_bits(bytes[1]),
            tier: Tier::from_code(u16::from_be_bytes([bytes[2], bytes[3]]))?,
            priority: PriorityClass::from_code(bytes[4])?,
            payload_len: u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        })
    }
}

/// An encoded, FEC-protected message. Immutable after encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireMessage {
    header: WireHeader,
    session: SessionId,
    sequence: u32,
    reference: Option<MessageId>,
    id: MessageId,
    frame: Arc<[u8]>,
}

impl WireMessage {
    pub(crate) fn new(
        header: WireHeader,
        session: SessionId,
        sequence: u32,
        reference: Option<MessageId>,
        id: MessageId,
        frame: Vec<u8>,
    ) -> Self {
        Self {
            header,
            session,
            sequence,
            reference,
            id,
            frame: frame.into(),
        }
    }

    pub fn header(&self) -> &WireHeader {
        &self.header
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Per-session sequence number.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Message this one is delta-coded against.
    pub fn reference(&self) -> Option<MessageId> {
        self.reference
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Complete frame as sent on the wire.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Shared handle to the frame bytes.
    pub fn frame_shared(&self) -> Arc<[u8]> {
        Arc::clone(&self.frame)
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn is_delta(&self) -> bool {
        self.header.flags.contains(PolicyFlags::DELTA)
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}#{} {}B tier={}",
            self.id,
            self.session,
            self.sequence,
            self.frame.len(),
            self.header.tier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = WireHeader {
            schema_version: SCHEMA_VERSION,
            flags: PolicyFlags::DELTA | PolicyFlags::BYPASS,
            tier: Tier::Strategic,
            priority: PriorityClass::Bypass,
            payload_len: 0x0102_0304,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes, [1, 0x11, 0, 1, 3, 1, 2, 3, 4]);
        assert_eq!(WireHeader::parse(&bytes), Some(header));
    }

    #[test]
    fn test_header_rejects_unknown_tier() {
        let bytes = [1, 0, 0, 9, 1, 0, 0, 0, 0];
        assert_eq!(WireHeader::parse(&bytes), None);
        assert_eq!(WireHeader::parse(&bytes[..4]), None);
    }

    #[test]
    fn test_policy_flags() {
        let mut flags = PolicyFlags::REQUIRES_ACK;
        flags.insert(PolicyFlags::AMBIGUOUS);
        assert!(flags.contains(PolicyFlags::AMBIGUOUS));
        flags.remove(PolicyFlags::REQUIRES_ACK);
        assert_eq!(flags.bits(), 0x08);
    }
}
