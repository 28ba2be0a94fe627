//! Error types for Rasoom.

use crate::core::types::MessageId;
use crate::intent::builder::AmbiguityOverflow;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Rasoom operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Rasoom operations.
///
/// Every variant is scoped to a single message or session; none of them is
/// fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("{0}")]
    AmbiguityOverflow(Box<AmbiguityOverflow>),

    #[error("symbolic transform failed: {0}")]
    Symbolic(#[from] SymbolicError),

    #[error("encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AmbiguityOverflow> for Error {
    fn from(err: AmbiguityOverflow) -> Self {
        Error::AmbiguityOverflow(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

/// Ingest-side conditions. Logged and counted, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("sample at {timestamp_ms}ms arrived after the jitter window closed at {cutoff_ms}ms")]
    DroppedLate { timestamp_ms: u64, cutoff_ms: u64 },

    #[error("sample has an empty value vector")]
    EmptySample,
}

/// Failures of the symbolic transform chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolicError {
    #[error("series truncated: expected {expected} words, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("unknown series magic {0:#x}")]
    BadMagic(u64),

    #[error("series kind {0} is not an intent series")]
    WrongKind(u64),

    #[error("word {index} is not a valid symbol word: {word}")]
    InvalidWord { index: usize, word: u64 },

    #[error("symbol {0} not present in the symbol table")]
    UnknownSymbol(u8),

    #[error("symbol table mismatch: series uses table {found}, compressor has {expected}")]
    TableMismatch { expected: u8, found: u8 },

    #[error("token {token} redundancy classes disagree with its fields")]
    RedundancyMismatch { token: usize },

    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("tree of {nodes} nodes exceeds the {max} node limit")]
    TreeTooLarge { nodes: u64, max: usize },

    #[error("invalid routing metadata word {0:#x}")]
    InvalidRouting(u64),

    #[error("malformed control frame: {0}")]
    MalformedControl(String),
}

/// Failures while producing a wire frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("series routing metadata is invalid: {0}")]
    InvalidSeries(String),
}

/// Why a frame could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UncorrectableReason {
    /// Frame is shorter than the smallest valid frame
    Truncated,
    /// Frame length matches no FEC layout
    LengthMismatch,
    /// More corrupted symbols than the parity can repair
    TooManyErrors { codeword: usize },
    /// Parity repair succeeded but the checksum still disagrees
    ChecksumMismatch,
    /// Delta frame references a message this decoder never saw
    MissingReference(MessageId),
    /// Payload structure is invalid after repair
    MalformedPayload(String),
}

impl std::fmt::Display for UncorrectableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::LengthMismatch => write!(f, "frame length matches no FEC layout"),
            Self::TooManyErrors { codeword } => {
                write!(f, "codeword {} has more errors than parity can repair", codeword)
            }
            Self::ChecksumMismatch => write!(f, "checksum mismatch after repair"),
            Self::MissingReference(id) => write!(f, "missing delta reference {}", id),
            Self::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
        }
    }
}

/// Decode classification.
///
/// `Correctable` is informational: the frame decoded and the caller proceeds.
/// It is reported alongside the decoded series rather than returned as `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("corrected {corrected_symbols} symbols across {codewords} codewords")]
    Correctable {
        corrected_symbols: usize,
        codewords: usize,
    },

    #[error("uncorrectable frame: {reason}")]
    Uncorrectable { reason: UncorrectableReason },

    #[error("schema version {found} is not supported (expected {supported})")]
    SchemaMismatch { found: u8, supported: u8 },
}

impl DecodeError {
    pub(crate) fn uncorrectable(reason: UncorrectableReason) -> Self {
        DecodeError::Uncorrectable { reason }
    }

    /// Whether the sender should be asked to redeliver the message.
    pub fn requests_redelivery(&self) -> bool {
        matches!(self, DecodeError::Uncorrectable { .. })
    }
}

/// Why an envelope was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoEligibleTargets,
    PolicyDenied(String),
    /// Dispatch of an envelope that already reached a terminal state
    Duplicate,
    Cancelled,
    /// Never dispatched within its deadline
    Expired,
    /// Sequence not above the last one delivered to the same targets
    OutOfOrder { sequence: u32 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEligibleTargets => write!(f, "no eligible healthy targets"),
            Self::PolicyDenied(reason) => write!(f, "policy denied: {}", reason),
            Self::Duplicate => write!(f, "envelope already finished"),
            Self::Cancelled => write!(f, "cancelled before dispatch"),
            Self::Expired => write!(f, "deadline elapsed before dispatch"),
            Self::OutOfOrder { sequence } => write!(f, "sequence {} already superseded", sequence),
        }
    }
}

/// Routing failures surfaced to modern callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("envelope {envelope_id} rejected: {reason}")]
    Rejected { envelope_id: Uuid, reason: RejectReason },

    /// Quorum was not reached, either because the deadline elapsed or
    /// because too many targets refused after dispatch.
    #[error("envelope {envelope_id} timed out with {acknowledged}/{required} acknowledgements ({refused} refused)")]
    TimedOut {
        envelope_id: Uuid,
        acknowledged: usize,
        required: usize,
        refused: usize,
    },

    #[error("dispatch queue full ({pending}/{limit}), request rejected")]
    Backpressure { pending: usize, limit: usize },
}

impl RoutingError {
    /// Whether the caller should slow down before retrying.
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            RoutingError::TimedOut { .. } | RoutingError::Backpressure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_redelivery() {
        let err = DecodeError::uncorrectable(UncorrectableReason::ChecksumMismatch);
        assert!(err.requests_redelivery());
        let fixed = DecodeError::Correctable {
            corrected_symbols: 3,
            codewords: 1,
        };
        assert!(!fixed.requests_redelivery());
        let schema = DecodeError::SchemaMismatch {
            found: 9,
            supported: 1,
        };
        assert!(!schema.requests_redelivery());
    }

    #[test]
    fn test_routing_error_backpressure() {
        let timed_out = RoutingError::TimedOut {
            envelope_id: Uuid::new_v4(),
            acknowledged: 0,
            required: 1,
            refused: 0,
        };
        assert!(timed_out.is_backpressure());
        let rejected = RoutingError::Rejected {
            envelope_id: Uuid::new_v4(),
            reason: RejectReason::NoEligibleTargets,
        };
        assert!(!rejected.is_backpressure());
    }

    #[test]
    fn test_error_display() {
        let err: Error = DecodeError::SchemaMismatch {
            found: 7,
            supported: 1,
        }
        .into();
        assert!(err.to_string().contains("schema version 7"));
    }
}
