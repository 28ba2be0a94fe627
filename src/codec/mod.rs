//! Binary codec
//!
//! Numeric series become immutable wire messages: varint body, optional
//! delta coding and LZ4, CRC32 and interleaved Reed–Solomon parity.

pub mod binary;
pub mod fec;
pub mod rs;
pub mod wire;

pub use binary::{
    BinaryCodec, DecodedMessage, MessageStamp, Reference, ReferenceCache, SessionDecoder, SessionEncoder,
    MAX_PAYLOAD,
};
pub use fec::{Bucket, FecLayout};
pub use wire::{PolicyFlags, WireHeader, WireMessage, SCHEMA_VERSION};
