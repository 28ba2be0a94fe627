//! Core utilities and common types for Rasoom.

pub mod config;
pub mod error;
pub mod types;

pub use config::RasoomConfig;
pub use error::{
    CodecError, DecodeError, Error, IngestError, RejectReason, Result, RoutingError,
    SymbolicError, UncorrectableReason,
};
pub use types::*;
