//! Legacy Adapter
//!
//! Flat, non-tiered commands translated into router inputs with legacy
//! response and error semantics.

pub mod adapter;

pub use adapter::{codes, LegacyAdapter, LegacyCommand, LegacyError, LegacyPayload, LegacyResponse};
