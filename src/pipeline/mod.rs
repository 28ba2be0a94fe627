//! End-to-end pipeline
//!
//! Wires normalizer, tree builder, compressor, codec and router into one
//! per-session facade.

pub mod session;

pub use session::{EncodedIntent, Inbound, OverflowPolicy, Session, Transmission};
