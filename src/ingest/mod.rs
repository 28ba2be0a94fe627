//! Event ingest
//!
//! Turns raw multimodal samples into a synchronized, timestamp-ordered
//! event stream with per-event ambiguity scores.

pub mod ambiguity;
pub mod event;
pub mod normalizer;

pub use ambiguity::{AgreementScorer, AmbiguityScorer, ConfidenceScorer};
pub use event::{EventStream, Modality, ModalitySample, RawEvent};
pub use normalizer::EventNormalizer;
