//! # Rasoom - intent encoding and tiered delivery
//!
//! Turns ambiguous multimodal interaction signals into compact, reversible,
//! error-resilient wire messages and routes them across consumer tiers:
//! - **Ingest**: jitter-window normalization with per-event ambiguity
//! - **Intent**: coarse, medium and atomic intent trees built concurrently
//! - **Symbolic**: reversible token and numeric-series encoding
//! - **Codec**: wire frames with delta coding, LZ4 and Reed–Solomon parity
//! - **Routing**: Strategic / Specialist / Worker delivery with deadlines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rasoom::core::{RasoomConfig, Tier};
//! use rasoom::ingest::{Modality, ModalitySample};
//! use rasoom::pipeline::Session;
//! use rasoom::routing::{InMemoryTransport, SharedTargetTable, TargetDescriptor, TierRouter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rasoom::Result<()> {
//!     let config = RasoomConfig::default();
//!     let table = Arc::new(SharedTargetTable::default());
//!     table.register(TargetDescriptor::new("worker-1", Tier::Worker));
//!     let transport = Arc::new(InMemoryTransport::new());
//!     let router = Arc::new(TierRouter::new(config.router.clone(), table, transport));
//!
//!     let mut session = Session::new(&config, router);
//!     let sent = session
//!         .transmit(vec![ModalitySample::new(Modality::Touch, 0, vec![0.2, 0.3], 0.9)], None)
//!         .await?;
//!     println!("sent {}", sent.encoded.message);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod core;
pub mod ingest;
pub mod intent;
pub mod legacy;
pub mod monitoring;
pub mod pipeline;
pub mod registry;
pub mod routing;
pub mod symbolic;

pub use core::error::{Error, Result};
