//! Tier Router
//!
//! Resolves delivery tier and targets for wire messages and drives each
//! envelope to a terminal state:
//! - Capability → target table with copy-on-write snapshots
//! - Unicast, multicast, broadcast-aggregate and bypass delivery
//! - Per-tier deadlines, lane backpressure and policy checks

pub mod envelope;
pub mod policy;
pub mod router;
pub mod table;
pub mod transport;

pub use envelope::{
    Addressing, DeliveryPattern, DeliveryStatus, EnvelopeState, IntentSignals, RouteRequest, RoutingEnvelope,
};
pub use policy::{AllowAll, PolicyDecision, PolicyHook, TierDenyList};
pub use router::{CancelOutcome, DeliveryReport, PendingDelivery, TierRouter};
pub use table::{Health, HealthFeed, SharedTargetTable, TargetDescriptor, TargetTable};
pub use transport::{Ack, DeliveryRecord, InMemoryTransport, TargetHandler, Transport, TransportError};
