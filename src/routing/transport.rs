//! Transport seam between the router and the targets.

use crate::codec::wire::WireMessage;
use crate::core::{SessionId, TargetId};
use crate::routing::envelope::RoutingEnvelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Acknowledgement from one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub target: TargetId,
    /// Result payload, if the target produced one
    pub payload: Option<Vec<u8>>,
}

/// Per-target delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("target {0} is not reachable")]
    Unreachable(TargetId),

    #[error("target {target} refused: {reason}")]
    Refused { target: TargetId, reason: String },
}

/// Delivers envelopes to individual targets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver and wait for the target's acknowledgement.
    async fn deliver(&self, target: &TargetId, envelope: &RoutingEnvelope) -> Result<Ack, TransportError>;

    /// Ask a target to abandon an envelope it may already be working on.
    async fn cancel(&self, target: &TargetId, envelope_id: Uuid);
}

/// Message handler behind an in-memory endpoint.
pub trait TargetHandler: Send + Sync {
    fn handle(&self, message: &WireMessage) -> Result<Option<Vec<u8>>, String>;
}

impl<F> TargetHandler for F
where
    F: Fn(&WireMessage) -> Result<Option<Vec<u8>>, String> + Send + Sync,
{
    fn handle(&self, message: &WireMessage) -> Result<Option<Vec<u8>>, String> {
        self(message)
    }
}

/// One delivered message, as seen by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub target: TargetId,
    pub envelope_id: Uuid,
    pub session: SessionId,
    pub sequence: u32,
}

#[derive(Clone)]
struct Endpoint {
    handler: Arc<dyn TargetHandler>,
    latency: Duration,
}

/// In-process transport for local targets and tests.
#[derive(Default)]
pub struct InMemoryTransport {
    endpoints: RwLock<HashMap<TargetId, Endpoint>>,
    deliveries: Mutex<Vec<DeliveryRecord>>,
    cancellations: Mutex<Vec<(TargetId, Uuid)>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler that answers immediately.
    pub fn attach(&self, target: impl Into<String>, handler: impl TargetHandler + 'static) {
        self.attach_with_latency(target, handler, Duration::ZERO);
    }

    /// Attach a handler that answers after `latency`.
    pub fn attach_with_latency(
        &self,
        target: impl Into<String>,
        handler: impl TargetHandler + 'static,
        latency: Duration,
    ) {
        let endpoint = Endpoint {
            handler: Arc::new(handler),
            latency,
        };
        self.endpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(TargetId::new(target), endpoint);
    }

    pub fn detach(&self, target: &TargetId) {
        self.endpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(target);
    }

    /// Everything delivered so far, in arrival order.
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Cancel requests received so far.
    pub fn cancellations(&self) -> Vec<(TargetId, Uuid)> {
        self.cancellations.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn endpoint(&self, target: &TargetId) -> Option<Endpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(target)
            .cloned()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn deliver(&self, target: &TargetId, envelope: &RoutingEnvelope) -> Result<Ack, TransportError> {
        let endpoint = self
            .endpoint(target)
            .ok_or_else(|| TransportError::Unreachable(target.clone()))?;

        if !endpoint.latency.is_zero() {
            tokio::time::sleep(endpoint.latency).await;
        }

        let message = envelope.message();
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DeliveryRecord {
                target: target.clone(),
                envelope_id: envelope.id(),
                session: message.session(),
                sequence: message.sequence(),
            });

        let payload = endpoint
            .handler
            .handle(message)
            .map_err(|reason| TransportError::Refused {
                target: target.clone(),
                reason,
            })?;

        Ok(Ack {
            target: target.clone(),
            payload,
        })
    }

    async fn cancel(&self, target: &TargetId, envelope_id: Uuid) {
        self.cancellations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((target.clone(), envelope_id));
    }
}
