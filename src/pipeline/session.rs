//! Per-session protocol facade.
//!
//! A [`Session`] owns the stateful stages of one capture session (jitter
//! buffer, sequence numbering, delta references) and shares the router with
//! every other session.

use crate::codec::{BinaryCodec, DecodedMessage, PolicyFlags, SessionDecoder, SessionEncoder, WireMessage};
use crate::core::{Error, PriorityClass, RasoomConfig, Resolution, Result, RoutingMetadata, SessionId, Tier};
use crate::ingest::{EventNormalizer, EventStream, ModalitySample};
use crate::intent::{Confidence, IntentTree, TreeBuilder, TreeSet};
use crate::routing::{DeliveryPattern, DeliveryReport, IntentSignals, RouteRequest, TierRouter};
use crate::symbolic::{ControlFrame, SeriesKind, SymbolicCompressor};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do when a window's ambiguity exceeds the ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Return the overflow so the caller can ask for clarification
    #[default]
    Reject,
    /// Continue with trees marked degraded
    ProceedDegraded,
}

/// An encoded intent ready for routing.
#[derive(Clone, Debug)]
pub struct EncodedIntent {
    pub signals: IntentSignals,
    pub routing: RoutingMetadata,
    pub message: Arc<WireMessage>,
}

/// Outcome of [`Session::transmit`].
#[derive(Clone, Debug)]
pub struct Transmission {
    pub trees: TreeSet,
    pub encoded: EncodedIntent,
    pub report: DeliveryReport,
}

/// A decoded inbound message.
#[derive(Clone, Debug)]
pub enum Inbound {
    Intent { tree: IntentTree, decoded: DecodedMessage },
    Control { frame: ControlFrame, decoded: DecodedMessage },
}

impl Inbound {
    pub fn decoded(&self) -> &DecodedMessage {
        match self {
            Inbound::Intent { decoded, .. } | Inbound::Control { decoded, .. } => decoded,
        }
    }
}

/// Ingest → build → compress → encode → route for one capture session.
pub struct Session {
    id: SessionId,
    normalizer: EventNormalizer,
    builder: TreeBuilder,
    compressor: SymbolicCompressor,
    encoder: SessionEncoder,
    decoder: SessionDecoder,
    router: Arc<TierRouter>,
    resolution: Resolution,
    overflow_policy: OverflowPolicy,
}

impl Session {
    pub fn new(config: &RasoomConfig, router: Arc<TierRouter>) -> Self {
        Self::with_id(config, router, SessionId::random())
    }

    pub fn with_id(config: &RasoomConfig, router: Arc<TierRouter>, id: SessionId) -> Self {
        let metrics = Arc::clone(router.metrics());
        let codec = BinaryCodec::new(config.codec.clone()).with_metrics(Arc::clone(&metrics));
        Self {
            id,
            normalizer: EventNormalizer::new(&config.normalizer).with_metrics(Arc::clone(&metrics)),
            builder: TreeBuilder::new(config.tree.clone()).with_metrics(metrics),
            compressor: SymbolicCompressor::new(),
            encoder: SessionEncoder::new(codec.clone(), id),
            decoder: SessionDecoder::new(codec),
            router,
            resolution: Resolution::Medium,
            overflow_policy: OverflowPolicy::Reject,
        }
    }

    /// Resolution of the tree that gets transmitted.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_compressor(mut self, compressor: SymbolicCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn router(&self) -> &Arc<TierRouter> {
        &self.router
    }

    /// Normalize a batch of samples.
    pub fn ingest(&mut self, samples: impl IntoIterator<Item = ModalitySample>) -> EventStream {
        self.normalizer.normalize(samples)
    }

    /// Build the three trees, applying the overflow policy.
    pub async fn build(&self, stream: &EventStream) -> Result<TreeSet> {
        match self.builder.build_trees(stream).await {
            Err(Error::AmbiguityOverflow(overflow)) if self.overflow_policy == OverflowPolicy::ProceedDegraded => {
                info!(
                    session = %self.id,
                    aggregate = overflow.aggregate,
                    "proceeding with degraded trees"
                );
                Ok((*overflow).proceed_degraded())
            }
            other => other,
        }
    }

    /// Compress and encode one tree with the tier the router picks for it.
    pub fn encode(&mut self, tree: &IntentTree, requested: Option<Tier>) -> Result<EncodedIntent> {
        let signals = IntentSignals::from_tree(tree);
        let routing = self.router.resolve_tier(&signals, requested);
        let series = self.compressor.compress_with_routing(tree, routing)?;

        let mut flags = PolicyFlags::REQUIRES_ACK;
        if tree.confidence() == Confidence::Degraded {
            flags.insert(PolicyFlags::AMBIGUOUS);
        }
        if routing.priority == PriorityClass::Bypass {
            flags.insert(PolicyFlags::BYPASS);
        }
        let message = self.encoder.encode(series, flags)?;
        debug!(
            session = %self.id,
            sequence = message.sequence(),
            tier = %routing.tier,
            bytes = message.len(),
            "intent encoded"
        );

        Ok(EncodedIntent {
            signals,
            routing,
            message: Arc::new(message),
        })
    }

    /// Route an encoded intent to its tier.
    pub async fn send(&self, encoded: &EncodedIntent) -> Result<DeliveryReport> {
        let pattern = if encoded.routing.priority == PriorityClass::Bypass {
            DeliveryPattern::Bypass
        } else {
            DeliveryPattern::Unicast
        };
        let request = RouteRequest::to_tier(Arc::clone(&encoded.message)).with_pattern(pattern);
        Ok(self.router.route(request).await?)
    }

    /// Run the whole outbound path for a batch of samples.
    pub async fn transmit(
        &mut self,
        samples: impl IntoIterator<Item = ModalitySample>,
        requested: Option<Tier>,
    ) -> Result<Transmission> {
        let stream = self.ingest(samples);
        let trees = self.build(&stream).await?;
        let encoded = self.encode(trees.get(self.resolution), requested)?;
        let report = self.send(&encoded).await?;
        Ok(Transmission {
            trees,
            encoded,
            report,
        })
    }

    /// Decode an inbound frame and expand it.
    pub fn receive(&mut self, frame: &[u8]) -> Result<Inbound> {
        let decoded = self.decoder.decode(frame).map_err(|err| {
            warn!(session = %self.id, error = %err, "inbound frame rejected");
            err
        })?;
        if let Some(repair) = &decoded.repair {
            debug!(session = %self.id, %repair, "inbound frame repaired");
        }

        match decoded.series.kind() {
            SeriesKind::Intent => {
                let tree = self.compressor.expand(&decoded.series)?;
                Ok(Inbound::Intent { tree, decoded })
            }
            SeriesKind::Control => {
                let frame = decoded.series.control_frame()?;
                Ok(Inbound::Control { frame, decoded })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireMessage;
    use crate::core::config::RouterConfig;
    use crate::core::{DecodeError, TargetId};
    use crate::ingest::Modality;
    use crate::routing::{InMemoryTransport, SharedTargetTable, TargetDescriptor};

    fn ack(_: &WireMessage) -> std::result::Result<Option<Vec<u8>>, String> {
        Ok(None)
    }

    fn router() -> (Arc<TierRouter>, Arc<InMemoryTransport>) {
        let table = Arc::new(SharedTargetTable::default());
        let transport = Arc::new(InMemoryTransport::new());
        for (id, tier) in [
            ("worker-1", Tier::Worker),
            ("specialist-1", Tier::Specialist),
            ("strategic-1", Tier::Strategic),
        ] {
            table.register(TargetDescriptor::new(id, tier));
            transport.attach(id, ack);
        }
        let router = Arc::new(TierRouter::new(RouterConfig::default(), table, transport.clone()));
        (router, transport)
    }

    fn session(router: Arc<TierRouter>) -> Session {
        Session::with_id(&RasoomConfig::default(), router, SessionId(1))
    }

    fn calm_samples() -> Vec<ModalitySample> {
        vec![
            ModalitySample::new(Modality::Gaze, 0, vec![0.2, 0.3], 0.9),
            ModalitySample::new(Modality::Touch, 150, vec![0.4, 0.2], 0.9),
            ModalitySample::idle(300),
        ]
    }

    fn uncertain_samples() -> Vec<ModalitySample> {
        vec![
            ModalitySample::new(Modality::Gaze, 0, vec![0.0, 1.0], 0.1),
            ModalitySample::new(Modality::Voice, 40, vec![0.0, 1.0], 0.1),
            ModalitySample::new(Modality::Gesture, 80, vec![0.0, 1.0], 0.1),
        ]
    }

    #[tokio::test]
    async fn test_low_ambiguity_intent_routes_to_worker() {
        let (router, transport) = router();
        let mut session = session(router);

        let sent = session.transmit(calm_samples(), None).await.unwrap();
        let medium = &sent.trees.medium;
        assert_eq!(medium.action_nodes().count(), 2);
        assert!(medium.peak_ambiguity() < 0.2);
        assert_eq!(sent.encoded.routing.tier, Tier::Worker);
        assert_eq!(sent.report.targets, vec![TargetId::from("worker-1")]);
        assert_eq!(transport.deliveries()[0].target, TargetId::from("worker-1"));
    }

    #[tokio::test]
    async fn test_burst_corruption_is_repaired() {
        let (router, _) = router();
        let mut sender = session(Arc::clone(&router));
        let sent = sender.transmit(calm_samples(), None).await.unwrap();

        let mut frame = sent.encoded.message.frame().to_vec();
        for byte in &mut frame[20..25] {
            *byte ^= 0x5a;
        }

        let mut receiver = Session::with_id(&RasoomConfig::default(), router, SessionId(2));
        let inbound = receiver.receive(&frame).unwrap();
        assert!(matches!(
            inbound.decoded().repair,
            Some(DecodeError::Correctable { corrected_symbols: 5, .. })
        ));
        match inbound {
            Inbound::Intent { tree, .. } => assert!(tree.approx_eq(&sent.trees.medium, 1e-6)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overflow_rejected_by_default() {
        let (router, transport) = router();
        let mut session = session(router);
        let err = session
            .transmit(uncertain_samples(), Some(Tier::Strategic))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguityOverflow(_)));
        assert!(transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_intent_never_escalates() {
        let (router, transport) = router();
        let mut session = session(router).with_overflow_policy(OverflowPolicy::ProceedDegraded);

        let sent = session
            .transmit(uncertain_samples(), Some(Tier::Strategic))
            .await
            .unwrap();
        assert!(sent.trees.iter().all(|t| t.confidence() == Confidence::Degraded));
        assert!(sent.encoded.signals.ambiguity > 0.85);
        assert_eq!(sent.encoded.routing.tier, Tier::Worker);
        assert!(sent.encoded.message.header().flags.contains(PolicyFlags::AMBIGUOUS));
        assert!(!sent.encoded.message.header().flags.contains(PolicyFlags::BYPASS));
        assert_eq!(transport.deliveries()[0].target, TargetId::from("worker-1"));
    }

    #[tokio::test]
    async fn test_urgent_confident_intent_bypasses_to_strategic() {
        let (router, _) = router();
        let mut session = session(router);
        let samples = vec![
            ModalitySample::new(Modality::Touch, 0, vec![0.5, 0.95], 0.98),
            ModalitySample::new(Modality::Touch, 10, vec![0.5, 0.95], 0.98),
        ];

        let sent = session.transmit(samples, Some(Tier::Worker)).await.unwrap();
        assert_eq!(sent.encoded.routing.tier, Tier::Strategic);
        assert_eq!(sent.encoded.routing.priority, PriorityClass::Bypass);
        assert!(sent.encoded.message.header().flags.contains(PolicyFlags::BYPASS));
        assert_eq!(sent.report.required, 0);
    }

    #[tokio::test]
    async fn test_follow_up_message_decodes_in_order() {
        let (router, _) = router();
        let mut sender = session(Arc::clone(&router));
        let mut receiver = Session::with_id(&RasoomConfig::default(), router, SessionId(2));

        let first = sender.transmit(calm_samples(), None).await.unwrap();
        let later: Vec<ModalitySample> = calm_samples()
            .into_iter()
            .map(|mut s| {
                s.timestamp_ms += 1_000;
                s
            })
            .collect();
        let second = sender.transmit(later, None).await.unwrap();
        assert!(second.encoded.message.sequence() > first.encoded.message.sequence());

        receiver.receive(first.encoded.message.frame()).unwrap();
        match receiver.receive(second.encoded.message.frame()).unwrap() {
            Inbound::Intent { tree, decoded } => {
                assert_eq!(decoded.sequence, second.encoded.message.sequence());
                assert!(tree.approx_eq(&second.trees.medium, 1e-6));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
