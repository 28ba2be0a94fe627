//! Tier router.
//!
//! Resolves the tier and targets of a wire message, hands it to per-target
//! delivery workers and waits for quorum within the envelope deadline.
//! Standard and bypass traffic acquire permits from separate lanes; a full
//! lane rejects the request instead of queueing it. Every target has a single
//! worker, so messages reach a target in the order their sequences were
//! claimed.

use crate::core::config::RouterConfig;
use crate::core::{PriorityClass, RejectReason, RoutingError, RoutingMetadata, SessionId, TargetId, Tier};
use crate::monitoring::ProtocolMetrics;
use crate::routing::envelope::{
    Addressing, DeliveryPattern, DeliveryStatus, EnvelopeState, IntentSignals, RouteRequest,
    RoutingEnvelope,
};
use crate::routing::policy::{AllowAll, PolicyDecision, PolicyHook};
use crate::routing::table::{HealthFeed, SharedTargetTable, TargetTable};
use crate::routing::transport::{Ack, Transport, TransportError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type DeliveryResult = Result<Ack, TransportError>;

/// Successful delivery of one envelope.
#[derive(Clone, Debug)]
pub struct DeliveryReport {
    pub envelope_id: Uuid,
    pub tier: Tier,
    /// Targets the envelope was dispatched to
    pub targets: Vec<TargetId>,
    /// Acknowledgements received before quorum was declared
    pub acks: Vec<Ack>,
    pub required: usize,
    pub latency: Duration,
}

impl DeliveryReport {
    /// Payload of the first acknowledgement that carried one.
    pub fn first_payload(&self) -> Option<&[u8]> {
        self.acks.iter().find_map(|ack| ack.payload.as_deref())
    }
}

/// Result of a cancel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancelled before dispatch; the envelope is rejected
    Prevented,
    /// Already dispatched; cancel messages were sent to its targets
    BestEffort,
    AlreadyTerminal,
    Unknown,
}

/// A dispatched envelope whose acknowledgements are still outstanding.
///
/// Holds its lane permit until it is awaited or dropped.
pub struct PendingDelivery {
    envelope: RoutingEnvelope,
    targets: Vec<TargetId>,
    replies: Vec<oneshot::Receiver<DeliveryResult>>,
    required: usize,
    started: Instant,
    permit: OwnedSemaphorePermit,
}

impl PendingDelivery {
    pub fn id(&self) -> Uuid {
        self.envelope.id()
    }

    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    pub fn required(&self) -> usize {
        self.required
    }
}

struct LiveEntry {
    state: EnvelopeState,
    targets: Vec<TargetId>,
    required: usize,
}

#[derive(Default)]
struct Ledger {
    live: HashMap<Uuid, LiveEntry>,
    /// When each live phase lapses; `true` marks the dispatched phase
    expiries: BinaryHeap<Reverse<(Instant, Uuid, bool)>>,
    terminal: HashMap<Uuid, DeliveryStatus>,
    order: VecDeque<Uuid>,
    retention: usize,
}

impl Ledger {
    fn open(&mut self, id: Uuid, deadline: Duration) {
        self.live.insert(
            id,
            LiveEntry {
                state: EnvelopeState::Resolving,
                targets: Vec::new(),
                required: 0,
            },
        );
        if let Some(at) = Instant::now().checked_add(deadline) {
            self.expiries.push(Reverse((at, id, false)));
        }
    }

    fn state(&self, id: &Uuid) -> Option<EnvelopeState> {
        self.live
            .get(id)
            .map(|entry| entry.state)
            .or_else(|| self.terminal.get(id).map(DeliveryStatus::state))
    }

    /// Move to `Dispatched`. Fails if the envelope was finished meanwhile.
    fn dispatch(&mut self, id: Uuid, targets: &[TargetId], required: usize, deadline: Duration) -> bool {
        match self.live.get_mut(&id) {
            Some(entry) if entry.state.can_transition_to(EnvelopeState::Dispatched) => {
                *entry = LiveEntry {
                    state: EnvelopeState::Dispatched,
                    targets: targets.to_vec(),
                    required,
                };
                // the dispatcher finishes at the deadline; this catches abandoned waits
                if let Some(at) = Instant::now().checked_add(deadline.saturating_mul(2)) {
                    self.expiries.push(Reverse((at, id, true)));
                }
                true
            }
            _ => false,
        }
    }

    /// Record the terminal status of a live envelope. The first one wins.
    fn finish(&mut self, id: Uuid, status: DeliveryStatus) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        self.terminal.insert(id, status);
        self.order.push_back(id);
        while self.order.len() > self.retention {
            if let Some(oldest) = self.order.pop_front() {
                self.terminal.remove(&oldest);
            }
        }
        true
    }

    fn forget(&mut self, id: &Uuid) {
        self.live.remove(id);
    }

    /// Finish live envelopes whose current phase outlived its deadline.
    fn sweep(&mut self, now: Instant) -> Vec<(Uuid, EnvelopeState)> {
        let mut expired = Vec::new();
        while let Some(Reverse((at, id, dispatched))) = self.expiries.peek().copied() {
            if at > now {
                break;
            }
            self.expiries.pop();
            let status = match self.live.get(&id) {
                Some(entry) if !dispatched && entry.state == EnvelopeState::Resolving => {
                    DeliveryStatus::Rejected(RejectReason::Expired)
                }
                Some(entry) if dispatched && entry.state == EnvelopeState::Dispatched => DeliveryStatus::TimedOut {
                    acknowledged: 0,
                    required: entry.required,
                    refused: 0,
                },
                _ => continue,
            };
            expired.push((id, status.state()));
            self.finish(id, status);
        }
        expired
    }
}

struct Delivery {
    envelope: RoutingEnvelope,
    reply: oneshot::Sender<DeliveryResult>,
}

struct Worker {
    queue: mpsc::UnboundedSender<Delivery>,
    done: JoinHandle<()>,
}

/// Sequence claims and the delivery workers that honour them.
#[derive(Default)]
struct DeliveryOrder {
    /// Last sequence claimed per (session, target), and when
    claimed: HashMap<(SessionId, TargetId), (u32, Instant)>,
    workers: HashMap<TargetId, Worker>,
}

impl DeliveryOrder {
    fn superseded(&self, session: SessionId, sequence: u32, targets: &[TargetId]) -> bool {
        targets.iter().any(|target| {
            self.claimed
                .get(&(session, target.clone()))
                .is_some_and(|(last, _)| *last >= sequence)
        })
    }

    fn claim(&mut self, session: SessionId, sequence: u32, targets: &[TargetId], now: Instant) {
        for target in targets {
            self.claimed.insert((session, target.clone()), (sequence, now));
        }
    }

    /// Once more than `capacity` entries are tracked, drop those idle for
    /// `ttl`, then the least recently claimed down to three quarters of
    /// `capacity`.
    fn evict_idle(&mut self, now: Instant, ttl: Duration, capacity: usize) {
        if self.claimed.len() <= capacity {
            return;
        }
        self.claimed
            .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < ttl);

        let keep = (capacity - capacity / 4).max(1);
        if self.claimed.len() > keep {
            let mut by_age: Vec<(Instant, (SessionId, TargetId))> = self
                .claimed
                .iter()
                .map(|(key, (_, seen))| (*seen, key.clone()))
                .collect();
            by_age.sort_by_key(|(seen, _)| *seen);
            let excess = self.claimed.len() - keep;
            for (_, key) in by_age.into_iter().take(excess) {
                self.claimed.remove(&key);
            }
        }
        debug!(tracked = self.claimed.len(), "evicted idle sequence entries");
    }

    /// Queue a delivery on the target's worker, starting one if needed.
    fn enqueue(&mut self, target: &TargetId, delivery: Delivery, transport: &Arc<dyn Transport>, idle: Duration) {
        let delivery = match self.workers.get(target) {
            Some(worker) => match worker.queue.send(delivery) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => returned,
            },
            None => delivery,
        };

        let previous = self.workers.remove(target).map(|worker| worker.done);
        let (queue, inbox) = mpsc::unbounded_channel();
        // `inbox` is alive, so this cannot fail
        let _ = queue.send(delivery);
        let done = tokio::spawn(run_worker(
            target.clone(),
            Arc::clone(transport),
            inbox,
            idle,
            previous,
        ));
        self.workers.retain(|_, worker| !worker.done.is_finished());
        self.workers.insert(target.clone(), Worker { queue, done });
    }
}

/// Deliver queued envelopes to one target, one at a time.
async fn run_worker(
    target: TargetId,
    transport: Arc<dyn Transport>,
    mut inbox: mpsc::UnboundedReceiver<Delivery>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) {
    // a stopping predecessor may still be draining its queue
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    loop {
        match tokio::time::timeout(idle, inbox.recv()).await {
            Ok(Some(delivery)) => deliver(transport.as_ref(), &target, delivery).await,
            Ok(None) => break,
            Err(_) => {
                inbox.close();
                while let Ok(delivery) = inbox.try_recv() {
                    deliver(transport.as_ref(), &target, delivery).await;
                }
                break;
            }
        }
    }
    debug!(%target, "delivery worker stopped");
}

async fn deliver(transport: &dyn Transport, target: &TargetId, delivery: Delivery) {
    let result = transport.deliver(target, &delivery.envelope).await;
    if let Err(err) = &result {
        warn!(envelope = %delivery.envelope.id(), error = %err, "delivery failed");
    }
    // the dispatcher may have stopped waiting
    let _ = delivery.reply.send(result);
}

/// Routes wire messages to tiered targets.
pub struct TierRouter {
    config: RouterConfig,
    table: Arc<SharedTargetTable>,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn PolicyHook>,
    health: Option<Arc<dyn HealthFeed>>,
    metrics: Arc<ProtocolMetrics>,
    standard_lane: Arc<Semaphore>,
    bypass_lane: Arc<Semaphore>,
    ledger: Mutex<Ledger>,
    order: Mutex<DeliveryOrder>,
}

impl TierRouter {
    pub fn new(config: RouterConfig, table: Arc<SharedTargetTable>, transport: Arc<dyn Transport>) -> Self {
        let ledger = Ledger {
            retention: config.status_retention,
            ..Ledger::default()
        };
        Self {
            standard_lane: Arc::new(Semaphore::new(config.max_pending)),
            bypass_lane: Arc::new(Semaphore::new(config.bypass_lane_capacity)),
            config,
            table,
            transport,
            policy: Arc::new(AllowAll),
            health: None,
            metrics: Arc::new(ProtocolMetrics::new()),
            ledger: Mutex::new(ledger),
            order: Mutex::new(DeliveryOrder::default()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyHook>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_health_feed(mut self, feed: Arc<dyn HealthFeed>) -> Self {
        self.health = Some(feed);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ProtocolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<SharedTargetTable> {
        &self.table
    }

    pub fn metrics(&self) -> &Arc<ProtocolMetrics> {
        &self.metrics
    }

    /// Pick tier and priority for a message from its intent signals.
    ///
    /// Ambiguous intents stay on the Worker tier whatever was requested. Only
    /// urgent, confident intents take the bypass lane to Strategic.
    pub fn resolve_tier(&self, signals: &IntentSignals, requested: Option<Tier>) -> RoutingMetadata {
        if signals.ambiguity > self.config.ambiguity_threshold {
            if requested.is_some_and(|tier| tier != Tier::Worker) {
                debug!(
                    ambiguity = signals.ambiguity,
                    ?requested,
                    "ambiguous intent held on worker tier"
                );
            }
            return RoutingMetadata {
                tier: Tier::Worker,
                priority: PriorityClass::Normal,
            };
        }

        let urgent = signals.urgency >= self.config.urgency_threshold;
        if urgent && signals.confidence >= self.config.confidence_threshold {
            return RoutingMetadata {
                tier: Tier::Strategic,
                priority: PriorityClass::Bypass,
            };
        }

        RoutingMetadata {
            tier: requested.unwrap_or(Tier::Worker),
            priority: if urgent {
                PriorityClass::Urgent
            } else {
                PriorityClass::Normal
            },
        }
    }

    /// Wrap a request in an envelope in the `Resolving` state.
    ///
    /// An envelope that is not dispatched within its deadline is rejected as
    /// expired.
    pub fn envelope(&self, request: RouteRequest) -> RoutingEnvelope {
        let tier = request.message.header().tier;
        let deadline = request
            .deadline
            .unwrap_or_else(|| self.config.budgets.for_tier(tier));
        let pattern = match request.pattern {
            DeliveryPattern::Multicast { quorum: 0 } => DeliveryPattern::Multicast {
                quorum: self.config.multicast_quorum,
            },
            pattern => pattern,
        };
        let envelope = RoutingEnvelope::new(request.message, pattern, request.addressing, deadline);
        self.expire_stale();
        self.ledger().open(envelope.id(), deadline);
        envelope
    }

    /// Envelope and dispatch in one step.
    pub async fn route(&self, request: RouteRequest) -> Result<DeliveryReport, RoutingError> {
        let envelope = self.envelope(request);
        self.dispatch(envelope).await
    }

    /// Dispatch an envelope and wait for its terminal state.
    pub async fn dispatch(&self, envelope: RoutingEnvelope) -> Result<DeliveryReport, RoutingError> {
        let pending = self.submit(envelope)?;
        self.await_quorum(pending).await
    }

    /// Resolve targets, claim the message sequence and queue the envelope on
    /// its targets' delivery workers.
    ///
    /// Returns as soon as the envelope is `Dispatched`; callers that need to
    /// serialize their own sequencing with dispatch order hold their lock
    /// across this call only. Must run inside a tokio runtime.
    pub fn submit(&self, envelope: RoutingEnvelope) -> Result<PendingDelivery, RoutingError> {
        let id = envelope.id();
        let bypass = envelope.pattern() == DeliveryPattern::Bypass;
        let (lane, limit) = if bypass {
            (&self.bypass_lane, self.config.bypass_lane_capacity)
        } else {
            (&self.standard_lane, self.config.max_pending)
        };

        let permit = match Arc::clone(lane).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.ledger().forget(&id);
                self.metrics.backpressure_rejections.inc();
                warn!(envelope = %id, bypass, limit, "dispatch lane full");
                return Err(RoutingError::Backpressure { pending: limit, limit });
            }
        };
        self.update_depth();
        self.expire_stale();

        if let Some(status) = self.delivery_status(id) {
            return Err(status_error(id, status));
        }

        let table = self.table.snapshot();
        let targets = self.select_targets(&table, &envelope);
        if targets.is_empty() {
            return Err(self.reject(id, RejectReason::NoEligibleTargets));
        }

        if let PolicyDecision::Deny(reason) = self.policy.policy_check(&envelope) {
            return Err(self.reject(id, RejectReason::PolicyDenied(reason)));
        }

        let required = envelope.pattern().required_acks(targets.len());
        let started = Instant::now();
        let replies = self.enqueue(&envelope, &targets, required)?;
        debug!(
            envelope = %id,
            tier = %envelope.tier(),
            targets = targets.len(),
            required,
            "dispatched"
        );

        Ok(PendingDelivery {
            envelope,
            targets,
            replies,
            required,
            started,
            permit,
        })
    }

    /// Wait for quorum, refusal of too many targets, or the deadline.
    pub async fn await_quorum(&self, pending: PendingDelivery) -> Result<DeliveryReport, RoutingError> {
        let PendingDelivery {
            envelope,
            targets,
            replies,
            required,
            started,
            permit,
        } = pending;
        let id = envelope.id();

        if required == 0 {
            // Acknowledgements on the bypass lane are not awaited.
            drop(permit);
            return Ok(self.acknowledge(&envelope, targets, Vec::new(), 0, started));
        }

        let mut replies: FuturesUnordered<_> = replies.into_iter().collect();
        let mut acks = Vec::new();
        let mut failures = Vec::new();
        let collect = async {
            while let Some(reply) = replies.next().await {
                match reply {
                    Ok(Ok(ack)) => {
                        acks.push(ack);
                        if acks.len() >= required {
                            break;
                        }
                    }
                    Ok(Err(err)) => failures.push(err.to_string()),
                    Err(_) => failures.push("delivery worker stopped".to_string()),
                }
                if failures.len() > targets.len() - required {
                    break;
                }
            }
        };
        let timed_out = tokio::time::timeout(envelope.deadline(), collect).await.is_err();
        drop(permit);

        if acks.len() >= required {
            return Ok(self.acknowledge(&envelope, targets, acks, required, started));
        }

        let acknowledged = acks.len();
        let refused = failures.len();
        self.metrics.routes_timed_out.inc();
        self.observe_latency(started);
        self.ledger().finish(
            id,
            DeliveryStatus::TimedOut {
                acknowledged,
                required,
                refused,
            },
        );
        let unacked: Vec<TargetId> = targets
            .into_iter()
            .filter(|t| !acks.iter().any(|ack| &ack.target == t))
            .collect();
        self.send_cancels(id, unacked);

        if timed_out {
            warn!(envelope = %id, acknowledged, required, refused, "deadline elapsed before quorum");
        } else {
            warn!(
                envelope = %id,
                acknowledged,
                required,
                refused,
                failures = %failures.join("; "),
                "quorum unreachable after refusals"
            );
        }
        Err(RoutingError::TimedOut {
            envelope_id: id,
            acknowledged,
            required,
            refused,
        })
    }

    /// Cancel an envelope. Before dispatch this rejects it; afterwards cancel
    /// messages go to every dispatched target.
    pub async fn cancel(&self, id: Uuid) -> CancelOutcome {
        let targets = {
            let mut ledger = self.ledger();
            match ledger.state(&id) {
                None => return CancelOutcome::Unknown,
                Some(state) if state.is_terminal() => return CancelOutcome::AlreadyTerminal,
                Some(EnvelopeState::Resolving) => {
                    ledger.finish(id, DeliveryStatus::Rejected(RejectReason::Cancelled));
                    self.metrics.routes_rejected.inc();
                    info!(envelope = %id, "cancelled before dispatch");
                    return CancelOutcome::Prevented;
                }
                Some(_) => ledger
                    .live
                    .get(&id)
                    .map(|entry| entry.targets.clone())
                    .unwrap_or_default(),
            }
        };
        for target in &targets {
            self.transport.cancel(target, id).await;
        }
        CancelOutcome::BestEffort
    }

    /// Terminal status of an envelope, while it is retained.
    pub fn delivery_status(&self, id: Uuid) -> Option<DeliveryStatus> {
        self.ledger().terminal.get(&id).cloned()
    }

    /// Current state of a live or retained envelope.
    pub fn envelope_state(&self, id: Uuid) -> Option<EnvelopeState> {
        self.ledger().state(&id)
    }

    fn select_targets(&self, table: &TargetTable, envelope: &RoutingEnvelope) -> Vec<TargetId> {
        let tier = envelope.tier();
        let feed = self.health.as_deref();
        let eligible = match envelope.addressing() {
            Addressing::Targets(ids) => table.eligible(tier, None, Some(ids), feed),
            Addressing::Topic(topic) => table.eligible(tier, Some(topic), None, feed),
            Addressing::Tier => table.eligible(tier, None, None, feed),
        };
        let ids = eligible.into_iter().map(|t| t.id.clone());
        if envelope.pattern().fans_out() {
            ids.collect()
        } else {
            ids.take(1).collect()
        }
    }

    /// Claim the message sequence for every target, move the envelope to
    /// `Dispatched` and queue it on each target's worker. All of it happens
    /// under the ordering lock, so queue order follows sequence order.
    fn enqueue(
        &self,
        envelope: &RoutingEnvelope,
        targets: &[TargetId],
        required: usize,
    ) -> Result<Vec<oneshot::Receiver<DeliveryResult>>, RoutingError> {
        let id = envelope.id();
        let message = envelope.message();
        let (session, sequence) = (message.session(), message.sequence());

        let mut order = self.order();
        if order.superseded(session, sequence, targets) {
            drop(order);
            return Err(self.reject(id, RejectReason::OutOfOrder { sequence }));
        }
        let dispatched = self.ledger().dispatch(id, targets, required, envelope.deadline());
        if !dispatched {
            drop(order);
            let status = self
                .delivery_status(id)
                .unwrap_or(DeliveryStatus::Rejected(RejectReason::Cancelled));
            return Err(status_error(id, status));
        }

        let now = Instant::now();
        order.claim(session, sequence, targets, now);
        order.evict_idle(
            now,
            Duration::from_millis(self.config.sequence_idle_ttl_ms),
            self.config.max_tracked_sequences,
        );

        let idle = Duration::from_millis(self.config.worker_idle_ms);
        let replies = targets
            .iter()
            .map(|target| {
                let (reply, receiver) = oneshot::channel();
                let delivery = Delivery {
                    envelope: envelope.clone(),
                    reply,
                };
                order.enqueue(target, delivery, &self.transport, idle);
                receiver
            })
            .collect();
        Ok(replies)
    }

    fn send_cancels(&self, id: Uuid, targets: Vec<TargetId>) {
        if targets.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            for target in &targets {
                transport.cancel(target, id).await;
            }
        });
    }

    fn acknowledge(
        &self,
        envelope: &RoutingEnvelope,
        targets: Vec<TargetId>,
        acks: Vec<Ack>,
        required: usize,
        started: Instant,
    ) -> DeliveryReport {
        let id = envelope.id();
        let acknowledged: Vec<TargetId> = if acks.is_empty() {
            targets.clone()
        } else {
            acks.iter().map(|ack| ack.target.clone()).collect()
        };
        self.ledger().finish(
            id,
            DeliveryStatus::Acknowledged {
                targets: acknowledged,
            },
        );
        self.metrics.routes_acknowledged.inc();
        let latency = self.observe_latency(started);
        debug!(envelope = %id, acks = acks.len(), required, ?latency, "acknowledged");

        DeliveryReport {
            envelope_id: id,
            tier: envelope.tier(),
            targets,
            acks,
            required,
            latency,
        }
    }

    /// Reject an envelope that has not been dispatched.
    fn reject(&self, id: Uuid, reason: RejectReason) -> RoutingError {
        self.metrics.routes_rejected.inc();
        info!(envelope = %id, %reason, "envelope rejected");
        self.ledger()
            .finish(id, DeliveryStatus::Rejected(reason.clone()));
        RoutingError::Rejected {
            envelope_id: id,
            reason,
        }
    }

    fn expire_stale(&self) {
        let expired = self.ledger().sweep(Instant::now());
        for (id, state) in expired {
            if state == EnvelopeState::TimedOut {
                self.metrics.routes_timed_out.inc();
            } else {
                self.metrics.routes_rejected.inc();
            }
            debug!(envelope = %id, ?state, "envelope expired");
        }
    }

    fn observe_latency(&self, started: Instant) -> Duration {
        let latency = started.elapsed();
        self.metrics
            .dispatch_latency_ms
            .observe(latency.as_secs_f64() * 1_000.0);
        latency
    }

    fn update_depth(&self) {
        let in_use = self.config.max_pending - self.standard_lane.available_permits();
        self.metrics.pending_depth.set(in_use as f64);
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn order(&self) -> MutexGuard<'_, DeliveryOrder> {
        self.order.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn status_error(id: Uuid, status: DeliveryStatus) -> RoutingError {
    match status {
        DeliveryStatus::TimedOut {
            acknowledged,
            required,
            refused,
        } => RoutingError::TimedOut {
            envelope_id: id,
            acknowledged,
            required,
            refused,
        },
        DeliveryStatus::Rejected(reason) => RoutingError::Rejected {
            envelope_id: id,
            reason,
        },
        DeliveryStatus::Acknowledged { .. } => RoutingError::Rejected {
            envelope_id: id,
            reason: RejectReason::Duplicate,
        },
    }
}
