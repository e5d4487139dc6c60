//! The coordinator: vector clock, dispatch table, send-history ring, and
//! the discovering/operational mode flag, pulling from the transport's
//! receive channel and draining into its send channel.
//!
//! Each protocol's logic lives in its own submodule as `impl Coordinator`
//! blocks, since discovery, bully election, causal delivery, and
//! Phase-King all share one serialized view of this same state.

pub mod bully;
pub mod causal;
pub mod discovery;
pub mod phase_king;

use crate::core::config::Config;
use crate::core::history::SendHistory;
use crate::core::holdback::HoldBack;
use crate::core::identifier::PeerIdentifier;
use crate::core::packet::{pack, DecodedPacket, MessageType, RawPacket, UnpackedPacket};
use crate::core::vector::{ProcessId, Vector, UNASSIGNED};
use crate::scheduler::{Scheduler, TimerEvent};
use crate::transport::Transport;
use bully::BullyState;
use discovery::DiscoveryState;
use phase_king::PhaseKingState;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) const DISCOVERY_JOB: &str = "discovery-tick";
pub(crate) const BULLY_CALL_JOB: &str = "bully-call";
pub(crate) const BULLY_RESPONSE_JOB: &str = "bully-response";
pub(crate) const BULLY_COORDINATOR_JOB: &str = "bully-coordinator";
pub(crate) const PHASE_KING_INIT_JOB: &str = "phase-king-init";
pub(crate) const PHASE_KING_START_JOB: &str = "phase-king-start";

/// Work the application layer hands to a running coordinator. Kept separate
/// from the raw-packet and timer channels since it originates on the
/// caller's task rather than a transport reader or scheduler job.
pub enum AppCommand {
    Send {
        message_type: MessageType,
        payload: serde_json::Value,
    },
}

/// Whether incoming application messages are still subject to discovery
/// handling or are routed through the causal-order path. A mode flag
/// consulted by the (always-fixed) dispatch table, rather than a
/// swapped-out "active handler" object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Discovering,
    Operational,
}

pub struct Coordinator {
    pub(crate) config: Arc<Config>,
    pub(crate) identifier: PeerIdentifier,
    pub(crate) vector: Vector,
    pub(crate) mode: Mode,
    pub(crate) is_leader: bool,
    pub(crate) send_history: SendHistory,
    pub(crate) hold_back: HoldBack,
    pub(crate) discovery: DiscoveryState,
    pub(crate) bully: BullyState,
    pub(crate) phase_king: PhaseKingState,
    pub(crate) scheduler: Scheduler,
    pub(crate) transport: Arc<Transport>,
    pub(crate) raw_tx: mpsc::UnboundedSender<RawPacket>,
    pub(crate) deliver_tx: mpsc::UnboundedSender<serde_json::Value>,
}

impl Coordinator {
    /// Build a coordinator. `initial_process_id` is `Some(port)` only for
    /// a peer bootstrapped directly into leadership (`set_leader`), which
    /// starts already holding its own port instead of going through
    /// discovery.
    pub fn new(
        config: Arc<Config>,
        identifier: PeerIdentifier,
        transport: Arc<Transport>,
        raw_tx: mpsc::UnboundedSender<RawPacket>,
        deliver_tx: mpsc::UnboundedSender<serde_json::Value>,
        force_leader: bool,
        initial_process_id: Option<ProcessId>,
    ) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (mut scheduler, timer_rx) = Scheduler::new();
        let mut vector = Vector::new(config.group.multicast_addr.to_string());

        let mode = if let Some(pid) = initial_process_id {
            vector.assign(pid);
            Mode::Operational
        } else {
            Mode::Discovering
        };

        scheduler.add_job(DISCOVERY_JOB, config.discovery_interval(), TimerEvent::DiscoveryTick);
        scheduler.add_job(BULLY_CALL_JOB, config.call_timeout(), TimerEvent::BullyCall);
        scheduler.add_job(BULLY_RESPONSE_JOB, config.response_timeout(), TimerEvent::BullyCallResponseTimeout);
        scheduler.add_job(BULLY_COORDINATOR_JOB, config.coordinator_timeout(), TimerEvent::BullyCoordinatorTimeout);
        scheduler.add_job(PHASE_KING_INIT_JOB, config.init_schedule(), TimerEvent::PhaseKingInit);
        scheduler.add_job(PHASE_KING_START_JOB, config.start_timeout(), TimerEvent::PhaseKingStart);

        let send_history = SendHistory::new(config.causal.send_history_capacity);

        let coordinator = Self {
            config,
            identifier,
            vector,
            mode,
            is_leader: force_leader,
            send_history,
            hold_back: HoldBack::new(),
            discovery: DiscoveryState::new(),
            bully: BullyState::new(),
            phase_king: PhaseKingState::new(),
            scheduler,
            transport,
            raw_tx,
            deliver_tx,
        };

        (coordinator, timer_rx)
    }

    /// Kick off the peer: if operational from the start (the bootstrap
    /// leader), start the bully call timer and Phase-King; otherwise start
    /// the discovery broadcast.
    pub async fn bootstrap(&mut self) {
        match self.mode {
            Mode::Operational => {
                if !self.is_leader {
                    self.scheduler.resume(BULLY_CALL_JOB, self.config.call_timeout());
                }
                self.phase_king_start();
            }
            Mode::Discovering => {
                self.start_discovery();
            }
        }
    }

    /// Drain the transport's receive channel, the scheduler's timer
    /// channel, and the application's outgoing-message channel until all
    /// three are closed (i.e. until the peer is torn down).
    pub async fn run(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<RawPacket>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
        mut app_rx: mpsc::UnboundedReceiver<AppCommand>,
    ) {
        self.bootstrap().await;

        loop {
            tokio::select! {
                raw = raw_rx.recv() => {
                    match raw {
                        Some(raw) => self.handle_raw(raw).await,
                        None => break,
                    }
                }
                event = timer_rx.recv() => {
                    match event {
                        Some(event) => self.handle_timer(event).await,
                        None => break,
                    }
                }
                cmd = app_rx.recv() => {
                    match cmd {
                        Some(AppCommand::Send { message_type, payload }) => {
                            self.send(message_type, payload, None, true).await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_raw(&mut self, raw: RawPacket) {
        let decoded = match DecodedPacket::decode(&raw) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = ?e, "dropped malformed packet");
                return;
            }
        };

        if !self.validate(&decoded) {
            return;
        }

        self.dispatch(decoded).await;
    }

    /// Reject foreign-group packets, our own echoes, and DISCOVERY
    /// messages received by a non-leader.
    fn validate(&self, decoded: &DecodedPacket) -> bool {
        if decoded.vector.group_id != self.vector.group_id {
            tracing::warn!(group = %decoded.vector.group_id, "dropped packet from a different group");
            return false;
        }

        // Own-echo filter. Before discovery completes, both ends may still
        // carry process_id == -1, so fall back to comparing identifiers
        // carried in the DISCOVERY payload.
        if self.vector.is_assigned() {
            if decoded.vector.process_id == self.vector.process_id {
                return false;
            }
        } else if decoded.message_type == MessageType::Discovery {
            if let Some(sender_identifier) = decoded.payload.get("IDENTIFY").and_then(|v| v.as_str()) {
                if sender_identifier == self.identifier.as_str() {
                    return false;
                }
            }
        }

        if decoded.message_type == MessageType::Discovery && !self.is_leader {
            return false;
        }

        if self.is_leader && decoded.vector.contains(UNASSIGNED) {
            tracing::debug!("incoming vector still carries the unassigned sentinel key");
        }

        true
    }

    async fn dispatch(&mut self, decoded: DecodedPacket) {
        match decoded.message_type {
            MessageType::Discovery => self.handle_discovery(decoded).await,
            MessageType::DiscoveryResponse => self.handle_discovery_response(decoded).await,
            MessageType::Election => self.handle_election(decoded).await,
            MessageType::Vote => self.handle_vote(decoded).await,
            MessageType::Coordinator => self.handle_coordinator(decoded).await,
            MessageType::VtRequest => self.handle_vt_request(decoded).await,
            MessageType::VtFound => self.handle_vt_found(decoded).await,
            MessageType::VtNotFound => self.handle_vt_not_found(decoded).await,
            MessageType::PhaseKingInit => self.handle_phase_king_init(decoded).await,
            MessageType::PhaseKingFound => self.handle_phase_king_found(decoded).await,
            MessageType::PhaseKingSend => self.handle_phase_king_send(decoded).await,
            MessageType::PhaseKingDecision => self.handle_phase_king_decision(decoded).await,
            MessageType::Temperature => self.b_deliver(decoded).await,
            MessageType::Undefined => {
                tracing::debug!("received UNDEFINED message, no handler registered");
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::DiscoveryTick => self.on_discovery_tick().await,
            TimerEvent::BullyCall => self.call_for_election().await,
            TimerEvent::BullyCallResponseTimeout => self.on_call_response_timeout().await,
            TimerEvent::BullyCoordinatorTimeout => self.on_coordinator_timeout().await,
            TimerEvent::PhaseKingInit => self.init_new_round().await,
            TimerEvent::PhaseKingStart => self.start_first_round().await,
        }
    }

    /// Pack with the current vector, optionally pre-incrementing our own
    /// counter, and hand the bytes to the transport. Every outgoing
    /// packet is recorded in send history so it
    /// can answer a later retransmission request.
    pub(crate) async fn send(
        &mut self,
        message_type: MessageType,
        payload: serde_json::Value,
        target: Option<ProcessId>,
        increment: bool,
    ) {
        if increment {
            self.vector.increment_own();
        }

        let bytes = match pack(&self.vector, message_type, payload.clone()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = ?e, ?message_type, "failed to pack outgoing packet");
                return;
            }
        };

        self.send_history.push(UnpackedPacket {
            vector: self.vector.clone(),
            message_type,
            payload,
        });

        let target_port = target.unwrap_or(self.config.group.multicast_port as ProcessId) as u16;
        if let Err(e) = self.transport.send(target_port, &bytes).await {
            tracing::error!(error = ?e, ?message_type, target_port, "failed to send packet");
        }
    }

    async fn b_deliver_payload(&mut self, payload: serde_json::Value) {
        if self.deliver_tx.send(payload).is_err() {
            tracing::warn!("delivery channel closed, application is no longer listening");
        }
    }

    pub fn process_id(&self) -> ProcessId {
        self.vector.process_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// Shared by this module's submodule unit tests: builds a coordinator bound
/// to a real (but test-private) multicast port, since there is no mock
/// transport in this crate.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) async fn coordinator(
        port: u16,
        is_leader: bool,
        initial_process_id: Option<ProcessId>,
    ) -> (
        Coordinator,
        mpsc::UnboundedReceiver<TimerEvent>,
        mpsc::UnboundedReceiver<serde_json::Value>,
    ) {
        let mut config = Config::default();
        config.group.multicast_port = port;
        config.group.starting_port = port + 1;
        let config = Arc::new(config);

        let transport = Arc::new(
            Transport::bind_multicast(config.group.multicast_addr, port)
                .await
                .expect("failed to bind test multicast socket"),
        );

        let (raw_tx, _raw_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
        let identifier = PeerIdentifier::generate();

        let (coordinator, timer_rx) = Coordinator::new(
            config,
            identifier,
            transport,
            raw_tx,
            deliver_tx,
            is_leader,
            initial_process_id,
        );

        (coordinator, timer_rx, deliver_rx)
    }
}
