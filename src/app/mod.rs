//! Application boundary and peer runtime.
//!
//! Wires Transport and Coordinator together into a single spawned task per
//! peer, exposing the minimal surface the device/application layer needs:
//! `PeerBuilder::set_leader`/`start`, then `Peer::send`/`deliver_channel`.
//! The CLI demo runner in `main.rs` spawns several of these in one process.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::identifier::PeerIdentifier;
use crate::core::packet::MessageType;
use crate::core::vector::ProcessId;
use crate::coordinator::{AppCommand, Coordinator};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A not-yet-started peer. Configure with `set_leader` before `start`.
pub struct PeerBuilder {
    config: Config,
    leader: bool,
}

impl PeerBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, leader: false }
    }

    /// Force leader mode at startup, bypassing discovery entirely — used by
    /// bootstrap tests and the first peer of a demo run.
    pub fn set_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    /// Bind the transport, spawn the coordinator's dispatch loop, and
    /// return a handle the application drives.
    pub async fn start(self) -> Result<Peer> {
        let config = Arc::new(self.config);
        let identifier = PeerIdentifier::generate();

        let transport = Arc::new(
            Transport::bind_multicast(config.group.multicast_addr, config.group.multicast_port).await?,
        );

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();

        let _reader_handles = transport.spawn_readers(raw_tx.clone());

        let initial_process_id = if self.leader {
            let port = config.group.starting_port;
            transport.bind_unicast(port).await?;
            let _ = transport.spawn_unicast_reader(raw_tx.clone()).await;
            Some(port as ProcessId)
        } else {
            None
        };

        let (coordinator, timer_rx) = Coordinator::new(
            config,
            identifier,
            transport,
            raw_tx,
            deliver_tx,
            self.leader,
            initial_process_id,
        );

        let task = tokio::spawn(coordinator.run(raw_rx, timer_rx, app_rx));

        Ok(Peer {
            app_tx,
            deliver_rx,
            task,
        })
    }
}

/// A running peer, as exposed to the device/application layer.
pub struct Peer {
    app_tx: mpsc::UnboundedSender<AppCommand>,
    deliver_rx: mpsc::UnboundedReceiver<serde_json::Value>,
    task: JoinHandle<()>,
}

impl Peer {
    /// Originate a new application message. Always counted in the vector
    /// clock (`increment=true`) — this peer is the message's originator.
    pub fn send(&self, message_type: MessageType, payload: serde_json::Value) {
        if self
            .app_tx
            .send(AppCommand::Send { message_type, payload })
            .is_err()
        {
            tracing::warn!("peer task is no longer running, dropped outgoing message");
        }
    }

    /// Stream of payloads delivered to the application in causal order.
    pub fn deliver_channel(&mut self) -> &mut mpsc::UnboundedReceiver<serde_json::Value> {
        &mut self.deliver_rx
    }

    /// Wait for the peer's dispatch loop to exit (it does not, under normal
    /// operation, since its channels never close on their own).
    pub async fn join(self) {
        let _ = self.task.await;
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
