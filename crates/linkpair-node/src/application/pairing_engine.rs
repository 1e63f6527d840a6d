//! PairingEngine: the REQUEST / RESPONSE / CONFIRM handshake state machine.
//!
//! The engine owns the pairing status, the paired peer address, and the
//! pairing-mode flag.  It is driven by frames the [`Transport`] delivers,
//! persists every pairing transition synchronously, keeps the [`PeerTable`]
//! in step, and forwards every inbound frame to the application afterwards.
//!
//! # Handshake (for beginners)
//!
//! ```text
//!  MASTER (pairing mode)                         SLAVE (pairing mode)
//!    │ REQUEST{mac=M} ──► FF:FF:FF:FF:FF:FF ───►  │ register M, reply
//!    │ ◄──────────────────────── RESPONSE{mac=S}  │
//!    │ adopt S, PAIRED, persist                   │
//!    │ register S, CONFIRM{mac=M} ──────────────► │ adopt M, PAIRED, persist
//!    │ exit pairing mode                          │ exit pairing mode
//! ```
//!
//! | Role   | Received | Action                                              |
//! |--------|----------|-----------------------------------------------------|
//! | SLAVE  | REQUEST  | register sender, send RESPONSE to sender            |
//! | MASTER | RESPONSE | adopt carried address, persist, CONFIRM, exit mode  |
//! | SLAVE  | CONFIRM  | adopt carried address, persist, exit mode           |
//! | any    | other    | nothing                                             |
//!
//! All of it only happens while pairing mode is on.  There are no sequence
//! numbers, timeouts, or retries: a lost RESPONSE or CONFIRM stalls the
//! handshake until the operator re-enters pairing mode.
//!
//! # Concurrency
//!
//! Transport notifications arrive on the transport's own thread while the
//! application calls in from its own.  All mutable state sits behind one
//! `Mutex`; the application callback is always invoked with that lock
//! released so it may call back into the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkpair_core::protocol::messages::PAIRING_MESSAGE_LEN;
use linkpair_core::{
    decode_message, encode_message, DeviceRole, MacAddress, MessageType, PairingMessage,
    PairingRecord, PairingStatus, ProtocolError, RepairPolicy,
};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::peer_table::PeerTable;
use crate::application::persistence::{NonVolatileStorage, PairingPersistence, StorageError};
use crate::application::transport::{SendStatus, Transport, TransportError, TransportObserver};

/// Logical channel both peers must share unless configured otherwise.
pub const DEFAULT_CHANNEL: u8 = 1;

/// Error type for [`PairingEngine`] operations.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Link bring-up failed; the engine stays non-operational.
    #[error("transport initialisation failed: {0}")]
    TransportInitFailed(#[source] TransportError),
    /// `initialize` has not completed successfully.
    #[error("pairing engine is not operational")]
    NotOperational,
    /// Application data needs a paired peer.
    #[error("not paired; cannot send data")]
    NotPaired,
    /// The transport's peer list is full.
    #[error("peer table is full")]
    PeerTableFull,
    /// The transport rejected a peer registration for another reason.
    #[error("failed to add peer: {0}")]
    PeerAddFailed(#[source] TransportError),
    /// A send was rejected by the transport.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    /// The pairing record could not be persisted.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// A record could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),
    /// The operation belongs to the other role.
    #[error("a {role} node cannot {operation}")]
    WrongRole {
        role: DeviceRole,
        operation: &'static str,
    },
    /// The operation needs pairing mode.
    #[error("pairing mode is off")]
    NotInPairingMode,
}

impl PairingError {
    fn from_peer_add(e: TransportError) -> Self {
        match e {
            TransportError::PeerLimit { .. } => PairingError::PeerTableFull,
            other => PairingError::PeerAddFailed(other),
        }
    }
}

/// Application sink for every inbound frame: `(sender, payload)`.
pub type ReceiveCallback = Arc<dyn Fn(MacAddress, &[u8]) + Send + Sync>;

/// Static engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub role: DeviceRole,
    pub channel: u8,
    pub repair_policy: RepairPolicy,
}

impl EngineConfig {
    /// Settings for `role` on [`DEFAULT_CHANNEL`] with the default policy.
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            channel: DEFAULT_CHANNEL,
            repair_policy: RepairPolicy::default(),
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.repair_policy = policy;
        self
    }
}

#[derive(Debug)]
struct EngineState {
    status: PairingStatus,
    paired_address: MacAddress,
    pairing_mode: bool,
    operational: bool,
    peers: PeerTable,
}

struct EngineShared {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    persistence: PairingPersistence,
    state: Mutex<EngineState>,
    receive_callback: Mutex<Option<ReceiveCallback>>,
}

/// Handle to a pairing engine.  Clones share the same engine.
#[derive(Clone)]
pub struct PairingEngine {
    shared: Arc<EngineShared>,
}

impl PairingEngine {
    /// Creates an engine for one node.  Nothing touches the transport or the
    /// storage until [`initialize`](Self::initialize).
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn NonVolatileStorage>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                config,
                transport,
                persistence: PairingPersistence::new(storage),
                state: Mutex::new(EngineState {
                    status: PairingStatus::Unpaired,
                    paired_address: MacAddress::BROADCAST,
                    pairing_mode: false,
                    operational: false,
                    peers: PeerTable::new(),
                }),
                receive_callback: Mutex::new(None),
            }),
        }
    }

    /// Loads the persisted pairing, brings the link up, registers the engine
    /// as the transport's observer, and registers the initial peer (the
    /// paired address, or broadcast when unpaired).
    ///
    /// An unreadable store is treated as unpaired.  A failed peer
    /// registration is logged and tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::TransportInitFailed`] if the link cannot be
    /// brought up.  The engine then stays non-operational: inbound frames are
    /// not processed and application sends are rejected.
    pub fn initialize(&self) -> Result<(), PairingError> {
        let shared = &self.shared;
        let (address, status) = match shared.persistence.load() {
            Ok(record) => record.normalize(),
            Err(e) => {
                warn!("could not load pairing record, starting unpaired: {e}");
                (MacAddress::BROADCAST, PairingStatus::Unpaired)
            }
        };

        {
            let mut state = shared.lock_state();
            state.status = status;
            state.paired_address = address;
            state.operational = false;
        }

        if let Err(e) = shared.transport.init(shared.config.channel) {
            error!("link initialisation failed: {e}");
            return Err(PairingError::TransportInitFailed(e));
        }

        let observer: Arc<dyn TransportObserver> = self.shared.clone();
        shared.transport.register_observer(Arc::downgrade(&observer));

        let mut state = shared.lock_state();
        let initial_peer = if status == PairingStatus::Paired {
            info!(peer = %address, "using paired address");
            address
        } else {
            info!("no pairing data found; ready for pairing");
            MacAddress::BROADCAST
        };
        if let Err(e) = state
            .peers
            .upsert(shared.transport.as_ref(), initial_peer, shared.config.channel)
        {
            warn!(peer = %initial_peer, "initial peer registration failed; continuing: {e}");
        }
        state.operational = true;

        info!(
            role = %shared.config.role,
            local = %shared.transport.local_address(),
            channel = shared.config.channel,
            "pairing engine initialised"
        );
        Ok(())
    }

    /// Turns pairing mode on.  Idempotent.
    pub fn enter_pairing_mode(&self) {
        self.shared.lock_state().pairing_mode = true;
        info!("entering pairing mode");
    }

    /// Turns pairing mode off.  Idempotent.
    pub fn exit_pairing_mode(&self) {
        self.shared.lock_state().pairing_mode = false;
        info!("exiting pairing mode");
    }

    pub fn is_pairing_mode(&self) -> bool {
        self.shared.lock_state().pairing_mode
    }

    pub fn is_paired(&self) -> bool {
        self.pairing_status() == PairingStatus::Paired
    }

    pub fn pairing_status(&self) -> PairingStatus {
        self.shared.lock_state().status
    }

    /// The paired peer, or the broadcast sentinel while unpaired.
    pub fn paired_address(&self) -> MacAddress {
        self.shared.lock_state().paired_address
    }

    pub fn is_operational(&self) -> bool {
        self.shared.lock_state().operational
    }

    pub fn role(&self) -> DeviceRole {
        self.shared.config.role
    }

    pub fn local_address(&self) -> MacAddress {
        self.shared.transport.local_address()
    }

    /// Addresses currently registered in the PeerTable.
    pub fn known_peers(&self) -> Vec<MacAddress> {
        self.shared.lock_state().peers.addresses()
    }

    /// Forgets the paired peer and persists the cleared record.
    ///
    /// Pairing mode and the PeerTable are left as they are; re-entering
    /// pairing mode (and, on a MASTER, sending a request) rebuilds the
    /// broadcast entry.
    ///
    /// # Errors
    ///
    /// Returns [`PairingError::Storage`] if the cleared record cannot be
    /// persisted.  The in-memory state is cleared regardless.
    pub fn clear_pairing(&self) -> Result<(), PairingError> {
        let mut state = self.shared.lock_state();
        state.paired_address = MacAddress::BROADCAST;
        state.status = PairingStatus::Unpaired;
        self.shared.persistence.save(&PairingRecord::cleared())?;
        info!("pairing data cleared");
        Ok(())
    }

    /// Sends `payload` verbatim to the paired peer.  Fire-and-forget.
    ///
    /// # Errors
    ///
    /// - [`PairingError::NotPaired`] while unpaired; nothing is transmitted.
    /// - [`PairingError::NotOperational`] before a successful `initialize`.
    /// - [`PairingError::Transport`] if the transport refuses the frame.
    pub fn send_application_data(&self, payload: &[u8]) -> Result<(), PairingError> {
        let destination = {
            let state = self.shared.lock_state();
            if state.status != PairingStatus::Paired {
                warn!("not paired; cannot send data");
                return Err(PairingError::NotPaired);
            }
            if !state.operational {
                return Err(PairingError::NotOperational);
            }
            state.paired_address
        };

        self.shared
            .transport
            .send(destination, payload)
            .map_err(PairingError::Transport)?;
        trace!(peer = %destination, len = payload.len(), "application data sent");
        Ok(())
    }

    /// Broadcasts one REQUEST carrying this node's address (MASTER only).
    ///
    /// The broadcast peer is re-registered first so this also works right
    /// after [`clear_pairing`](Self::clear_pairing).  No retry is scheduled.
    ///
    /// # Errors
    ///
    /// [`PairingError::WrongRole`] on a SLAVE, [`PairingError::NotOperational`]
    /// before `initialize`, [`PairingError::NotInPairingMode`] when the mode
    /// is off, and peer-registration or transport errors.
    pub fn send_pairing_request(&self) -> Result<(), PairingError> {
        let shared = &self.shared;
        if shared.config.role != DeviceRole::Master {
            return Err(PairingError::WrongRole {
                role: shared.config.role,
                operation: "send a pairing request",
            });
        }

        let mut state = shared.lock_state();
        if !state.operational {
            return Err(PairingError::NotOperational);
        }
        if !state.pairing_mode {
            return Err(PairingError::NotInPairingMode);
        }

        state
            .peers
            .upsert(shared.transport.as_ref(), MacAddress::BROADCAST, shared.config.channel)
            .map_err(PairingError::from_peer_add)?;

        let request = PairingMessage::new(MessageType::Request, shared.transport.local_address());
        let bytes = encode_message(&request)?;
        shared
            .transport
            .send(MacAddress::BROADCAST, &bytes)
            .map_err(PairingError::Transport)?;
        info!("sent PAIR_REQUEST");
        Ok(())
    }

    /// Registers the application sink for every inbound frame, replacing any
    /// previous one.  It runs after the engine's own handling, for handshake
    /// and non-handshake frames alike.
    pub fn set_receive_callback<F>(&self, callback: F)
    where
        F: Fn(MacAddress, &[u8]) + Send + Sync + 'static,
    {
        *self
            .shared
            .receive_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }
}

// ── Notification handling ─────────────────────────────────────────────────────

impl TransportObserver for EngineShared {
    fn on_receive(&self, sender: MacAddress, payload: &[u8]) {
        debug!(from = %sender, len = payload.len(), "packet received");
        self.handle_frame(sender, payload);
        self.forward_to_application(sender, payload);
    }

    fn on_send_complete(&self, destination: MacAddress, status: SendStatus) {
        match status {
            SendStatus::Delivered => debug!(to = %destination, "delivery success"),
            SendStatus::Failed => warn!(to = %destination, "delivery failed"),
        }
    }
}

impl EngineShared {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_frame(&self, sender: MacAddress, payload: &[u8]) {
        if payload.len() < PAIRING_MESSAGE_LEN {
            trace!(len = payload.len(), "frame shorter than a handshake record");
            return;
        }
        let msg = match decode_message(payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("frame not decodable as a handshake record: {e}");
                return;
            }
        };
        let Some(kind) = msg.kind() else {
            return;
        };

        let mut state = self.lock_state();
        if !state.operational {
            return;
        }
        if !state.pairing_mode {
            debug!(?kind, from = %sender, "handshake message outside pairing mode ignored");
            return;
        }

        match (self.config.role, kind) {
            (DeviceRole::Slave, MessageType::Request) => {
                self.answer_request(&mut state, sender, msg.mac)
            }
            (DeviceRole::Master, MessageType::Response) => {
                self.accept_response(&mut state, sender, msg.mac)
            }
            (DeviceRole::Slave, MessageType::Confirm) => self.accept_confirm(&mut state, msg.mac),
            (role, kind) => debug!(%role, ?kind, "no handshake action for this role"),
        }
    }

    /// SLAVE ← REQUEST: register the requester and answer with our address.
    ///
    /// A SLAVE that would refuse the requester's CONFIRM stays silent, so a
    /// MASTER never ends up paired on its own.
    fn answer_request(&self, state: &mut EngineState, sender: MacAddress, carried: MacAddress) {
        info!(from = %sender, "received PAIR_REQUEST");
        if self.keeps_existing_peer(state, carried) {
            return;
        }
        if let Err(e) = state
            .peers
            .upsert(self.transport.as_ref(), sender, self.config.channel)
        {
            warn!(peer = %sender, "could not register requester: {e}");
        }
        let response = PairingMessage::new(MessageType::Response, self.transport.local_address());
        self.send_handshake(sender, &response, "PAIR_RESPONSE");
    }

    /// MASTER ← RESPONSE: adopt the responder, confirm, leave pairing mode.
    fn accept_response(&self, state: &mut EngineState, sender: MacAddress, carried: MacAddress) {
        info!(from = %sender, peer = %carried, "received PAIR_RESPONSE");
        if !self.may_adopt(state, carried) {
            return;
        }
        self.adopt(state, carried);

        let confirm = PairingMessage::new(MessageType::Confirm, self.transport.local_address());
        if let Err(e) = state
            .peers
            .upsert(self.transport.as_ref(), carried, self.config.channel)
        {
            warn!(peer = %carried, "could not register paired peer: {e}");
        }
        self.send_handshake(sender, &confirm, "PAIR_CONFIRM");

        state.pairing_mode = false;
        info!("exiting pairing mode");
    }

    /// SLAVE ← CONFIRM: adopt the MASTER and leave pairing mode.
    fn accept_confirm(&self, state: &mut EngineState, carried: MacAddress) {
        info!(peer = %carried, "received PAIR_CONFIRM");
        if !self.may_adopt(state, carried) {
            return;
        }
        self.adopt(state, carried);

        state.pairing_mode = false;
        info!("exiting pairing mode");

        if let Err(e) = state
            .peers
            .upsert(self.transport.as_ref(), carried, self.config.channel)
        {
            warn!(peer = %carried, "could not register paired peer: {e}");
        }
    }

    fn may_adopt(&self, state: &EngineState, carried: MacAddress) -> bool {
        if carried.is_broadcast() {
            warn!("handshake message carries the broadcast address; ignored");
            return false;
        }
        !self.keeps_existing_peer(state, carried)
    }

    fn keeps_existing_peer(&self, state: &EngineState, offered: MacAddress) -> bool {
        let keep = self.config.repair_policy == RepairPolicy::KeepExisting
            && state.status == PairingStatus::Paired
            && state.paired_address != offered;
        if keep {
            info!(
                current = %state.paired_address,
                offered = %offered,
                "already paired; keeping existing peer"
            );
        }
        keep
    }

    fn adopt(&self, state: &mut EngineState, peer: MacAddress) {
        state.paired_address = peer;
        state.status = PairingStatus::Paired;
        match self
            .persistence
            .save(&PairingRecord::new(peer, PairingStatus::Paired))
        {
            Ok(()) => info!(peer = %peer, "paired address saved"),
            Err(e) => error!(peer = %peer, "failed to persist pairing record: {e}"),
        }
    }

    fn send_handshake(&self, destination: MacAddress, msg: &PairingMessage, label: &str) {
        let bytes = match encode_message(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode {label}: {e}");
                return;
            }
        };
        match self.transport.send(destination, &bytes) {
            Ok(()) => info!(to = %destination, "sent {label}"),
            Err(e) => warn!(to = %destination, "sending {label} failed: {e}"),
        }
    }

    fn forward_to_application(&self, sender: MacAddress, payload: &[u8]) {
        let callback = self
            .receive_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(sender, payload);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
