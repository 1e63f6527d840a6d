//! Transport port: the link-layer collaborator the pairing engine drives.
//!
//! The engine never talks to a radio directly.  It depends on the
//! [`Transport`] trait, and the infrastructure layer supplies an
//! implementation (an in-memory medium for tests, a UDP link emulation for
//! the CLI, a real radio driver on hardware).
//!
//! # Notification model
//!
//! A transport delivers two kinds of asynchronous notification to exactly one
//! [`TransportObserver`]:
//!
//! - **receive** – a frame arrived, with the link-level sender address;
//! - **send completion** – a previously issued send was (or was not) delivered.
//!
//! Notifications may arrive on any thread, concurrently with application
//! calls into the engine.  The transport holds the observer weakly so an
//! engine and its transport never keep each other alive.

use std::sync::Weak;

use linkpair_core::MacAddress;
use thiserror::Error;

/// Error type for transport operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Link bring-up failed (radio off, socket could not be bound, ...).
    #[error("link initialisation failed: {0}")]
    InitFailed(String),
    /// An operation was attempted before a successful `init`.
    #[error("transport is not initialised")]
    NotInitialised,
    /// The peer list is full.
    #[error("peer list is full ({capacity} entries)")]
    PeerLimit { capacity: usize },
    /// The peer is already registered.
    #[error("peer {0} is already registered")]
    PeerExists(MacAddress),
    /// The destination is not a registered peer.
    #[error("peer {0} is not registered")]
    UnknownPeer(MacAddress),
    /// Payload exceeds what one frame can carry.
    #[error("payload of {len} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },
    /// Any other link-level failure.
    #[error("link error: {0}")]
    Link(String),
}

/// Outcome reported by a send-completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Delivered,
    Failed,
}

/// Transport-level peer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: MacAddress,
    /// Logical channel the peer is reachable on.
    pub channel: u8,
    /// Link-layer encryption; LinkPair always registers peers unencrypted.
    pub encrypt: bool,
}

impl PeerInfo {
    /// An unencrypted peer on `channel`.
    pub fn unencrypted(address: MacAddress, channel: u8) -> Self {
        Self {
            address,
            channel,
            encrypt: false,
        }
    }
}

/// Sink for transport notifications.
///
/// Implementations must not block: they run on the transport's notification
/// context.
pub trait TransportObserver: Send + Sync {
    /// A frame arrived from `sender`.
    fn on_receive(&self, sender: MacAddress, payload: &[u8]);

    /// A send to `destination` completed with `status`.
    fn on_send_complete(&self, destination: MacAddress, status: SendStatus);
}

/// Unreliable, connectionless, broadcast-capable link addressed by
/// [`MacAddress`].
///
/// Sends are fire-and-forget: `Ok(())` means the frame was handed to the
/// link, not that it arrived.  Delivery is reported later (and only
/// informationally) through [`TransportObserver::on_send_complete`].
pub trait Transport: Send + Sync {
    /// Brings the link up on `channel`.
    fn init(&self, channel: u8) -> Result<(), TransportError>;

    /// Registers the single observer for receive and send-completion
    /// notifications, replacing any previous one.
    fn register_observer(&self, observer: Weak<dyn TransportObserver>);

    /// This node's own hardware address.
    fn local_address(&self) -> MacAddress;

    /// Adds a peer.  Fails with [`TransportError::PeerExists`] if present.
    fn add_peer(&self, peer: PeerInfo) -> Result<(), TransportError>;

    /// Removes a peer.  Fails with [`TransportError::UnknownPeer`] if absent.
    fn remove_peer(&self, address: MacAddress) -> Result<(), TransportError>;

    /// Sends `payload` to `destination`, which must be a registered peer.
    fn send(&self, destination: MacAddress, payload: &[u8]) -> Result<(), TransportError>;
}
