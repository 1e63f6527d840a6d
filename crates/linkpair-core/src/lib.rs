//! # linkpair-core
//!
//! Shared library for LinkPair containing the handshake record codec,
//! hardware addresses, and the pairing domain types.
//!
//! This crate is used by every node regardless of role.  It has zero
//! dependencies on radios, sockets, or storage devices.
//!
//! # Architecture overview (for beginners)
//!
//! LinkPair lets two radio nodes that have never met (a MASTER and a SLAVE)
//! find each other over a broadcast link, agree on each other's hardware
//! address with a three-message handshake, and remember that address across
//! power cycles so later sessions talk to each other directly.
//!
//! ```text
//!  MASTER                                   SLAVE
//!    │ ── REQUEST  (to FF:FF:FF:FF:FF:FF) ──► │
//!    │ ◄── RESPONSE (carries SLAVE address) ─ │
//!    │ ── CONFIRM  (carries MASTER address) ─► │
//!  PAIRED                                  PAIRED
//! ```
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the link.  Every handshake packet
//!   is a fixed 15-byte record `[type:1][mac:6][data:8]`, and the persisted
//!   pairing state is a fixed 7-byte record `[mac:6][status:1]`.
//!
//! - **`domain`** – Pure pairing vocabulary: the pairing status, the device
//!   role, the re-pairing policy, and the rules for trusting a persisted
//!   record read back from a possibly-uninitialised store.

pub mod domain;
pub mod protocol;

pub use domain::pairing::{DeviceRole, PairingStatus, RepairPolicy};
pub use domain::record::PairingRecord;
pub use protocol::address::MacAddress;
pub use protocol::codec::{decode_message, decode_record, encode_message, encode_record, ProtocolError};
pub use protocol::messages::{MessageType, PairingMessage};
