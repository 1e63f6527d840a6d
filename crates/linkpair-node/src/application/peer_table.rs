//! PeerTable: the engine's view of which addresses are registered with the
//! transport.
//!
//! Current policy never holds more than the paired peer plus the transient
//! broadcast entry used during discovery, but the table is a full
//! address → entry map so nothing here assumes a single peer.

use std::collections::HashMap;

use linkpair_core::MacAddress;
use tracing::{debug, warn};

use crate::application::transport::{PeerInfo, Transport, TransportError};

/// Per-peer metadata mirrored from the transport registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    pub channel: u8,
    pub encrypt: bool,
}

/// In-memory mirror of the transport's peer list.
#[derive(Debug, Default)]
pub struct PeerTable {
    entries: HashMap<MacAddress, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)registers `address` on `channel`, unencrypted.
    ///
    /// Any existing transport registration for the address is removed first,
    /// so calling this repeatedly for the same address leaves exactly one
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns the transport's rejection of the add.  The address is then
    /// absent from both the transport and this table.
    pub fn upsert(
        &mut self,
        transport: &dyn Transport,
        address: MacAddress,
        channel: u8,
    ) -> Result<(), TransportError> {
        match transport.remove_peer(address) {
            Ok(()) | Err(TransportError::UnknownPeer(_)) => {}
            Err(e) => debug!(peer = %address, "removing stale peer failed: {e}"),
        }
        self.entries.remove(&address);

        let info = PeerInfo::unencrypted(address, channel);
        transport.add_peer(info).map_err(|e| {
            warn!(peer = %address, "failed to add peer: {e}");
            e
        })?;

        self.entries.insert(
            address,
            PeerEntry {
                channel,
                encrypt: info.encrypt,
            },
        );
        debug!(peer = %address, channel, "peer registered");
        Ok(())
    }

    /// Removes `address` if present; no-op otherwise.
    pub fn remove(&mut self, transport: &dyn Transport, address: MacAddress) {
        if self.entries.remove(&address).is_some() {
            if let Err(e) = transport.remove_peer(address) {
                debug!(peer = %address, "transport peer removal failed: {e}");
            }
        }
    }

    pub fn contains(&self, address: MacAddress) -> bool {
        self.entries.contains_key(&address)
    }

    pub fn get(&self, address: MacAddress) -> Option<&PeerEntry> {
        self.entries.get(&address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered addresses, sorted for stable output.
    pub fn addresses(&self) -> Vec<MacAddress> {
        let mut addresses: Vec<MacAddress> = self.entries.keys().copied().collect();
        addresses.sort();
        addresses
    }
}
