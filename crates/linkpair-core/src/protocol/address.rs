//! Six-byte link-layer hardware addresses.
//!
//! Every node on the link is identified by a 48-bit hardware address written
//! as six colon-separated hex octets (`AA:BB:CC:DD:EE:FF`).  The all-ones
//! address is the broadcast address; LinkPair also uses it as the "no peer"
//! sentinel while a node is unpaired.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Number of octets in a hardware address.
pub const MAC_LEN: usize = 6;

/// Error returned when a textual hardware address cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMacError {
    /// The string does not contain exactly six octets.
    #[error("expected 6 octets, found {0}")]
    WrongOctetCount(usize),
    /// One of the octets is not a two-digit hex number.
    #[error("invalid octet {0:?}")]
    InvalidOctet(String),
    /// The address has the group bit set, so it cannot name one station.
    #[error("{0} is a group address, not a station address")]
    NotUnicast(MacAddress),
}

/// A 48-bit link-layer hardware address.
///
/// Serialises as six raw bytes, so it drops straight into the fixed-layout
/// wire and storage records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl MacAddress {
    /// The broadcast address, also the unpaired sentinel.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_LEN]);

    /// Creates an address from raw octets.
    pub const fn new(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets.
    pub const fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    /// Returns `true` for `FF:FF:FF:FF:FF:FF`.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns `true` when the group bit (0x01 of the first octet) is set.
    /// The broadcast address is a group address.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Generates a random unicast, locally-administered address.
    ///
    /// Used by emulated links that have no burned-in address.  The first
    /// octet has the locally-administered bit (0x02) set and the group bit
    /// (0x01) cleared, so the result can never collide with the broadcast
    /// address or a vendor-assigned one.
    pub fn generate_local() -> Self {
        let random = Uuid::new_v4();
        let bytes = random.as_bytes();
        let mut octets = [0u8; MAC_LEN];
        octets.copy_from_slice(&bytes[..MAC_LEN]);
        octets[0] = (octets[0] | 0x02) & !0x01;
        Self(octets)
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        Self::BROADCAST
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(octets: [u8; MAC_LEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `:` or `-` separated hex octets, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(|c| c == ':' || c == '-').collect();
        if parts.len() != MAC_LEN {
            return Err(ParseMacError::WrongOctetCount(parts.len()));
        }

        let mut octets = [0u8; MAC_LEN];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidOctet(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
