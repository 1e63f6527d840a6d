//! Pairing status, device role, and re-pairing policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a node holds a trusted peer address.
///
/// The discriminants are the status codes written to non-volatile storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PairingStatus {
    /// No trusted peer (stored as 0x00).
    #[default]
    Unpaired = 0x00,
    /// Handshake completed; the peer address is trusted (stored as 0x01).
    Paired = 0x01,
}

impl PairingStatus {
    /// Returns the storage code for this status.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Maps a storage code back to a status; unknown codes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(PairingStatus::Unpaired),
            0x01 => Some(PairingStatus::Paired),
            _ => None,
        }
    }
}

/// Which side of the handshake a node plays.  Fixed for the node's lifetime.
///
/// The protocol is asymmetric: only a SLAVE answers REQUEST and consumes
/// CONFIRM, only a MASTER consumes RESPONSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Master,
    Slave,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Master => f.write_str("master"),
            DeviceRole::Slave => f.write_str("slave"),
        }
    }
}

impl FromStr for DeviceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(DeviceRole::Master),
            "slave" => Ok(DeviceRole::Slave),
            other => Err(format!("unknown role {other:?}; expected \"master\" or \"slave\"")),
        }
    }
}

/// What a node does when, already paired, a completing handshake message
/// names a *different* peer.
///
/// The handshake carries no session state, so a stray or late RESPONSE (on a
/// MASTER) or CONFIRM (on a SLAVE) that arrives while pairing mode is open is
/// indistinguishable from a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairPolicy {
    /// Adopt the newest peer.  Whoever completes the handshake last wins.
    #[default]
    LastResponderWins,
    /// Keep the current peer; the operator must clear pairing first.  A
    /// paired SLAVE also leaves REQUESTs from other MASTERs unanswered.
    KeepExisting,
}
