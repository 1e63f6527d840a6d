//! The persisted pairing record.
//!
//! A node keeps exactly one record in non-volatile storage:
//!
//! ```text
//! offset 0  [mac:6]     peer hardware address (FF:FF:FF:FF:FF:FF when unset)
//! offset 6  [status:1]  0x00 = unpaired, 0x01 = paired
//! ```
//!
//! There is no checksum.  A factory-fresh or corrupted store can hand back
//! any status byte, so a loaded record is never trusted directly; callers go
//! through [`PairingRecord::normalize`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::pairing::PairingStatus;
use crate::protocol::address::MacAddress;

/// Offset of the record inside the non-volatile region.
pub const RECORD_OFFSET: usize = 0;

/// Size of the record in bytes.
pub const RECORD_LEN: usize = 7;

/// Raw pairing record as stored.  Field order is the storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRecord {
    pub address: MacAddress,
    pub status_code: u8,
}

impl PairingRecord {
    pub fn new(address: MacAddress, status: PairingStatus) -> Self {
        Self {
            address,
            status_code: status.code(),
        }
    }

    /// The record written by a pairing clear: sentinel address, unpaired.
    pub fn cleared() -> Self {
        Self::new(MacAddress::BROADCAST, PairingStatus::Unpaired)
    }

    /// Interprets a loaded record.
    ///
    /// Only status 0x01 with a unicast address counts as paired.  Every other
    /// combination (including erased `0xFF` bytes and a "paired" flag next to
    /// the broadcast address) is treated as unpaired, and the address is
    /// reset to the sentinel so no stale peer leaks into the engine.
    pub fn normalize(&self) -> (MacAddress, PairingStatus) {
        match PairingStatus::from_code(self.status_code) {
            Some(PairingStatus::Paired) if !self.address.is_broadcast() => {
                (self.address, PairingStatus::Paired)
            }
            Some(PairingStatus::Paired) => {
                warn!("stored record is marked paired but holds the broadcast address; treating as unpaired");
                (MacAddress::BROADCAST, PairingStatus::Unpaired)
            }
            Some(PairingStatus::Unpaired) => (MacAddress::BROADCAST, PairingStatus::Unpaired),
            None => {
                warn!(
                    status = self.status_code,
                    "stored pairing status is not a known code (uninitialised store?); treating as unpaired"
                );
                (MacAddress::BROADCAST, PairingStatus::Unpaired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]);

    #[test]
    fn test_cleared_record_is_sentinel_and_unpaired() {
        let record = PairingRecord::cleared();
        assert!(record.address.is_broadcast());
        assert_eq!(record.status_code, 0x00);
    }

    #[test]
    fn test_normalize_trusts_paired_unicast_record() {
        let record = PairingRecord::new(PEER, PairingStatus::Paired);
        assert_eq!(record.normalize(), (PEER, PairingStatus::Paired));
    }

    #[test]
    fn test_normalize_treats_erased_store_as_unpaired() {
        // Arrange: erased flash reads back all 0xFF
        let record = PairingRecord {
            address: MacAddress::BROADCAST,
            status_code: 0xFF,
        };

        // Act / Assert
        assert_eq!(
            record.normalize(),
            (MacAddress::BROADCAST, PairingStatus::Unpaired)
        );
    }

    #[test]
    fn test_normalize_rejects_unknown_status_even_with_unicast_address() {
        let record = PairingRecord {
            address: PEER,
            status_code: 0x7E,
        };
        assert_eq!(
            record.normalize(),
            (MacAddress::BROADCAST, PairingStatus::Unpaired)
        );
    }

    #[test]
    fn test_normalize_rejects_paired_flag_on_broadcast_address() {
        let record = PairingRecord::new(MacAddress::BROADCAST, PairingStatus::Paired);
        assert_eq!(record.normalize().1, PairingStatus::Unpaired);
    }

    #[test]
    fn test_normalize_drops_stale_address_when_unpaired() {
        let record = PairingRecord::new(PEER, PairingStatus::Unpaired);
        assert_eq!(record.normalize().0, MacAddress::BROADCAST);
    }
}
