//! Handshake message types.
//!
//! Every handshake packet is the same fixed-layout record:
//!
//! ```text
//! [type:1][mac:6][data:8]      = 15 bytes
//! ```
//!
//! `type` values 0x01–0x03 belong to the pairing protocol.  Any other value
//! (for example [`APP_COMMAND_TYPE`]) belongs to the application and is never
//! interpreted by the pairing engine.

use serde::{Deserialize, Serialize};

use crate::protocol::address::MacAddress;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the fixed handshake record on the wire.
pub const PAIRING_MESSAGE_LEN: usize = 15;

/// Size of the opaque `data` field carried by every record.
pub const MESSAGE_DATA_LEN: usize = 8;

/// Record type reserved for application commands sharing the handshake framing.
pub const APP_COMMAND_TYPE: u8 = 0x10;

// ── Message type codes ────────────────────────────────────────────────────────

/// Type codes reserved to the pairing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// MASTER → broadcast: "is anyone out there pairing?"
    Request = 0x01,
    /// SLAVE → MASTER: "I am, and this is my address."
    Response = 0x02,
    /// MASTER → SLAVE: "accepted, this is my address."
    Confirm = 0x03,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Request),
            0x02 => Ok(MessageType::Response),
            0x03 => Ok(MessageType::Confirm),
            _ => Err(()),
        }
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// The fixed 15-byte record exchanged during the handshake.
///
/// Field order matches the wire layout; the codec relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingMessage {
    /// Raw type byte.  Kept raw because application values share the framing.
    pub message_type: u8,
    /// Hardware address of the node that built the record.
    pub mac: MacAddress,
    /// Opaque payload; zero for handshake records.
    pub data: [u8; MESSAGE_DATA_LEN],
}

impl PairingMessage {
    /// Builds a handshake record of the given kind carrying `sender`.
    pub fn new(kind: MessageType, sender: MacAddress) -> Self {
        Self {
            message_type: kind as u8,
            mac: sender,
            data: [0; MESSAGE_DATA_LEN],
        }
    }

    /// Builds an application command record ([`APP_COMMAND_TYPE`]).
    pub fn application(sender: MacAddress, data: [u8; MESSAGE_DATA_LEN]) -> Self {
        Self {
            message_type: APP_COMMAND_TYPE,
            mac: sender,
            data,
        }
    }

    /// Returns the protocol message type, or `None` for non-protocol records.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::try_from(self.message_type).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_try_from_known_codes() {
        assert_eq!(MessageType::try_from(0x01), Ok(MessageType::Request));
        assert_eq!(MessageType::try_from(0x02), Ok(MessageType::Response));
        assert_eq!(MessageType::try_from(0x03), Ok(MessageType::Confirm));
    }

    #[test]
    fn test_message_type_try_from_rejects_app_and_zero() {
        assert!(MessageType::try_from(0x00).is_err());
        assert!(MessageType::try_from(APP_COMMAND_TYPE).is_err());
    }

    #[test]
    fn test_new_record_has_zeroed_data() {
        let mac = MacAddress::new([1, 2, 3, 4, 5, 6]);
        let msg = PairingMessage::new(MessageType::Confirm, mac);

        assert_eq!(msg.message_type, 0x03);
        assert_eq!(msg.mac, mac);
        assert_eq!(msg.data, [0; 8]);
        assert_eq!(msg.kind(), Some(MessageType::Confirm));
    }

    #[test]
    fn test_application_record_is_not_a_protocol_kind() {
        let msg = PairingMessage::application(MacAddress::BROADCAST, [9; 8]);
        assert_eq!(msg.message_type, APP_COMMAND_TYPE);
        assert_eq!(msg.kind(), None);
    }
}
