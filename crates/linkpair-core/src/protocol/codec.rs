//! Fixed-layout codec for the handshake record and the persisted pairing record.
//!
//! Wire format (handshake):
//! ```text
//! [type:1][mac:6][data:8]
//! ```
//! Storage format (pairing record, offset 0 of the non-volatile region):
//! ```text
//! [mac:6][status:1]
//! ```
//! Neither record has a header, length prefix, or checksum.  Both are
//! produced with bincode's fixed-int legacy encoding, which lays out the
//! byte fields in declaration order with no padding, so the struct
//! definitions in [`crate::protocol::messages`] and [`crate::domain::record`]
//! *are* the layout.
//!
//! A received frame longer than [`PAIRING_MESSAGE_LEN`] is still decoded from
//! its first 15 bytes; the trailing bytes belong to the application.

use thiserror::Error;

use crate::domain::record::{PairingRecord, RECORD_LEN};
use crate::protocol::messages::{PairingMessage, PAIRING_MESSAGE_LEN};

/// Errors that can occur during record encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the fixed record.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// bincode rejected the bytes or the value.
    #[error("malformed record: {0}")]
    Malformed(String),
}

// ── Handshake record ──────────────────────────────────────────────────────────

/// Encodes a [`PairingMessage`] into its 15-byte wire form.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use linkpair_core::{encode_message, MacAddress, MessageType, PairingMessage};
///
/// let mac = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
/// let bytes = encode_message(&PairingMessage::new(MessageType::Response, mac)).unwrap();
/// assert_eq!(bytes.len(), 15);
/// assert_eq!(&bytes[..7], &[0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
/// ```
pub fn encode_message(msg: &PairingMessage) -> Result<Vec<u8>, ProtocolError> {
    let bytes = bincode::serialize(msg).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    debug_assert_eq!(bytes.len(), PAIRING_MESSAGE_LEN);
    Ok(bytes)
}

/// Decodes a [`PairingMessage`] from the first 15 bytes of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when `bytes` is shorter than
/// the fixed record.
pub fn decode_message(bytes: &[u8]) -> Result<PairingMessage, ProtocolError> {
    if bytes.len() < PAIRING_MESSAGE_LEN {
        return Err(ProtocolError::InsufficientData {
            needed: PAIRING_MESSAGE_LEN,
            available: bytes.len(),
        });
    }
    bincode::deserialize(&bytes[..PAIRING_MESSAGE_LEN])
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}

// ── Pairing record ────────────────────────────────────────────────────────────

/// Encodes a [`PairingRecord`] into its 7-byte storage form.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_record(record: &PairingRecord) -> Result<Vec<u8>, ProtocolError> {
    let bytes =
        bincode::serialize(record).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    debug_assert_eq!(bytes.len(), RECORD_LEN);
    Ok(bytes)
}

/// Decodes a [`PairingRecord`] from the first 7 bytes of `bytes`.
///
/// The status byte is returned as stored; see [`PairingRecord::normalize`].
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than 7 bytes are given.
pub fn decode_record(bytes: &[u8]) -> Result<PairingRecord, ProtocolError> {
    if bytes.len() < RECORD_LEN {
        return Err(ProtocolError::InsufficientData {
            needed: RECORD_LEN,
            available: bytes.len(),
        });
    }
    bincode::deserialize(&bytes[..RECORD_LEN]).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pairing::PairingStatus;
    use crate::protocol::address::MacAddress;
    use crate::protocol::messages::{MessageType, APP_COMMAND_TYPE};

    const PEER: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn test_encode_message_produces_exact_wire_layout() {
        // Arrange
        let mut msg = PairingMessage::new(MessageType::Request, PEER);
        msg.data = [1, 2, 3, 4, 5, 6, 7, 8];

        // Act
        let bytes = encode_message(&msg).expect("encode");

        // Assert
        assert_eq!(
            bytes,
            vec![0x01, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_decode_message_reads_fields_from_wire_layout() {
        let bytes = [0x03, 1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0, 0, 0x42];

        let msg = decode_message(&bytes).expect("decode");

        assert_eq!(msg.kind(), Some(MessageType::Confirm));
        assert_eq!(msg.mac, MacAddress::new([1, 2, 3, 4, 5, 6]));
        assert_eq!(msg.data[7], 0x42);
    }

    #[test]
    fn test_decode_message_rejects_short_frame() {
        let result = decode_message(&[0x01, 0xAA, 0xBB]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData {
                needed: 15,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_message_ignores_trailing_application_bytes() {
        // Arrange: a 20-byte application frame whose prefix happens to look like a record
        let mut bytes = encode_message(&PairingMessage::application(PEER, [7; 8])).unwrap();
        bytes.extend_from_slice(b"extra");

        // Act
        let msg = decode_message(&bytes).expect("decode prefix");

        // Assert
        assert_eq!(msg.message_type, APP_COMMAND_TYPE);
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn test_encode_record_layout_is_address_then_status() {
        let record = PairingRecord::new(PEER, PairingStatus::Paired);

        let bytes = encode_record(&record).expect("encode");

        assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x01]);
    }

    #[test]
    fn test_decode_record_keeps_raw_status_byte() {
        let bytes = [0xFF; 7];

        let record = decode_record(&bytes).expect("decode");

        assert!(record.address.is_broadcast());
        assert_eq!(record.status_code, 0xFF);
    }

    #[test]
    fn test_decode_record_rejects_short_region() {
        assert!(matches!(
            decode_record(&[0u8; 6]),
            Err(ProtocolError::InsufficientData { needed: 7, .. })
        ));
    }
}
