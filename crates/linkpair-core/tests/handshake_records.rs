//! Integration tests for the linkpair-core records.
//!
//! These tests drive the public API the way a node does: build the record a
//! handshake step would send, put it on the wire, and read it back on the
//! other side; save a pairing record and load it after a simulated reboot.

use linkpair_core::{
    decode_message, decode_record, encode_message, encode_record,
    protocol::messages::{APP_COMMAND_TYPE, PAIRING_MESSAGE_LEN},
    MacAddress, MessageType, PairingMessage, PairingRecord, PairingStatus,
};

const MASTER: MacAddress = MacAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
const SLAVE: MacAddress = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

#[test]
fn test_every_handshake_step_is_fifteen_bytes_on_the_wire() {
    for (kind, sender) in [
        (MessageType::Request, MASTER),
        (MessageType::Response, SLAVE),
        (MessageType::Confirm, MASTER),
    ] {
        let bytes = encode_message(&PairingMessage::new(kind, sender)).expect("encode");
        assert_eq!(bytes.len(), PAIRING_MESSAGE_LEN, "{kind:?}");
        assert_eq!(bytes[0], kind as u8);
        assert_eq!(&bytes[1..7], &sender.octets());
    }
}

#[test]
fn test_response_carries_slave_address_to_master() {
    // Arrange: the SLAVE answers a REQUEST
    let wire = encode_message(&PairingMessage::new(MessageType::Response, SLAVE)).unwrap();

    // Act: the MASTER decodes what arrived
    let received = decode_message(&wire).expect("decode");

    // Assert
    assert_eq!(received.kind(), Some(MessageType::Response));
    assert_eq!(received.mac.to_string(), "AA:BB:CC:DD:EE:FF");
}

#[test]
fn test_application_command_shares_framing_but_is_not_a_handshake_step() {
    let wire = encode_message(&PairingMessage::application(MASTER, *b"A-BUTTON")).unwrap();

    let received = decode_message(&wire).unwrap();

    assert_eq!(received.message_type, APP_COMMAND_TYPE);
    assert_eq!(received.kind(), None);
    assert_eq!(&received.data, b"A-BUTTON");
}

#[test]
fn test_unknown_type_byte_decodes_without_a_kind() {
    let mut wire = encode_message(&PairingMessage::new(MessageType::Request, MASTER)).unwrap();
    wire[0] = 0x7F;

    let received = decode_message(&wire).unwrap();

    assert_eq!(received.kind(), None);
}

#[test]
fn test_saved_record_survives_reboot_byte_for_byte() {
    // Arrange
    let record = PairingRecord::new(SLAVE, PairingStatus::Paired);
    let stored = encode_record(&record).unwrap();

    // Act: "reboot" and read the same region back
    let loaded = decode_record(&stored).unwrap();

    // Assert
    assert_eq!(loaded, record);
    assert_eq!(loaded.normalize(), (SLAVE, PairingStatus::Paired));
}

#[test]
fn test_factory_fresh_region_loads_as_unpaired() {
    let erased = [0xFFu8; 7];

    let (address, status) = decode_record(&erased).unwrap().normalize();

    assert!(address.is_broadcast());
    assert_eq!(status, PairingStatus::Unpaired);
}
