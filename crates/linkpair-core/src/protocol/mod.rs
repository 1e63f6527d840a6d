//! Protocol module containing the hardware address type, message types, and
//! the fixed-layout codec.

pub mod address;
pub mod codec;
pub mod messages;

pub use address::MacAddress;
pub use codec::{decode_message, decode_record, encode_message, encode_record, ProtocolError};
pub use messages::*;
