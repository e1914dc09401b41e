use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_fixed_header, HeaderParse, ParseError, ParseOk};

/// DISCONNECT: the client's final packet before closing the transport.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttDisconnect;

impl MqttDisconnect {
    pub fn new() -> Self {
        Self
    }
}

impl MqttControlPacket for MqttDisconnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::DISCONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::DISCONNECT as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };

        if hdr.flags() != 0x00 {
            return Err(ParseError::Malformed(
                "DISCONNECT fixed header flags must be 0".to_string(),
            ));
        }
        if hdr.remaining_len != 0 {
            return Err(ParseError::Malformed(
                "DISCONNECT remaining length must be 0".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Disconnect(MqttDisconnect::new()),
            hdr.total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_wire_layout() {
        assert_eq!(MqttDisconnect::new().to_bytes().unwrap(), vec![0xE0, 0x00]);
    }

    #[test]
    fn test_disconnect_roundtrip() {
        match MqttDisconnect::from_bytes(&[0xE0, 0x00]).unwrap() {
            ParseOk::Packet(MqttPacket::Disconnect(_), 2) => {}
            other => panic!("expected DISCONNECT, got {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_nonzero_length_rejected() {
        assert!(matches!(
            MqttDisconnect::from_bytes(&[0xE0, 0x02, 0x00, 0x00]),
            Err(ParseError::Malformed(_))
        ));
    }
}
