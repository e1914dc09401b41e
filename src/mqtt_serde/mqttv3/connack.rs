// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_fixed_header, HeaderParse, ParseError, ParseOk};

/// CONNACK: the broker's answer to a CONNECT.
///
/// Return code 0 accepts the connection; codes 1–5 refuse it with a
/// stated reason. Anything above 5 is a malformed frame.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl MqttConnAck {
    pub fn new(session_present: bool, return_code: u8) -> Self {
        Self {
            session_present,
            return_code,
        }
    }

    /// Broker-side refusal reason, per the v3.1.1 return-code table.
    pub fn reason(&self) -> &'static str {
        match self.return_code {
            0 => "connection accepted",
            1 => "unacceptable protocol version",
            2 => "identifier rejected",
            3 => "server unavailable",
            4 => "bad user name or password",
            5 => "not authorized",
            _ => "unknown return code",
        }
    }
}

impl MqttControlPacket for MqttConnAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        if self.return_code > 5 {
            return Err(ParseError::Malformed(
                "invalid CONNACK return code".to_string(),
            ));
        }
        Ok(vec![self.session_present as u8, self.return_code])
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(Vec::new())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::CONNACK as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };

        if hdr.flags() != 0x00 {
            return Err(ParseError::Malformed(
                "CONNACK fixed header flags must be 0".to_string(),
            ));
        }
        if hdr.remaining_len != 2 {
            return Err(ParseError::Malformed(
                "CONNACK remaining length must be 2".to_string(),
            ));
        }

        let ack_flags = buffer[hdr.body_offset];
        if ack_flags & 0xFE != 0 {
            return Err(ParseError::Malformed(
                "CONNACK acknowledge flags reserved bits must be 0".to_string(),
            ));
        }
        let return_code = buffer[hdr.body_offset + 1];
        if return_code > 5 {
            return Err(ParseError::Malformed(
                "invalid CONNACK return code".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::ConnAck(MqttConnAck::new(ack_flags == 0x01, return_code)),
            hdr.total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connack_wire_layout() {
        let connack = MqttConnAck::new(true, 0x00);
        assert_eq!(connack.to_bytes().unwrap(), vec![0x20, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_connack_roundtrip() {
        let original = MqttConnAck::new(false, 0x05);
        let bytes = original.to_bytes().unwrap();
        match MqttConnAck::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::ConnAck(parsed), consumed) => {
                assert_eq!(original, parsed);
                assert_eq!(consumed, 4);
            }
            _ => panic!("Expected CONNACK packet"),
        }
    }

    #[test]
    fn test_connack_short_remaining_length_rejected() {
        // Declared remaining length 1 with a single body byte: shorter
        // than the two mandatory variable-header bytes.
        let bytes = vec![0x20, 0x01, 0x00];
        assert!(matches!(
            MqttConnAck::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_connack_invalid_return_code() {
        let bytes = vec![0x20, 0x02, 0x00, 0x06];
        assert!(MqttConnAck::from_bytes(&bytes).is_err());
        assert!(MqttConnAck::new(false, 6).to_bytes().is_err());
    }

    #[test]
    fn test_connack_reserved_ack_flags_rejected() {
        let bytes = vec![0x20, 0x02, 0x02, 0x00];
        assert!(matches!(
            MqttConnAck::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_connack_reason_text() {
        assert_eq!(MqttConnAck::new(false, 5).reason(), "not authorized");
        assert_eq!(MqttConnAck::new(false, 0).reason(), "connection accepted");
    }
}
