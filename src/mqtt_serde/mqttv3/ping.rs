// SPDX-License-Identifier: MPL-2.0

//! Keepalive frames. Both directions are body-less: a type byte and a
//! zero remaining length.

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_fixed_header, HeaderParse, ParseError, ParseOk};

macro_rules! empty_packet {
    ($name:ident, $variant:ident, $ptype:ident, $label:literal) => {
        #[doc = concat!($label, ": carries no variable header and no payload.")]
        #[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
        #[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
        pub struct $name;

        impl $name {
            pub fn new() -> Self {
                Self
            }
        }

        impl MqttControlPacket for $name {
            fn control_packet_type(&self) -> u8 {
                ControlPacketType::$ptype as u8
            }

            fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
                Ok(Vec::new())
            }

            fn payload(&self) -> Result<Vec<u8>, ParseError> {
                Ok(Vec::new())
            }

            fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
                if packet_type(buffer)? != ControlPacketType::$ptype as u8 {
                    return Err(ParseError::InvalidPacketType);
                }

                let hdr = match parse_fixed_header(buffer)? {
                    HeaderParse::Complete(hdr) => hdr,
                    HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
                };

                if hdr.flags() != 0x00 {
                    return Err(ParseError::Malformed(concat!(
                        $label,
                        " fixed header flags must be 0"
                    )
                    .to_string()));
                }
                if hdr.remaining_len != 0 {
                    return Err(ParseError::Malformed(concat!(
                        $label,
                        " remaining length must be 0"
                    )
                    .to_string()));
                }

                Ok(ParseOk::Packet(
                    MqttPacket::$variant($name::new()),
                    hdr.total_len,
                ))
            }
        }
    };
}

empty_packet!(MqttPingReq, PingReq, PINGREQ, "PINGREQ");
empty_packet!(MqttPingResp, PingResp, PINGRESP, "PINGRESP");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pingreq_wire_layout() {
        assert_eq!(MqttPingReq::new().to_bytes().unwrap(), vec![0xC0, 0x00]);
    }

    #[test]
    fn test_pingresp_wire_layout() {
        assert_eq!(MqttPingResp::new().to_bytes().unwrap(), vec![0xD0, 0x00]);
    }

    #[test]
    fn test_ping_roundtrips() {
        match MqttPingReq::from_bytes(&[0xC0, 0x00]).unwrap() {
            ParseOk::Packet(MqttPacket::PingReq(_), 2) => {}
            other => panic!("expected PINGREQ, got {:?}", other),
        }
        match MqttPingResp::from_bytes(&[0xD0, 0x00]).unwrap() {
            ParseOk::Packet(MqttPacket::PingResp(_), 2) => {}
            other => panic!("expected PINGRESP, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_nonzero_length_rejected() {
        assert!(matches!(
            MqttPingResp::from_bytes(&[0xD0, 0x01, 0x00]),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_ping_invalid_flags_rejected() {
        assert!(matches!(
            MqttPingReq::from_bytes(&[0xC4, 0x00]),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_ping_truncated_continues() {
        match MqttPingReq::from_bytes(&[0xC0]).unwrap() {
            ParseOk::Continue(1, 0) => {}
            other => panic!("expected Continue, got {:?}", other),
        }
    }
}
