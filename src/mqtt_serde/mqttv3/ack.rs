// SPDX-License-Identifier: MPL-2.0

//! Packet-identifier-only acknowledgment frames.
//!
//! PUBACK, PUBREC, PUBREL, PUBCOMP and UNSUBACK share one wire shape: a
//! fixed header plus a two-byte packet identifier and nothing else. The
//! only difference is the type nibble and, for PUBREL, the mandatory
//! 0b0010 flag nibble.

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_fixed_header, HeaderParse, ParseError, ParseOk};

macro_rules! packet_id_ack {
    ($name:ident, $variant:ident, $ptype:ident, $flags:expr, $label:literal) => {
        #[doc = concat!($label, ": acknowledges the packet identifier it carries.")]
        #[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
        #[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
        pub struct $name {
            pub message_id: u16,
        }

        impl $name {
            pub fn new(message_id: u16) -> Self {
                Self { message_id }
            }
        }

        impl MqttControlPacket for $name {
            fn control_packet_type(&self) -> u8 {
                ControlPacketType::$ptype as u8
            }

            fn flags(&self) -> u8 {
                $flags
            }

            fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
                Ok(TwoByteInteger::encode(self.message_id).to_vec())
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

                if hdr.flags() != $flags {
                    return Err(ParseError::Malformed(concat!(
                        $label,
                        " fixed header flags are invalid"
                    )
                    .to_string()));
                }
                if hdr.remaining_len != 2 {
                    return Err(ParseError::Malformed(concat!(
                        $label,
                        " remaining length must be 2"
                    )
                    .to_string()));
                }

                let (message_id, _) = TwoByteInteger::decode(&buffer[hdr.body_offset..])?;
                Ok(ParseOk::Packet(
                    MqttPacket::$variant($name::new(message_id)),
                    hdr.total_len,
                ))
            }
        }
    };
}

packet_id_ack!(MqttPubAck, PubAck, PUBACK, 0x00, "PUBACK");
packet_id_ack!(MqttPubRec, PubRec, PUBREC, 0x00, "PUBREC");
packet_id_ack!(MqttPubRel, PubRel, PUBREL, 0x02, "PUBREL");
packet_id_ack!(MqttPubComp, PubComp, PUBCOMP, 0x00, "PUBCOMP");
packet_id_ack!(MqttUnsubAck, UnsubAck, UNSUBACK, 0x00, "UNSUBACK");
