use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::parser::{packet_type, parse_fixed_header, HeaderParse, ParseError, ParseOk};

/// Return code marking a refused filter; 0, 1 and 2 grant that QoS.
pub const SUBACK_FAILURE: u8 = 0x80;

/// SUBACK: grants (or refuses) each filter of a SUBSCRIBE, in order.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttSubAck {
    pub message_id: u16,
    pub return_codes: Vec<u8>,
}

impl MqttSubAck {
    pub fn new(message_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            message_id,
            return_codes,
        }
    }
}

fn check_return_codes(codes: &[u8]) -> Result<(), ParseError> {
    for &code in codes {
        if !matches!(code, 0x00 | 0x01 | 0x02 | SUBACK_FAILURE) {
            return Err(ParseError::Malformed(format!(
                "invalid SUBACK return code 0x{:02X}",
                code
            )));
        }
    }
    Ok(())
}

impl MqttControlPacket for MqttSubAck {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBACK as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(self.message_id).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        check_return_codes(&self.return_codes)?;
        Ok(self.return_codes.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::SUBACK as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };
        if hdr.flags() != 0x00 {
            return Err(ParseError::Malformed(
                "SUBACK fixed header flags must be 0".to_string(),
            ));
        }
        if hdr.remaining_len < 3 {
            // Two id bytes plus at least one return code.
            return Err(ParseError::Malformed(
                "SUBACK shorter than its mandatory fields".to_string(),
            ));
        }

        let mut offset = hdr.body_offset;
        let (message_id, consumed) = TwoByteInteger::decode(&buffer[offset..hdr.total_len])?;
        offset += consumed;

        let return_codes = buffer[offset..hdr.total_len].to_vec();
        check_return_codes(&return_codes)?;

        Ok(ParseOk::Packet(
            MqttPacket::SubAck(MqttSubAck::new(message_id, return_codes)),
            hdr.total_len,
        ))
    }
}
