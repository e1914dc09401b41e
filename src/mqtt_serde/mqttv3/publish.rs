use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::parser::{
    packet_type, parse_fixed_header, parse_utf8_string, HeaderParse, ParseError, ParseOk,
};

/// PUBLISH: carries one application message in either direction.
///
/// QoS and the DUP/RETAIN bits live in the fixed-header flag nibble; the
/// packet identifier is present only for QoS 1 and 2.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttPublish {
    pub dup: bool,
    pub qos: u8,
    pub retain: bool,
    pub topic_name: String,
    pub message_id: Option<u16>,
    pub payload: Vec<u8>,
}

impl MqttPublish {
    pub fn new(
        topic_name: String,
        qos: u8,
        payload: Vec<u8>,
        message_id: Option<u16>,
        retain: bool,
        dup: bool,
    ) -> Self {
        Self {
            dup,
            qos,
            retain,
            topic_name,
            message_id,
            payload,
        }
    }
}

impl MqttControlPacket for MqttPublish {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::PUBLISH as u8
    }

    fn flags(&self) -> u8 {
        ((self.dup as u8) << 3) | (self.qos << 1) | (self.retain as u8)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        let mut vh = encode_utf8_string(&self.topic_name)?;
        if self.qos > 0 {
            let id = self.message_id.ok_or_else(|| {
                ParseError::Malformed("packet identifier required for QoS > 0".to_string())
            })?;
            vh.extend_from_slice(&TwoByteInteger::encode(id));
        }
        Ok(vh)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        Ok(self.payload.clone())
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::PUBLISH as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };
        let total_len = hdr.total_len;

        let flags = hdr.flags();
        let dup = flags & 0x08 != 0;
        let qos = (flags & 0x06) >> 1;
        let retain = flags & 0x01 != 0;
        if qos > 2 {
            return Err(ParseError::Malformed("QoS 3 is reserved".to_string()));
        }

        let mut offset = hdr.body_offset;
        let (topic_name, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;

        let message_id = if qos > 0 {
            if offset + 2 > total_len {
                return Err(ParseError::Malformed(
                    "missing packet identifier for QoS > 0".to_string(),
                ));
            }
            let id = u16::from_be_bytes([buffer[offset], buffer[offset + 1]]);
            offset += 2;
            Some(id)
        } else {
            None
        };

        let payload = buffer[offset..total_len].to_vec();

        Ok(ParseOk::Packet(
            MqttPacket::Publish(MqttPublish {
                dup,
                qos,
                retain,
                topic_name,
                message_id,
                payload,
            }),
            total_len,
        ))
    }
}
