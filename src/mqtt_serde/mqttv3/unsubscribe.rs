use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::parser::{
    packet_type, parse_fixed_header, parse_utf8_string, HeaderParse, ParseError, ParseOk,
};

/// UNSUBSCRIBE: removes one or more topic-filter subscriptions.
///
/// Like SUBSCRIBE, the flag nibble is mandated to be 0b0010 and at least
/// one filter must be present.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttUnsubscribe {
    pub message_id: u16,
    pub topics: Vec<String>,
}

impl MqttUnsubscribe {
    pub fn new(message_id: u16, topics: Vec<String>) -> Self {
        Self { message_id, topics }
    }
}

impl MqttControlPacket for MqttUnsubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::UNSUBSCRIBE as u8
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(self.message_id).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        if self.topics.is_empty() {
            return Err(ParseError::Malformed(
                "UNSUBSCRIBE must carry at least one topic filter".to_string(),
            ));
        }
        let mut payload = Vec::new();
        for topic in &self.topics {
            payload.extend(encode_utf8_string(topic)?);
        }
        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::UNSUBSCRIBE as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };
        if hdr.flags() != 0x02 {
            return Err(ParseError::Malformed(
                "UNSUBSCRIBE fixed header flags must be 0b0010".to_string(),
            ));
        }

        let total_len = hdr.total_len;
        let mut offset = hdr.body_offset;
        let (message_id, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += consumed;

        let mut topics = Vec::new();
        while offset < total_len {
            let (topic, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            topics.push(topic);
        }

        if topics.is_empty() {
            return Err(ParseError::Malformed(
                "UNSUBSCRIBE must carry at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Unsubscribe(MqttUnsubscribe::new(message_id, topics)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsubscribe_wire_layout() {
        let unsubscribe = MqttUnsubscribe::new(5, vec!["a/b".to_string()]);
        assert_eq!(
            unsubscribe.to_bytes().unwrap(),
            vec![0xA2, 7, 0x00, 0x05, 0x00, 0x03, b'a', b'/', b'b']
        );
    }

    #[test]
    fn test_unsubscribe_roundtrip() {
        let original = MqttUnsubscribe::new(
            32_000,
            vec!["devices/+/methods".to_string(), "status/#".to_string()],
        );
        let bytes = original.to_bytes().unwrap();
        match MqttUnsubscribe::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Unsubscribe(parsed), consumed) => {
                assert_eq!(original, parsed);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("Expected UNSUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_unsubscribe_empty_rejected() {
        assert!(MqttUnsubscribe::new(1, Vec::new()).to_bytes().is_err());
        let bytes = vec![0xA2, 2, 0x00, 0x01];
        assert!(matches!(
            MqttUnsubscribe::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_unsubscribe_wrong_flags_rejected() {
        let bytes = vec![0xA0, 7, 0x00, 0x05, 0x00, 0x03, b'a', b'/', b'b'];
        assert!(matches!(
            MqttUnsubscribe::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }
}
