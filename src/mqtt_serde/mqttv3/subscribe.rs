use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::parser::{
    packet_type, parse_fixed_header, parse_utf8_string, HeaderParse, ParseError, ParseOk,
};

/// One topic filter plus its requested QoS in a SUBSCRIBE payload.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct TopicSubscription {
    pub topic_filter: String,
    pub qos: u8,
}

impl TopicSubscription {
    pub fn new(topic_filter: impl Into<String>, qos: u8) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
        }
    }
}

/// SUBSCRIBE: requests one or more topic-filter subscriptions.
///
/// The fixed-header flag nibble is mandated to be 0b0010, and the payload
/// must carry at least one filter/QoS pair.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttSubscribe {
    pub message_id: u16,
    pub subscriptions: Vec<TopicSubscription>,
}

impl MqttSubscribe {
    pub fn new(message_id: u16, subscriptions: Vec<TopicSubscription>) -> Self {
        Self {
            message_id,
            subscriptions,
        }
    }
}

impl MqttControlPacket for MqttSubscribe {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::SUBSCRIBE as u8
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        Ok(TwoByteInteger::encode(self.message_id).to_vec())
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        if self.subscriptions.is_empty() {
            return Err(ParseError::Malformed(
                "SUBSCRIBE must carry at least one topic filter".to_string(),
            ));
        }
        let mut payload = Vec::new();
        for sub in &self.subscriptions {
            if sub.qos > 2 {
                return Err(ParseError::Malformed(format!(
                    "invalid requested QoS {}",
                    sub.qos
                )));
            }
            payload.extend(encode_utf8_string(&sub.topic_filter)?);
            payload.push(sub.qos);
        }
        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::SUBSCRIBE as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };
        if hdr.flags() != 0x02 {
            return Err(ParseError::Malformed(
                "SUBSCRIBE fixed header flags must be 0b0010".to_string(),
            ));
        }

        let total_len = hdr.total_len;
        let mut offset = hdr.body_offset;
        let (message_id, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += consumed;

        let mut subscriptions = Vec::new();
        while offset < total_len {
            let (topic_filter, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            if offset >= total_len {
                return Err(ParseError::Malformed(
                    "SUBSCRIBE topic filter missing requested QoS".to_string(),
                ));
            }
            let qos = buffer[offset];
            offset += 1;
            if qos > 2 {
                return Err(ParseError::Malformed(format!(
                    "invalid requested QoS {}",
                    qos
                )));
            }
            subscriptions.push(TopicSubscription { topic_filter, qos });
        }

        if subscriptions.is_empty() {
            return Err(ParseError::Malformed(
                "SUBSCRIBE must carry at least one topic filter".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Subscribe(MqttSubscribe::new(message_id, subscriptions)),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_layout() {
        let subscribe = MqttSubscribe::new(10, vec![TopicSubscription::new("a/b", 1)]);
        assert_eq!(
            subscribe.to_bytes().unwrap(),
            vec![
                0x82, 8, // type + mandatory flags, remaining length
                0x00, 0x0A, // packet id
                0x00, 0x03, b'a', b'/', b'b', // filter
                0x01, // requested QoS
            ]
        );
    }

    #[test]
    fn test_subscribe_multi_filter_roundtrip() {
        let original = MqttSubscribe::new(
            77,
            vec![
                TopicSubscription::new("devices/+/methods", 1),
                TopicSubscription::new("status/#", 0),
                TopicSubscription::new("exact/topic", 2),
            ],
        );
        let bytes = original.to_bytes().unwrap();
        match MqttSubscribe::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Subscribe(parsed), consumed) => {
                assert_eq!(original, parsed);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("Expected SUBSCRIBE packet"),
        }
    }

    #[test]
    fn test_subscribe_empty_payload_rejected() {
        assert!(MqttSubscribe::new(1, Vec::new()).to_bytes().is_err());
        let bytes = vec![0x82, 2, 0x00, 0x01];
        assert!(matches!(
            MqttSubscribe::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_subscribe_wrong_flags_rejected() {
        let bytes = vec![0x80, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x01];
        assert!(matches!(
            MqttSubscribe::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_subscribe_invalid_requested_qos_rejected() {
        let bytes = vec![0x82, 8, 0x00, 0x0A, 0x00, 0x03, b'a', b'/', b'b', 0x03];
        assert!(matches!(
            MqttSubscribe::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }
}
