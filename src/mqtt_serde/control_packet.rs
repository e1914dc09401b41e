use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use super::encode_remaining_length;
use super::parser::{packet_type, ParseError, ParseOk};

use crate::mqtt_serde::mqttv3::ack::{
    MqttPubAck, MqttPubComp, MqttPubRec, MqttPubRel, MqttUnsubAck,
};
use crate::mqtt_serde::mqttv3::connack::MqttConnAck;
use crate::mqtt_serde::mqttv3::connect::MqttConnect;
use crate::mqtt_serde::mqttv3::disconnect::MqttDisconnect;
use crate::mqtt_serde::mqttv3::ping::{MqttPingReq, MqttPingResp};
use crate::mqtt_serde::mqttv3::publish::MqttPublish;
use crate::mqtt_serde::mqttv3::suback::MqttSubAck;
use crate::mqtt_serde::mqttv3::subscribe::MqttSubscribe;
use crate::mqtt_serde::mqttv3::unsubscribe::MqttUnsubscribe;

/// One decoded MQTT v3.1.1 control packet.
///
/// Frames are transient: produced by the codec, consumed immediately by
/// the engine. Nothing long-lived holds one.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(tag = "type")]
pub enum MqttPacket {
    Connect(MqttConnect),
    ConnAck(MqttConnAck),
    Publish(MqttPublish),
    PubAck(MqttPubAck),
    PubRec(MqttPubRec),
    PubRel(MqttPubRel),
    PubComp(MqttPubComp),
    Subscribe(MqttSubscribe),
    SubAck(MqttSubAck),
    Unsubscribe(MqttUnsubscribe),
    UnsubAck(MqttUnsubAck),
    PingReq(MqttPingReq),
    PingResp(MqttPingResp),
    Disconnect(MqttDisconnect),
}

impl MqttPacket {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self {
            MqttPacket::Connect(p) => p.to_bytes(),
            MqttPacket::ConnAck(p) => p.to_bytes(),
            MqttPacket::Publish(p) => p.to_bytes(),
            MqttPacket::PubAck(p) => p.to_bytes(),
            MqttPacket::PubRec(p) => p.to_bytes(),
            MqttPacket::PubRel(p) => p.to_bytes(),
            MqttPacket::PubComp(p) => p.to_bytes(),
            MqttPacket::Subscribe(p) => p.to_bytes(),
            MqttPacket::SubAck(p) => p.to_bytes(),
            MqttPacket::Unsubscribe(p) => p.to_bytes(),
            MqttPacket::UnsubAck(p) => p.to_bytes(),
            MqttPacket::PingReq(p) => p.to_bytes(),
            MqttPacket::PingResp(p) => p.to_bytes(),
            MqttPacket::Disconnect(p) => p.to_bytes(),
        }
    }

    /// Decode the first frame in `buffer`, dispatching on the type nibble.
    pub fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        let packet_type_byte = packet_type(buffer)?;
        let packet_type = ControlPacketType::try_from(packet_type_byte)?;

        match packet_type {
            ControlPacketType::CONNECT => MqttConnect::from_bytes(buffer),
            ControlPacketType::CONNACK => MqttConnAck::from_bytes(buffer),
            ControlPacketType::PUBLISH => MqttPublish::from_bytes(buffer),
            ControlPacketType::PUBACK => MqttPubAck::from_bytes(buffer),
            ControlPacketType::PUBREC => MqttPubRec::from_bytes(buffer),
            ControlPacketType::PUBREL => MqttPubRel::from_bytes(buffer),
            ControlPacketType::PUBCOMP => MqttPubComp::from_bytes(buffer),
            ControlPacketType::SUBSCRIBE => MqttSubscribe::from_bytes(buffer),
            ControlPacketType::SUBACK => MqttSubAck::from_bytes(buffer),
            ControlPacketType::UNSUBSCRIBE => MqttUnsubscribe::from_bytes(buffer),
            ControlPacketType::UNSUBACK => MqttUnsubAck::from_bytes(buffer),
            ControlPacketType::PINGREQ => MqttPingReq::from_bytes(buffer),
            ControlPacketType::PINGRESP => MqttPingResp::from_bytes(buffer),
            ControlPacketType::DISCONNECT => MqttDisconnect::from_bytes(buffer),
        }
    }

    /// Human-readable packet name, used in protocol-violation reports.
    pub fn name(&self) -> &'static str {
        match self {
            MqttPacket::Connect(_) => "CONNECT",
            MqttPacket::ConnAck(_) => "CONNACK",
            MqttPacket::Publish(_) => "PUBLISH",
            MqttPacket::PubAck(_) => "PUBACK",
            MqttPacket::PubRec(_) => "PUBREC",
            MqttPacket::PubRel(_) => "PUBREL",
            MqttPacket::PubComp(_) => "PUBCOMP",
            MqttPacket::Subscribe(_) => "SUBSCRIBE",
            MqttPacket::SubAck(_) => "SUBACK",
            MqttPacket::Unsubscribe(_) => "UNSUBSCRIBE",
            MqttPacket::UnsubAck(_) => "UNSUBACK",
            MqttPacket::PingReq(_) => "PINGREQ",
            MqttPacket::PingResp(_) => "PINGRESP",
            MqttPacket::Disconnect(_) => "DISCONNECT",
        }
    }
}

pub enum ControlPacketType {
    CONNECT = 1,
    CONNACK = 2,
    PUBLISH = 3,
    PUBACK = 4,
    PUBREC = 5,
    PUBREL = 6,
    PUBCOMP = 7,
    SUBSCRIBE = 8,
    SUBACK = 9,
    UNSUBSCRIBE = 10,
    UNSUBACK = 11,
    PINGREQ = 12,
    PINGRESP = 13,
    DISCONNECT = 14,
}

impl TryFrom<u8> for ControlPacketType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ControlPacketType::CONNECT),
            2 => Ok(ControlPacketType::CONNACK),
            3 => Ok(ControlPacketType::PUBLISH),
            4 => Ok(ControlPacketType::PUBACK),
            5 => Ok(ControlPacketType::PUBREC),
            6 => Ok(ControlPacketType::PUBREL),
            7 => Ok(ControlPacketType::PUBCOMP),
            8 => Ok(ControlPacketType::SUBSCRIBE),
            9 => Ok(ControlPacketType::SUBACK),
            10 => Ok(ControlPacketType::UNSUBSCRIBE),
            11 => Ok(ControlPacketType::UNSUBACK),
            12 => Ok(ControlPacketType::PINGREQ),
            13 => Ok(ControlPacketType::PINGRESP),
            14 => Ok(ControlPacketType::DISCONNECT),
            _ => Err(ParseError::InvalidPacketType),
        }
    }
}

/// Shared shape of every MQTT control packet encoder/decoder.
pub trait MqttControlPacket {
    // MQTT 3.1.1: 2.2.1, control packet type
    fn control_packet_type(&self) -> u8;

    // MQTT 3.1.1: 2.2.2, flags in the fixed header
    fn flags(&self) -> u8 {
        0u8
    }

    // Fixed header: type + flags byte, then the remaining-length field.
    fn fixed_header(&self, len: usize) -> Result<Vec<u8>, ParseError> {
        let byte1: u8 = (self.control_packet_type()) << 4 | self.flags();
        let mut hdr = vec![byte1];
        hdr.extend(encode_remaining_length(len)?);
        Ok(hdr)
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError>;

    fn payload(&self) -> Result<Vec<u8>, ParseError>;

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError>;

    fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let vhdr = self.variable_header()?;
        let payload = self.payload()?;
        let remaining_length = vhdr.len() + payload.len();

        let mut bytes = self.fixed_header(remaining_length)?;
        bytes.extend(vhdr);
        bytes.extend(payload);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_nibble_mapping() {
        assert!(ControlPacketType::try_from(0).is_err());
        assert!(ControlPacketType::try_from(15).is_err());
        for nibble in 1u8..=14 {
            assert!(ControlPacketType::try_from(nibble).is_ok());
        }
    }

    #[test]
    fn test_packet_serde_tagging() {
        let pkt = MqttPacket::ConnAck(MqttConnAck::new(false, 0));
        let json = serde_json::to_string(&pkt).unwrap();
        assert_eq!(
            json,
            "{\"type\":\"ConnAck\",\"session_present\":false,\"return_code\":0}"
        );
    }
}
