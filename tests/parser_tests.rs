// SPDX-License-Identifier: MPL-2.0

// Integration tests for the frame codec: round-trips, stream
// reassembly over partial buffers, and malformed-frame detection.

use dmqtt::mqtt_serde::control_packet::MqttPacket;
use dmqtt::mqtt_serde::mqttv3::{
    MqttConnAck, MqttConnect, MqttDisconnect, MqttPingReq, MqttPingResp, MqttPubAck, MqttPubComp,
    MqttPubRec, MqttPubRel, MqttPublish, MqttSubAck, MqttSubscribe, MqttUnsubAck, MqttUnsubscribe,
    TopicSubscription, Will,
};
use dmqtt::mqtt_serde::parser::{packet_type, ParseError, ParseOk};
use dmqtt::mqtt_serde::MqttParser;

/// One instance of every packet variant the codec supports.
fn sample_packets() -> Vec<MqttPacket> {
    let mut connect = MqttConnect::new("it-client".to_string(), 30, false);
    connect.will = Some(Will {
        retain: false,
        qos: 1,
        topic: "status/offline".to_string(),
        message: b"bye".to_vec(),
    });
    connect.username = Some("user".to_string());
    connect.password = Some(b"pass".to_vec());

    vec![
        MqttPacket::Connect(connect),
        MqttPacket::ConnAck(MqttConnAck::new(true, 0)),
        MqttPacket::Publish(MqttPublish::new(
            "devices/d1/methods".to_string(),
            2,
            b"{\"method\":\"reboot\"}".to_vec(),
            Some(99),
            true,
            false,
        )),
        MqttPacket::PubAck(MqttPubAck::new(1)),
        MqttPacket::PubRec(MqttPubRec::new(2)),
        MqttPacket::PubRel(MqttPubRel::new(3)),
        MqttPacket::PubComp(MqttPubComp::new(4)),
        MqttPacket::Subscribe(MqttSubscribe::new(
            5,
            vec![
                TopicSubscription::new("a/+/b", 1),
                TopicSubscription::new("c/#", 0),
            ],
        )),
        MqttPacket::SubAck(MqttSubAck::new(5, vec![0x01, 0x00])),
        MqttPacket::Unsubscribe(MqttUnsubscribe::new(6, vec!["a/+/b".to_string()])),
        MqttPacket::UnsubAck(MqttUnsubAck::new(6)),
        MqttPacket::PingReq(MqttPingReq::new()),
        MqttPacket::PingResp(MqttPingResp::new()),
        MqttPacket::Disconnect(MqttDisconnect::new()),
    ]
}

#[test]
fn test_every_variant_roundtrips() {
    for packet in sample_packets() {
        let bytes = packet.to_bytes().unwrap();
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(decoded, consumed) => {
                assert_eq!(packet, decoded);
                assert_eq!(consumed, bytes.len(), "consumed for {}", packet.name());
            }
            other => panic!("{}: expected Packet, got {:?}", packet.name(), other),
        }
    }
}

#[test]
fn test_every_strict_prefix_is_incomplete() {
    for packet in sample_packets() {
        let bytes = packet.to_bytes().unwrap();
        for cut in 0..bytes.len() {
            match MqttPacket::from_bytes(&bytes[..cut]) {
                Ok(ParseOk::Continue(_, _)) => {}
                Err(e) if e.is_incomplete() => {}
                other => panic!(
                    "{}: prefix of {} bytes should be incomplete, got {:?}",
                    packet.name(),
                    cut,
                    other
                ),
            }
        }
    }
}

#[test]
fn test_trailing_bytes_do_not_affect_consumed() {
    for packet in sample_packets() {
        let mut bytes = packet.to_bytes().unwrap();
        let frame_len = bytes.len();
        bytes.extend_from_slice(&[0xC0, 0x00, 0xAB, 0xCD]);
        match MqttPacket::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(decoded, consumed) => {
                assert_eq!(packet, decoded);
                assert_eq!(consumed, frame_len);
            }
            other => panic!("{}: expected Packet, got {:?}", packet.name(), other),
        }
    }
}

#[test]
fn test_five_byte_remaining_length_is_malformed() {
    // 0x30 PUBLISH followed by a remaining-length field whose first four
    // bytes all carry the continuation bit.
    let bytes = vec![0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F];
    assert!(matches!(
        MqttPacket::from_bytes(&bytes),
        Err(ParseError::Malformed(_))
    ));
}

#[test]
fn test_reserved_type_nibbles_rejected() {
    assert!(matches!(
        MqttPacket::from_bytes(&[0x00, 0x00]),
        Err(ParseError::InvalidPacketType)
    ));
    assert!(matches!(
        MqttPacket::from_bytes(&[0xF0, 0x00]),
        Err(ParseError::InvalidPacketType)
    ));
}

#[test]
fn test_packet_type_extraction() {
    assert_eq!(packet_type(&[0x10]).unwrap(), 1); // CONNECT
    assert_eq!(packet_type(&[0x20]).unwrap(), 2); // CONNACK
    assert_eq!(packet_type(&[0xC0]).unwrap(), 12); // PINGREQ
    assert_eq!(packet_type(&[0xE0]).unwrap(), 14); // DISCONNECT
    assert!(matches!(
        packet_type(&[]),
        Err(ParseError::BufferTooShort)
    ));
}

#[test]
fn test_stream_parser_handles_arbitrary_chunking() {
    // All samples concatenated, then fed one byte at a time.
    let packets = sample_packets();
    let mut wire = Vec::new();
    for packet in &packets {
        wire.extend(packet.to_bytes().unwrap());
    }

    let mut parser = MqttParser::default();
    let mut decoded = Vec::new();
    for &byte in &wire {
        parser.feed(&[byte]);
        while let Some(packet) = parser.next_packet().unwrap() {
            decoded.push(packet);
        }
    }

    assert_eq!(packets, decoded);
    assert_eq!(parser.buffered_len(), 0);
}

#[test]
fn test_stream_parser_yields_frames_in_wire_order() {
    let first = MqttPacket::PubAck(MqttPubAck::new(1));
    let second = MqttPacket::PubAck(MqttPubAck::new(2));
    let mut wire = first.to_bytes().unwrap();
    wire.extend(second.to_bytes().unwrap());

    let mut parser = MqttParser::default();
    parser.feed(&wire);
    assert_eq!(parser.next_packet().unwrap(), Some(first));
    assert_eq!(parser.next_packet().unwrap(), Some(second));
    assert_eq!(parser.next_packet().unwrap(), None);
}

#[test]
fn test_stream_parser_surfaces_malformed_frames() {
    let mut parser = MqttParser::default();
    // CONNACK with an impossible remaining length of 1.
    parser.feed(&[0x20, 0x01, 0x00]);
    assert!(parser.next_packet().is_err());
}

#[test]
fn test_serde_roundtrip_of_decoded_frame() {
    let packet = MqttPacket::Publish(MqttPublish::new(
        "t".to_string(),
        1,
        b"payload".to_vec(),
        Some(3),
        false,
        false,
    ));
    let json = serde_json::to_string(&packet).unwrap();
    let back: MqttPacket = serde_json::from_str(&json).unwrap();
    assert_eq!(packet, back);
}
