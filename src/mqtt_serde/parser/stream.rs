use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::parser::{ParseError, ParseOk};
use bytes::{Buf, BytesMut};

/// Stateful reassembler for a byte stream carrying MQTT v3.1.1 frames.
///
/// The transport delivers arbitrary chunk boundaries; this buffers them
/// and yields complete packets one at a time. A chunk may hold part of a
/// frame, exactly one, or several concatenated.
#[derive(Debug)]
pub struct MqttParser {
    buffer: BytesMut,
}

impl Default for MqttParser {
    fn default() -> Self {
        Self::new(16 * 1024)
    }
}

impl MqttParser {
    pub fn new(buffer_size: usize) -> Self {
        MqttParser {
            buffer: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Append bytes read from the transport.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame out of the internal buffer.
    ///
    /// - `Ok(Some(packet))`: one full frame decoded and consumed.
    /// - `Ok(None)`: buffer ends mid-frame, feed more bytes.
    /// - `Err(_)`: the stream is malformed; the connection must die.
    pub fn next_packet(&mut self) -> Result<Option<MqttPacket>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match MqttPacket::from_bytes(&self.buffer) {
            Ok(ParseOk::Packet(packet, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(packet))
            }
            Ok(ParseOk::Continue(_, _)) => Ok(None),
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Bytes currently buffered but not yet decoded.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_serde::control_packet::MqttControlPacket;
    use crate::mqtt_serde::mqttv3::ping::MqttPingResp;
    use crate::mqtt_serde::mqttv3::publish::MqttPublish;

    #[test]
    fn test_single_packet_split_across_feeds() {
        let publish = MqttPublish::new("a/b".to_string(), 1, b"xy".to_vec(), Some(7), false, false);
        let bytes = publish.to_bytes().unwrap();

        let mut parser = MqttParser::default();
        for chunk in bytes.chunks(3) {
            parser.feed(chunk);
        }
        // All but the final chunk leave the parser waiting.
        match parser.next_packet().unwrap() {
            Some(MqttPacket::Publish(p)) => assert_eq!(p.message_id, Some(7)),
            other => panic!("expected Publish, got {:?}", other),
        }
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_packets_in_one_feed() {
        let mut bytes = MqttPingResp::new().to_bytes().unwrap();
        bytes.extend(MqttPingResp::new().to_bytes().unwrap());

        let mut parser = MqttParser::default();
        parser.feed(&bytes);
        assert!(matches!(
            parser.next_packet().unwrap(),
            Some(MqttPacket::PingResp(_))
        ));
        assert!(matches!(
            parser.next_packet().unwrap(),
            Some(MqttPacket::PingResp(_))
        ));
        assert!(parser.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_malformed_stream_is_fatal() {
        let mut parser = MqttParser::default();
        // Packet type nibble 0 is reserved.
        parser.feed(&[0x00, 0x00]);
        assert!(parser.next_packet().is_err());
    }
}
