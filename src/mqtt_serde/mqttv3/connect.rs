use serde::{Deserialize, Serialize};

use crate::mqtt_serde::base_data::TwoByteInteger;
use crate::mqtt_serde::control_packet::{ControlPacketType, MqttControlPacket, MqttPacket};
use crate::mqtt_serde::encode_utf8_string;
use crate::mqtt_serde::parser::{
    packet_type, parse_fixed_header, parse_utf8_string, HeaderParse, ParseError, ParseOk,
};

/// Will message carried in the CONNECT payload.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Will {
    pub retain: bool,
    pub qos: u8,
    pub topic: String,
    pub message: Vec<u8>,
}

/// CONNECT: the first packet a client sends on a new network connection.
///
/// The variable header is byte-exact per MQTT v3.1.1: protocol name
/// "MQTT", protocol level 4, connect flags, then the keepalive as a
/// big-endian 16-bit seconds value. The client id leads the payload as a
/// 16-bit-length-prefixed UTF-8 string.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct MqttConnect {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

impl MqttConnect {
    pub fn new(client_id: String, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            clean_session,
            keep_alive,
            client_id,
            will: None,
            username: None,
            password: None,
        }
    }
}

impl MqttControlPacket for MqttConnect {
    fn control_packet_type(&self) -> u8 {
        ControlPacketType::CONNECT as u8
    }

    fn variable_header(&self) -> Result<Vec<u8>, ParseError> {
        let mut vh = Vec::new();
        vh.extend(encode_utf8_string("MQTT")?);
        vh.push(4); // protocol level

        let mut flags = 0u8;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04;
            flags |= will.qos << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        vh.push(flags);

        vh.extend_from_slice(&TwoByteInteger::encode(self.keep_alive));
        Ok(vh)
    }

    fn payload(&self) -> Result<Vec<u8>, ParseError> {
        let mut payload = Vec::new();
        payload.extend(encode_utf8_string(&self.client_id)?);

        if let Some(will) = &self.will {
            payload.extend(encode_utf8_string(&will.topic)?);
            if will.message.len() > u16::MAX as usize {
                return Err(ParseError::StringTooLong);
            }
            payload.extend_from_slice(&TwoByteInteger::encode(will.message.len() as u16));
            payload.extend_from_slice(&will.message);
        }

        if let Some(username) = &self.username {
            payload.extend(encode_utf8_string(username)?);
        }

        if let Some(password) = &self.password {
            if password.len() > u16::MAX as usize {
                return Err(ParseError::StringTooLong);
            }
            payload.extend_from_slice(&TwoByteInteger::encode(password.len() as u16));
            payload.extend_from_slice(password);
        }

        Ok(payload)
    }

    fn from_bytes(buffer: &[u8]) -> Result<ParseOk, ParseError> {
        if packet_type(buffer)? != ControlPacketType::CONNECT as u8 {
            return Err(ParseError::InvalidPacketType);
        }

        let hdr = match parse_fixed_header(buffer)? {
            HeaderParse::Complete(hdr) => hdr,
            HeaderParse::Incomplete(needed) => return Ok(ParseOk::Continue(needed, 0)),
        };
        let total_len = hdr.total_len;
        let mut offset = hdr.body_offset;

        let (proto_name, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;
        if proto_name != "MQTT" {
            return Err(ParseError::Malformed("invalid protocol name".to_string()));
        }

        if offset >= total_len {
            return Err(ParseError::Malformed("CONNECT truncated".to_string()));
        }
        let level = buffer[offset];
        offset += 1;
        if level != 4 {
            return Err(ParseError::Malformed(format!(
                "unsupported protocol level {}",
                level
            )));
        }

        if offset >= total_len {
            return Err(ParseError::Malformed("CONNECT truncated".to_string()));
        }
        let flags = buffer[offset];
        offset += 1;

        if flags & 0x01 != 0 {
            return Err(ParseError::Malformed(
                "CONNECT reserved flag bit is not 0".to_string(),
            ));
        }
        let clean_session = flags & 0x02 != 0;
        let will_flag = flags & 0x04 != 0;
        let will_qos = (flags & 0x18) >> 3;
        let will_retain = flags & 0x20 != 0;
        let password_flag = flags & 0x40 != 0;
        let username_flag = flags & 0x80 != 0;

        if password_flag && !username_flag {
            return Err(ParseError::Malformed(
                "password flag requires username flag".to_string(),
            ));
        }
        if will_qos > 2 || (!will_flag && (will_qos != 0 || will_retain)) {
            return Err(ParseError::Malformed("invalid will flags".to_string()));
        }

        let (keep_alive, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
        offset += consumed;

        let (client_id, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
        offset += consumed;

        let will = if will_flag {
            let (topic, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            let (msg_len, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
            offset += consumed;
            let end = offset + msg_len as usize;
            if end > total_len {
                return Err(ParseError::Malformed("will message truncated".to_string()));
            }
            let message = buffer[offset..end].to_vec();
            offset = end;
            Some(Will {
                retain: will_retain,
                qos: will_qos,
                topic,
                message,
            })
        } else {
            None
        };

        let username = if username_flag {
            let (u, consumed) = parse_utf8_string(&buffer[offset..total_len])?;
            offset += consumed;
            Some(u)
        } else {
            None
        };

        let password = if password_flag {
            let (pass_len, consumed) = TwoByteInteger::decode(&buffer[offset..total_len])?;
            offset += consumed;
            let end = offset + pass_len as usize;
            if end > total_len {
                return Err(ParseError::Malformed("password truncated".to_string()));
            }
            let p = buffer[offset..end].to_vec();
            offset = end;
            Some(p)
        } else {
            None
        };

        if offset != total_len {
            return Err(ParseError::Malformed(
                "CONNECT declared length inconsistent with fields".to_string(),
            ));
        }

        Ok(ParseOk::Packet(
            MqttPacket::Connect(MqttConnect {
                clean_session,
                keep_alive,
                client_id,
                will,
                username,
                password,
            }),
            total_len,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_wire_layout() {
        let connect = MqttConnect::new("t".to_string(), 60, true);
        let bytes = connect.to_bytes().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x10, 13, // type, remaining length
                0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
                0x04, // protocol level
                0x02, // connect flags: clean session
                0x00, 0x3C, // keepalive 60
                0x00, 0x01, b't', // client id
            ]
        );
    }

    #[test]
    fn test_connect_minimal_roundtrip() {
        let original = MqttConnect::new("direct-method-client-1a2b3c4d".to_string(), 60, true);
        let bytes = original.to_bytes().unwrap();
        match MqttConnect::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Connect(parsed), consumed) => {
                assert_eq!(original, parsed);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("Expected CONNECT packet"),
        }
    }

    #[test]
    fn test_connect_full_roundtrip() {
        let mut original = MqttConnect::new("full-client".to_string(), 30, false);
        original.will = Some(Will {
            retain: true,
            qos: 1,
            topic: "status/offline".to_string(),
            message: b"gone".to_vec(),
        });
        original.username = Some("user".to_string());
        original.password = Some(b"secret".to_vec());

        let bytes = original.to_bytes().unwrap();
        match MqttConnect::from_bytes(&bytes).unwrap() {
            ParseOk::Packet(MqttPacket::Connect(parsed), _) => assert_eq!(original, parsed),
            _ => panic!("Expected CONNECT packet"),
        }
    }

    #[test]
    fn test_connect_reserved_flag_bit_rejected() {
        let mut bytes = MqttConnect::new("c".to_string(), 60, true).to_bytes().unwrap();
        bytes[9] |= 0x01; // reserved bit of the connect flags byte
        assert!(matches!(
            MqttConnect::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_connect_password_without_username_rejected() {
        let bytes = vec![
            0x10, 18, // type, len
            0x00, 0x04, b'M', b'Q', b'T', b'T', // proto name
            0x04, // level
            0x42, // flags: password without username
            0x00, 0x3C, // keepalive
            0x00, 0x01, b'c', // client id
            0x00, 0x03, b'p', b'w', b'd', // password
        ];
        assert!(MqttConnect::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_connect_wrong_protocol_level_rejected() {
        let mut bytes = MqttConnect::new("c".to_string(), 60, true).to_bytes().unwrap();
        bytes[8] = 5;
        assert!(matches!(
            MqttConnect::from_bytes(&bytes),
            Err(ParseError::Malformed(_))
        ));
    }
}
