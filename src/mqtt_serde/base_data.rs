// SPDX-License-Identifier: MPL-2.0

//! Wire-level primitives shared by every MQTT v3.1.1 control packet.

use crate::mqtt_serde::parser::ParseError;

/// Big-endian 16-bit integer (MQTT 3.1.1, 1.5.2).
pub struct TwoByteInteger;

impl TwoByteInteger {
    pub fn encode(val: u16) -> [u8; 2] {
        val.to_be_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<(u16, usize), ParseError> {
        if bytes.len() < 2 {
            return Err(ParseError::BufferTooShort);
        }
        Ok((u16::from_be_bytes([bytes[0], bytes[1]]), 2))
    }
}

/// Remaining-length field: 7 value bits per byte, continuation bit in the
/// MSB, at most 4 bytes (MQTT 3.1.1, 2.2.3). Ceiling 268,435,455.
pub struct VariableByteInteger;

/// Largest value a remaining-length field can carry.
pub const REMAINING_LENGTH_MAX: usize = 268_435_455;

impl VariableByteInteger {
    pub fn encode(val: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut num = val;
        loop {
            let mut byte = (num % 128) as u8;
            num /= 128;
            if num > 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if num == 0 {
                break;
            }
        }
        bytes
    }

    pub fn decode(buffer: &[u8]) -> Result<(usize, usize), ParseError> {
        if buffer.is_empty() {
            return Err(ParseError::BufferTooShort);
        }

        let mut value: usize = 0;
        let mut multiplier: usize = 1;
        let mut i: usize = 0;

        loop {
            let byte = *buffer.get(i).ok_or(ParseError::More(
                1,
                "remaining length continues past buffer".to_string(),
            ))?;

            if i == 3 && byte & 0x80 != 0 {
                // A continuation bit on the fourth byte would make this a
                // five-byte field, which the protocol forbids.
                return Err(ParseError::Malformed(
                    "remaining length field exceeds 4 bytes".to_string(),
                ));
            }

            value += (byte & 0x7F) as usize * multiplier;
            multiplier *= 128;
            i += 1;

            if byte & 0x80 == 0 {
                break;
            }
        }

        Ok((value, i))
    }
}

/// Length-prefixed opaque bytes (MQTT 3.1.1, 1.5.3 binary form).
pub struct BinaryData;

impl BinaryData {
    pub fn encode(data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + data.len());
        bytes.extend_from_slice(&(data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
        let (len, _) = TwoByteInteger::decode(bytes)?;
        let end = 2 + len as usize;
        if bytes.len() < end {
            return Err(ParseError::BufferTooShort);
        }
        Ok((bytes[2..end].to_vec(), end))
    }
}

/// Length-prefixed UTF-8 string (MQTT 3.1.1, 1.5.3).
pub struct Utf8String;

impl Utf8String {
    pub fn encode(s: &str) -> Vec<u8> {
        BinaryData::encode(s.as_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<(String, usize), ParseError> {
        let (data, len) = BinaryData::decode(bytes)?;
        let s = String::from_utf8(data).map_err(|e| ParseError::Utf8Error(e.utf8_error()))?;
        Ok((s, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_byte_integer_roundtrip() {
        for val in [0u16, 1, 255, 256, 54321, u16::MAX] {
            let encoded = TwoByteInteger::encode(val);
            let (decoded, len) = TwoByteInteger::decode(&encoded).unwrap();
            assert_eq!(val, decoded);
            assert_eq!(2, len);
        }
        assert!(matches!(
            TwoByteInteger::decode(&[0x01]),
            Err(ParseError::BufferTooShort)
        ));
    }

    #[test]
    fn test_variable_byte_integer_boundaries() {
        // One value either side of each encoded-width boundary.
        let cases: [(u32, usize); 8] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (268_435_455, 4),
        ];
        for (val, width) in cases {
            let encoded = VariableByteInteger::encode(val);
            assert_eq!(encoded.len(), width, "width for {}", val);
            let (decoded, consumed) = VariableByteInteger::decode(&encoded).unwrap();
            assert_eq!(decoded, val as usize);
            assert_eq!(consumed, width);
        }
    }

    #[test]
    fn test_variable_byte_integer_known_encodings() {
        assert_eq!((128, 2), VariableByteInteger::decode(&[0x80, 0x01]).unwrap());
        assert_eq!(
            (16_384, 3),
            VariableByteInteger::decode(&[0x80, 0x80, 0x01]).unwrap()
        );
        assert_eq!(
            (268_435_455, 4),
            VariableByteInteger::decode(&[0xFF, 0xFF, 0xFF, 0x7F]).unwrap()
        );
    }

    #[test]
    fn test_variable_byte_integer_overlong_is_malformed() {
        assert!(matches!(
            VariableByteInteger::decode(&[0x80, 0x80, 0x80, 0x80]),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            VariableByteInteger::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_variable_byte_integer_truncated_wants_more() {
        assert!(matches!(
            VariableByteInteger::decode(&[0xFF]),
            Err(ParseError::More(1, _))
        ));
        assert!(matches!(
            VariableByteInteger::decode(&[0x80, 0x80]),
            Err(ParseError::More(1, _))
        ));
    }

    #[test]
    fn test_binary_data_roundtrip() {
        let data = b"direct method payload";
        let encoded = BinaryData::encode(data);
        let (decoded, len) = BinaryData::decode(&encoded).unwrap();
        assert_eq!(data.to_vec(), decoded);
        assert_eq!(encoded.len(), len);
    }

    #[test]
    fn test_utf8_string_roundtrip() {
        let s = "devices/d1/methods";
        let encoded = Utf8String::encode(s);
        let (decoded, len) = Utf8String::decode(&encoded).unwrap();
        assert_eq!(s, decoded);
        assert_eq!(encoded.len(), len);
    }

    #[test]
    fn test_utf8_string_rejects_invalid_utf8() {
        let bytes = vec![0x00, 0x02, 0xC3, 0x28];
        assert!(matches!(
            Utf8String::decode(&bytes),
            Err(ParseError::Utf8Error(_))
        ));
    }
}
