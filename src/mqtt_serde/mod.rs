// SPDX-License-Identifier: MPL-2.0

pub mod base_data;
pub mod control_packet;
pub mod mqttv3;
pub mod parser;

use crate::mqtt_serde::base_data::{Utf8String, VariableByteInteger, REMAINING_LENGTH_MAX};
use crate::mqtt_serde::parser::ParseError;
//re export
pub use crate::mqtt_serde::parser::stream::MqttParser;

// MQTT 3.1.1 Spec, 1.5.3
pub(crate) fn encode_utf8_string(s: &str) -> Result<Vec<u8>, ParseError> {
    if s.len() > u16::MAX as usize {
        return Err(ParseError::StringTooLong);
    }
    Ok(Utf8String::encode(s))
}

// MQTT 3.1.1 Spec, 2.2.3
pub(crate) fn encode_remaining_length(len: usize) -> Result<Vec<u8>, ParseError> {
    if len > REMAINING_LENGTH_MAX {
        return Err(ParseError::PayloadTooLarge);
    }
    Ok(VariableByteInteger::encode(len as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_utf8_string_limit() {
        let ok = "t".repeat(u16::MAX as usize);
        assert!(encode_utf8_string(&ok).is_ok());

        let too_long = "t".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_utf8_string(&too_long),
            Err(ParseError::StringTooLong)
        ));
    }

    #[test]
    fn test_encode_remaining_length_ceiling() {
        assert!(encode_remaining_length(REMAINING_LENGTH_MAX).is_ok());
        assert!(matches!(
            encode_remaining_length(REMAINING_LENGTH_MAX + 1),
            Err(ParseError::PayloadTooLarge)
        ));
    }
}
