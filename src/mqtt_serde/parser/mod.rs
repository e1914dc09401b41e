use super::control_packet::MqttPacket;
use crate::mqtt_serde::base_data::{TwoByteInteger, Utf8String, VariableByteInteger};
use std::error::Error;
use std::fmt;
use std::io::Error as IoError;

pub type ParserResult = Result<ParseOk, ParseError>;

/// Errors produced while encoding or decoding MQTT control packets.
///
/// `More` means the buffer ends mid-field and the caller should feed more
/// bytes; everything else is a hard fault of the frame or the stream.
#[derive(Debug)]
pub enum ParseError {
    /// Not enough data yet; hint for how many more bytes are needed.
    More(usize, String),
    IoError(IoError),
    /// Syntactically invalid frame. Fatal for the connection.
    Malformed(String),
    Utf8Error(std::str::Utf8Error),
    /// A string field exceeds the 65,535-byte wire limit.
    StringTooLong,
    /// Encoded remaining length would exceed 268,435,455 bytes.
    PayloadTooLarge,
    BufferTooShort,
    /// First nibble of the fixed header is not a known packet type.
    InvalidPacketType,
    InternalError(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::More(hint, msg) => write!(f, "More data needed ({} bytes): {}", hint, msg),
            ParseError::IoError(e) => write!(f, "IO Error: {}", e),
            ParseError::Malformed(msg) => write!(f, "Malformed frame: {}", msg),
            ParseError::Utf8Error(e) => write!(f, "UTF-8 Error: {}", e),
            ParseError::StringTooLong => write!(f, "String Too Long"),
            ParseError::PayloadTooLarge => write!(f, "Payload Too Large"),
            ParseError::BufferTooShort => write!(f, "Buffer Too Short"),
            ParseError::InvalidPacketType => write!(f, "Invalid Packet Type"),
            ParseError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParseError::IoError(e) => Some(e),
            ParseError::Utf8Error(e) => Some(e),
            _ => None,
        }
    }
}

impl ParseError {
    /// True when the error only signals that the buffer ends mid-frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::More(_, _) | ParseError::BufferTooShort)
    }
}

#[derive(Debug, PartialEq)]
pub enum ParseOk {
    /// (hint, consumed): a full frame is not yet available.
    Continue(usize, usize),
    /// (packet, consumed): one complete decoded frame.
    Packet(MqttPacket, usize),
}

/// Fixed header of one frame whose full length is already known.
#[derive(Debug, Clone, Copy)]
pub struct FixedHeader {
    /// Raw first byte: packet-type nibble plus flag nibble.
    pub first_byte: u8,
    /// Declared remaining length in bytes.
    pub remaining_len: usize,
    /// Offset of the variable header within the buffer.
    pub body_offset: usize,
    /// Total frame size: fixed header + remaining length.
    pub total_len: usize,
}

impl FixedHeader {
    pub fn packet_type(&self) -> u8 {
        self.first_byte >> 4
    }

    pub fn flags(&self) -> u8 {
        self.first_byte & 0x0F
    }
}

pub enum HeaderParse {
    /// The frame's full extent is present in the buffer.
    Complete(FixedHeader),
    /// Need at least this many more bytes.
    Incomplete(usize),
}

/// Parse the fixed header and check the whole frame is buffered.
///
/// Every packet decoder starts here: the result separates "feed me more
/// bytes" from "this stream is broken" before any field is touched.
pub fn parse_fixed_header(buffer: &[u8]) -> Result<HeaderParse, ParseError> {
    if buffer.is_empty() {
        return Ok(HeaderParse::Incomplete(2));
    }
    if buffer.len() < 2 {
        return Ok(HeaderParse::Incomplete(1));
    }

    let (remaining_len, vbi_len) = match VariableByteInteger::decode(&buffer[1..]) {
        Ok(ok) => ok,
        Err(ParseError::More(hint, _)) => return Ok(HeaderParse::Incomplete(hint)),
        Err(e) => return Err(e),
    };

    let body_offset = 1 + vbi_len;
    let total_len = body_offset + remaining_len;
    if total_len > buffer.len() {
        return Ok(HeaderParse::Incomplete(total_len - buffer.len()));
    }

    Ok(HeaderParse::Complete(FixedHeader {
        first_byte: buffer[0],
        remaining_len,
        body_offset,
        total_len,
    }))
}

pub fn packet_type(buffer: &[u8]) -> Result<u8, ParseError> {
    if buffer.is_empty() {
        return Err(ParseError::BufferTooShort);
    }
    Ok(buffer[0] >> 4)
}

// 1.5.3 UTF-8 Encoded String
pub fn parse_utf8_string(buffer: &[u8]) -> Result<(String, usize), ParseError> {
    Utf8String::decode(buffer)
}

pub fn parse_packet_id(buffer: &[u8]) -> Result<(u16, usize), ParseError> {
    TwoByteInteger::decode(buffer)
}

pub mod stream;
