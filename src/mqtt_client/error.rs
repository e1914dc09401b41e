// SPDX-License-Identifier: MPL-2.0

//! Error types for MQTT client operations.
//!
//! The taxonomy separates local faults (configuration, encoding) from
//! connection-level faults (timeouts, broker refusals, transport loss,
//! protocol violations) so callers can tell what is retryable.

use crate::mqtt_serde::parser::ParseError;
use crate::mqtt_session::SessionError;
use std::fmt;
use std::io;

/// Error type for every client-facing operation.
#[derive(Debug, Clone, serde::Serialize)]
pub enum MqttClientError {
    // ==================== Configuration (local, never retried) ====================
    /// Bad constructor argument. Reported synchronously, before any I/O.
    InvalidConfiguration { field: String, reason: String },

    // ==================== Connection ====================
    /// Broker refused the CONNECT, with its stated return code.
    ConnectionRefused {
        return_code: u8,
        description: String,
    },

    /// No CONNACK arrived within the connect timeout.
    ConnectTimeout { timeout_ms: u64 },

    /// The connection dropped; raised to every pending operation.
    ConnectionLost { reason: String },

    /// Underlying stream failed or closed.
    NetworkError {
        #[serde(skip)]
        kind: io::ErrorKind,
        message: String,
    },

    // ==================== Protocol ====================
    /// Inbound bytes did not form a valid MQTT frame. Fatal for the
    /// connection.
    PacketParsing { parse_error: String },

    /// The broker acknowledged a packet identifier we never issued, or
    /// one in the wrong handshake stage. Fatal for the connection.
    UnknownPacketId { packet_id: u16 },

    /// Any other violation of the v3.1.1 exchange rules.
    ProtocolViolation { message: String },

    // ==================== Session ====================
    /// All 65,535 packet identifiers carry outstanding operations.
    PacketIdExhausted,

    // ==================== State ====================
    /// Operation attempted in a state that cannot serve it.
    InvalidState { expected: String, actual: String },

    /// Not connected to the broker.
    NotConnected,

    // ==================== Resources ====================
    /// Internal channel closed; the worker task is gone.
    ChannelClosed { channel: String },
}

impl MqttClientError {
    /// True when retrying (usually after reconnecting) can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectionLost { .. }
                | Self::NetworkError { .. }
                | Self::NotConnected
                | Self::PacketIdExhausted
        )
    }

    /// True for faults no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::PacketParsing { .. }
                | Self::UnknownPacketId { .. }
                | Self::ProtocolViolation { .. }
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidConfiguration { field, reason } => {
                format!("Invalid configuration for '{}': {}", field, reason)
            }
            Self::ConnectionRefused {
                return_code,
                description,
            } => format!(
                "Connection refused by broker: {} (code: 0x{:02X})",
                description, return_code
            ),
            Self::ConnectTimeout { timeout_ms } => {
                format!("CONNACK not received within {} ms", timeout_ms)
            }
            Self::ConnectionLost { reason } => {
                format!("Connection to broker lost: {}", reason)
            }
            Self::NetworkError { kind, message } => {
                format!("Network error ({:?}): {}", kind, message)
            }
            Self::PacketParsing { parse_error } => {
                format!("Failed to parse MQTT frame: {}", parse_error)
            }
            Self::UnknownPacketId { packet_id } => {
                format!(
                    "Broker acknowledged unknown packet identifier {}",
                    packet_id
                )
            }
            Self::ProtocolViolation { message } => {
                format!("MQTT protocol violation: {}", message)
            }
            Self::PacketIdExhausted => {
                "All packet identifiers are in use. Wait for pending operations to complete."
                    .to_string()
            }
            Self::InvalidState { expected, actual } => {
                format!("Invalid state: expected {}, but was {}", expected, actual)
            }
            Self::NotConnected => "Not connected to broker. Call connect() first.".to_string(),
            Self::ChannelClosed { channel } => {
                format!("Internal channel '{}' closed unexpectedly", channel)
            }
        }
    }

    /// Convert from io::Error with context about where it occurred.
    pub fn from_io_error(error: io::Error, context: &str) -> Self {
        Self::NetworkError {
            kind: error.kind(),
            message: format!("{}: {}", context, error),
        }
    }
}

impl fmt::Display for MqttClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for MqttClientError {}

impl From<io::Error> for MqttClientError {
    fn from(error: io::Error) -> Self {
        Self::NetworkError {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<ParseError> for MqttClientError {
    fn from(error: ParseError) -> Self {
        Self::PacketParsing {
            parse_error: error.to_string(),
        }
    }
}

impl From<SessionError> for MqttClientError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::PacketIdsExhausted => Self::PacketIdExhausted,
            SessionError::UnknownPacketId(packet_id) => Self::UnknownPacketId { packet_id },
        }
    }
}

/// Type alias for Result with MqttClientError.
pub type MqttClientResult<T> = Result<T, MqttClientError>;
