//! Transport abstraction for MQTT connections.
//!
//! The protocol core only needs read/write/close semantics on an
//! already-connected duplex byte stream. Address resolution and any
//! TLS wrapping happen upstream of this interface; a caller may inject
//! any type implementing [`Transport`].

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod tcp;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A duplex byte stream the engine's I/O shell can drive.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Connect to `addr` (format depends on the transport type).
    async fn connect(addr: &str) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Gracefully close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Peer address as a string, for diagnostics.
    fn peer_addr(&self) -> Result<String, TransportError>;
}

/// Boxed transport for dynamic dispatch.
pub type BoxedTransport = Box<dyn Transport>;

pub use tcp::TcpTransport;
