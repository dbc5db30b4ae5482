//! Error types for connection handling.

use crate::message::ProtocolError;
use crate::transport::TransportError;
use std::error::Error;
use std::fmt;
use std::io;
use std::time::Duration;

/// Errors that can occur during peer connection establishment and communication.
#[derive(Debug)]
pub enum ConnectionError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// The transport layer (framing) failed.
    TransportFailed(TransportError),
    /// The peer violated the protocol, or rejected our handshake.
    ProtocolFailed(ProtocolError),
    /// Connecting or the version exchange took longer than allowed.
    Timeout(Duration),
    /// Detected a connection to ourselves (the peer echoed our nonce).
    ConnectionLoop,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(err) => write!(f, "Connection error: {err}"),
            ConnectionError::TransportFailed(err) => {
                write!(f, "Transport layer failed in peer connection: {err}")
            }
            ConnectionError::ProtocolFailed(err) => {
                write!(f, "Protocol handling failed in peer communication: {err}")
            }
            ConnectionError::Timeout(after) => {
                write!(f, "Timed out after {}s", after.as_secs())
            }
            ConnectionError::ConnectionLoop => {
                write!(f, "Detected connection to self (matching nonce)")
            }
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::Io(err) => Some(err),
            ConnectionError::TransportFailed(err) => Some(err),
            ConnectionError::ProtocolFailed(err) => Some(err),
            ConnectionError::Timeout(_) => None,
            ConnectionError::ConnectionLoop => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        ConnectionError::TransportFailed(err)
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        ConnectionError::ProtocolFailed(err)
    }
}
