//! Dogecoin peer-to-peer wire protocol and outbound connections.
//!
//! * [`message`] - message framing and payload codecs.
//! * [`AsyncTransport`] - framed, checksummed messages over any async byte stream.
//! * [`Connection`] - a TCP connection with the version handshake done.

mod connection;
pub mod message;
mod peer;
mod transport;

pub use connection::{
    perform_handshake, unix_timestamp, AsyncConnection, Connection, ConnectionConfiguration,
    ConnectionError, HandshakeState, TcpConnection, DEFAULT_CONNECTION_TIMEOUT,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_NONCE, DEFAULT_START_HEIGHT, DEFAULT_USER_AGENT,
    MAX_PROTOCOL_VERSION,
};
pub use peer::{AddressError, PeerAddress, DEFAULT_PORT, PEER_ADDRESS_SIZE};
pub use transport::{AsyncTransport, AsyncTransportReader, AsyncTransportWriter, TransportError};
