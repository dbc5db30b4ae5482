//! Dogecoin p2p protocol connection.
//!
//! This module covers dialing a peer and the version handshake. The [`Connection`]
//! type is the recommended high-level API.
//!
//! # Examples
//!
//! Creating a TCP connection to a Dogecoin peer.
//!
//! ```no_run
//! use dogemap_connection::{Connection, ConnectionConfiguration, PeerAddress};
//! use dogemap_connection::message::NetworkMessage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let peer: PeerAddress = "127.0.0.1:22556".parse()?;
//!
//! // Establish the connection with automatic handshake.
//! let mut connection = Connection::tcp(peer, &ConnectionConfiguration::default()).await?;
//!
//! // Ask for peer addresses.
//! connection.send(NetworkMessage::GetAddr).await?;
//!
//! let response = connection.receive().await?;
//! println!("Received: {}", response.command());
//! # Ok(())
//! # }
//! ```

mod configuration;
mod error;
mod handshake;
mod io;
mod tcp;

pub use configuration::{
    ConnectionConfiguration, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_NONCE, DEFAULT_START_HEIGHT, DEFAULT_USER_AGENT, MAX_PROTOCOL_VERSION,
};
pub use error::ConnectionError;
pub use handshake::{perform_handshake, unix_timestamp, HandshakeState};
pub use io::AsyncConnection;
pub use tcp::TcpConnection;

use crate::message::{NetworkMessage, VersionMessage};
use crate::peer::PeerAddress;

/// Provides a unified interface to peer connections.
///
/// Only TCP is supported today. The connection owns its socket, dropping it
/// closes the connection, which is how a blocked `receive` is interrupted.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpConnection),
}

impl Connection {
    pub fn peer(&self) -> PeerAddress {
        match self {
            Connection::Tcp(conn) => conn.peer(),
        }
    }

    /// The version message the peer sent during the handshake.
    pub fn peer_version(&self) -> &VersionMessage {
        match self {
            Connection::Tcp(conn) => conn.peer_version(),
        }
    }

    /// Send a message to the peer.
    ///
    /// # Arguments
    ///
    /// * `message` - The network message to send.
    pub async fn send(&mut self, message: NetworkMessage) -> Result<(), ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.send(message).await,
        }
    }

    /// Receive a message from the peer.
    ///
    /// Cancellation safe, can be raced in `tokio::select!`.
    ///
    /// # Returns
    ///
    /// * `Ok(`[`NetworkMessage`]`)` - The received message
    /// * `Err(`[`ConnectionError`]`)` - If an error occurred during message reception
    pub async fn receive(&mut self) -> Result<NetworkMessage, ConnectionError> {
        match self {
            Connection::Tcp(conn) => conn.receive().await,
        }
    }

    /// Establish a TCP connection to a Dogecoin peer and perform the handshake.
    ///
    /// # Arguments
    ///
    /// * `peer` - The peer to connect to.
    /// * `configuration` - Configuration for the connection.
    ///
    /// # Returns
    ///
    /// * `Ok(`[`Self`]`)` - A successfully established and handshaked connection
    /// * `Err(`[`ConnectionError`]`)` - If the connection attempt or handshake failed
    pub async fn tcp(
        peer: PeerAddress,
        configuration: &ConnectionConfiguration,
    ) -> Result<Self, ConnectionError> {
        Ok(Connection::Tcp(tcp::connect(peer, configuration).await?))
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Tcp(tcp) => write!(f, "TCP {tcp}"),
        }
    }
}
