//! Internal peer connection abstractions for testing and mocking.
//!
//! The [`PeerConnection`] trait covers what a harvest session needs from a
//! handshaked connection, and [`Connector`] creates them. Sessions are tested against
//! the mocks in `test_utils` instead of real sockets.

use dogemap_connection::message::NetworkMessage;
use dogemap_connection::{Connection, ConnectionConfiguration, ConnectionError, PeerAddress};
use std::future::Future;

/// A handshaked connection to a Dogecoin peer.
pub trait PeerConnection: Send {
    fn send(
        &mut self,
        message: NetworkMessage,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Next message from the peer.
    ///
    /// Must be cancellation safe, the harvest loop races it against deadlines.
    fn receive(&mut self) -> impl Future<Output = Result<NetworkMessage, ConnectionError>> + Send;

    fn peer(&self) -> PeerAddress;
}

impl PeerConnection for Connection {
    fn send(
        &mut self,
        message: NetworkMessage,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send {
        Connection::send(self, message)
    }

    fn receive(&mut self) -> impl Future<Output = Result<NetworkMessage, ConnectionError>> + Send {
        Connection::receive(self)
    }

    fn peer(&self) -> PeerAddress {
        Connection::peer(self)
    }
}

/// Factory for peer connections.
pub trait Connector: Clone + Send + Sync + 'static {
    type Connection: PeerConnection + Send;

    /// Connect to `peer` and complete the handshake.
    fn connect(
        &self,
        peer: PeerAddress,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

/// Creates real TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: ConnectionConfiguration,
}

impl TcpConnector {
    pub fn new(config: ConnectionConfiguration) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    type Connection = Connection;

    fn connect(
        &self,
        peer: PeerAddress,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send {
        let config = self.config.clone();
        async move { Connection::tcp(peer, &config).await }
    }
}
