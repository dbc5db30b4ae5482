//! I/O layer for connection handling.
//!
//! [`AsyncConnection`] wraps a framed transport whose handshake has completed and
//! interprets payloads at the protocol version negotiated with the peer.

use super::error::ConnectionError;
use crate::message::NetworkMessage;
use crate::message::VersionMessage;
use crate::peer::PeerAddress;
use crate::transport::AsyncTransport;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};

/// A handshaked connection to a Dogecoin peer.
///
/// # Trait Bounds
///
/// * [`AsyncRead`]/[`AsyncWrite`] - Required for async I/O operations.
/// * [`Unpin`] - Required because uses `&mut self` with `.await`.
/// * [`Send`] - Allows the connection to be sent between threads/tasks.
///
/// Dropping the connection drops the underlying stream, which for TCP closes the
/// socket.
///
/// [`AsyncRead`]: tokio::io::AsyncRead
/// [`AsyncWrite`]: tokio::io::AsyncWrite
/// [`Unpin`]: core::marker::Unpin
/// [`Send`]: core::marker::Send
#[derive(Debug)]
pub struct AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    peer: PeerAddress,
    /// The peer's version message from the handshake.
    peer_version: VersionMessage,
    /// Lower of ours and the peer's protocol version.
    negotiated_version: i32,
    transport: AsyncTransport<R, W>,
}

impl<R, W> std::fmt::Display for AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connection to {} (protocol {}, {})",
            self.peer, self.negotiated_version, self.peer_version.user_agent
        )
    }
}

impl<R, W> AsyncConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap a transport on which the handshake has completed.
    pub(crate) fn new(
        peer: PeerAddress,
        our_version: i32,
        peer_version: VersionMessage,
        transport: AsyncTransport<R, W>,
    ) -> Self {
        let negotiated_version = our_version.min(peer_version.version);
        Self {
            peer,
            peer_version,
            negotiated_version,
            transport,
        }
    }

    pub fn peer(&self) -> PeerAddress {
        self.peer
    }

    /// The version message the peer sent during the handshake.
    pub fn peer_version(&self) -> &VersionMessage {
        &self.peer_version
    }

    /// Protocol version used to gate message fields on this connection.
    pub fn negotiated_version(&self) -> i32 {
        self.negotiated_version
    }

    /// Send a message to the peer.
    pub async fn send(&mut self, message: NetworkMessage) -> Result<(), ConnectionError> {
        trace!("[{}] sending {}", self.peer, message.command());
        self.transport
            .write(&message.into_raw(self.negotiated_version))
            .await?;
        Ok(())
    }

    /// Receive the next message from the peer.
    ///
    /// Cancellation safe: a partially read message is resumed on the next call.
    pub async fn receive(&mut self) -> Result<NetworkMessage, ConnectionError> {
        let raw = self.transport.read().await?;
        trace!(
            "[{}] received {} ({} bytes)",
            self.peer,
            raw.command,
            raw.payload.len()
        );
        Ok(NetworkMessage::decode(raw, self.negotiated_version)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfiguration;
    use crate::message::{dogecoin_magic, encode_message, AddrMessage, NetAddress, PingMessage};
    use bitcoin::p2p::ServiceFlags;
    use tokio_test::io::Builder as MockIoBuilder;

    fn version(version: i32) -> VersionMessage {
        let mut msg = ConnectionConfiguration::default().version_message(0);
        msg.version = version;
        msg
    }

    #[tokio::test]
    async fn test_receive_decodes_at_negotiated_version() {
        // A peer below 31402 sends addr records without the time field.
        let addr = AddrMessage {
            addresses: vec![NetAddress {
                time: None,
                services: ServiceFlags::NETWORK,
                address: std::net::Ipv4Addr::new(1, 2, 3, 4).to_ipv6_mapped(),
                port: 22556,
            }],
        };
        let bytes = encode_message(dogecoin_magic(), "addr", &addr.encode(31401));
        let reader = MockIoBuilder::new().read(&bytes).build();
        let transport = AsyncTransport::new(dogecoin_magic(), reader, Vec::new());
        let mut connection = AsyncConnection::new(
            "1.2.3.4:22556".parse().unwrap(),
            70015,
            version(31401),
            transport,
        );
        assert_eq!(connection.negotiated_version(), 31401);

        match connection.receive().await.unwrap() {
            NetworkMessage::Addr(received) => assert_eq!(received, addr),
            other => panic!("expected addr, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_frames_message() {
        let expected = encode_message(dogecoin_magic(), "pong", &5u64.to_le_bytes());
        let writer = MockIoBuilder::new().write(&expected).build();
        let reader = MockIoBuilder::new().build();
        let transport = AsyncTransport::new(dogecoin_magic(), reader, writer);
        let mut connection = AsyncConnection::new(
            "1.2.3.4:22556".parse().unwrap(),
            70015,
            version(70015),
            transport,
        );

        connection
            .send(NetworkMessage::Pong(PingMessage::new(5)))
            .await
            .unwrap();
    }
}
