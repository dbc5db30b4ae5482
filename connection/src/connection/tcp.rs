//! TCP-specific connections.

use super::handshake::perform_handshake;
use super::{AsyncConnection, ConnectionConfiguration, ConnectionError};
use crate::peer::PeerAddress;
use crate::transport::AsyncTransport;
use log::debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A TCP-based connection to a Dogecoin peer.
///
/// This is a convenience type alias for [`AsyncConnection`] with Tokio's TCP stream halves.
pub type TcpConnection = AsyncConnection<OwnedReadHalf, OwnedWriteHalf>;

/// Helper function to establish TCP connection with timeout and nodelay.
async fn establish_tcp_connection(
    socket_addr: SocketAddr,
    connect_timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    match timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => {
            // No delay is helpful for the small packets of the p2p protocol.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(ConnectionError::Io(e)),
        Err(_) => Err(ConnectionError::Timeout(connect_timeout)),
    }
}

/// Establish a TCP connection to a Dogecoin peer and perform the handshake.
///
/// This function handles:
/// 1. TCP connection establishment with timeout
/// 2. TCP socket configuration (nodelay)
/// 3. Version handshake, bounded by the handshake timeout
///
/// # Arguments
///
/// * `peer` - The peer to connect to
/// * `configuration` - Configuration for the connection
///
/// # Returns
///
/// A fully established and handshaked connection ready for use.
pub async fn connect(
    peer: PeerAddress,
    configuration: &ConnectionConfiguration,
) -> Result<TcpConnection, ConnectionError> {
    debug!("[{peer}] connecting");
    let stream = establish_tcp_connection(peer.socket_addr(), configuration.connection_timeout).await?;
    let (reader, writer) = stream.into_split();
    let mut transport = AsyncTransport::new(configuration.magic, reader, writer);

    let peer_version = match timeout(
        configuration.handshake_timeout,
        perform_handshake(&mut transport, &peer, configuration),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(ConnectionError::Timeout(configuration.handshake_timeout)),
    };

    Ok(AsyncConnection::new(
        peer,
        configuration.advertised_version(),
        peer_version,
        transport,
    ))
}
