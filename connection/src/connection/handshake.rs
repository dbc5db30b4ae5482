//! Dogecoin p2p version handshake.
//!
//! We dial out, so the peer treats us as an inbound connection. We send our
//! `version` straight away and expect the peer's `version` as the first message
//! back. A peer that refuses us usually answers with a `reject` instead, which is
//! surfaced with its reason. Peers at protocol 209 and later expect a `verack`.

use super::configuration::ConnectionConfiguration;
use super::error::ConnectionError;
use crate::message::{NetworkMessage, ProtocolError, VersionMessage, VERACK_VERSION};
use crate::peer::PeerAddress;
use crate::transport::AsyncTransport;
use log::debug;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};

/// Gets the current Unix timestamp (seconds since January 1, 1970 00:00:00 UTC).
///
/// A clock set before the epoch reads as 0.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// State machine for tracking handshake progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Sent our version, waiting for the peer's.
    AwaitVersion,
    /// Received the peer's version, which must be acknowledged.
    SendVerack(VersionMessage),
    /// Handshake complete.
    Complete(VersionMessage),
}

impl HandshakeState {
    /// Transition on a message received while awaiting the peer's version.
    pub fn on_message(
        self,
        message: NetworkMessage,
        our_nonce: u64,
    ) -> Result<HandshakeState, ConnectionError> {
        match (self, message) {
            (HandshakeState::AwaitVersion, NetworkMessage::Version(version)) => {
                if version.nonce == our_nonce {
                    return Err(ConnectionError::ConnectionLoop);
                }
                if version.version >= VERACK_VERSION {
                    Ok(HandshakeState::SendVerack(version))
                } else {
                    Ok(HandshakeState::Complete(version))
                }
            }
            (HandshakeState::AwaitVersion, NetworkMessage::Reject(reject)) => {
                Err(ProtocolError::Rejected(reject).into())
            }
            (_, other) => Err(ProtocolError::UnexpectedMessage(other.command().to_string()).into()),
        }
    }
}

/// Run the version exchange over a fresh transport.
///
/// # Arguments
///
/// * `transport` - Framed transport to the peer, nothing exchanged yet.
/// * `peer` - Peer address, for logging.
/// * `configuration` - Source of our version message.
///
/// # Returns
///
/// The peer's version message, with the declared version already normalized.
pub async fn perform_handshake<R, W>(
    transport: &mut AsyncTransport<R, W>,
    peer: &PeerAddress,
    configuration: &ConnectionConfiguration,
) -> Result<VersionMessage, ConnectionError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let ours = configuration.version_message(unix_timestamp());
    let our_version = ours.version;
    transport
        .write(&NetworkMessage::Version(ours).into_raw(our_version))
        .await?;

    let mut state = HandshakeState::AwaitVersion;
    loop {
        state = match state {
            HandshakeState::AwaitVersion => {
                let raw = transport.read().await?;
                // Only version and reject are acceptable here, neither depends on
                // the negotiated version.
                let message = NetworkMessage::decode(raw, our_version)?;
                state.on_message(message, configuration.nonce)?
            }
            HandshakeState::SendVerack(version) => {
                debug!("[{peer}] sending verack to protocol {}", version.version);
                transport
                    .write(&NetworkMessage::Verack.into_raw(our_version))
                    .await?;
                HandshakeState::Complete(version)
            }
            HandshakeState::Complete(version) => {
                debug!(
                    "[{peer}] handshake complete: protocol {} agent {:?} height {}",
                    version.version, version.user_agent, version.start_height
                );
                return Ok(version);
            }
        };
    }
}
