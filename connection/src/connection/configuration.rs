//! Connection configuration types and constants.

use crate::message::{dogecoin_magic, NetAddress, VersionMessage};
use crate::peer::DEFAULT_PORT;
use bitcoin::p2p::{Magic, ServiceFlags};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Highest protocol version this crate speaks.
pub const MAX_PROTOCOL_VERSION: i32 = 70015;

/// User agent advertised to peers.
pub const DEFAULT_USER_AGENT: &str = "/DogeBox: DogeMap Service/";

/// Nonce sent in our version messages.
///
/// Peers use it to detect connections to themselves. It is constant, so a crawler
/// will notice if it ever dials its own address.
pub const DEFAULT_NONCE: u64 = 23972479;

/// Minimum chain height we advertise.
pub const DEFAULT_START_HEIGHT: i32 = 700000;

/// Default timeout for connection establishment.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the version exchange once connected.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration used to build a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfiguration {
    /// Network magic framing every message.
    pub magic: Magic,
    /// Protocol version advertised, capped at [`MAX_PROTOCOL_VERSION`].
    pub protocol_version: i32,
    /// Service flags advertised by this node.
    pub services: ServiceFlags,
    /// User agent advertised in version messages.
    pub user_agent: String,
    /// Nonce sent in version messages.
    pub nonce: u64,
    /// Block height advertised in version messages.
    pub start_height: i32,
    /// Whether to ask the peer to relay transactions.
    pub relay: bool,
    /// Timeout for connection establishment.
    pub connection_timeout: Duration,
    /// Timeout for the version exchange.
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self {
            magic: dogecoin_magic(),
            protocol_version: MAX_PROTOCOL_VERSION,
            services: ServiceFlags::NONE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            nonce: DEFAULT_NONCE,
            start_height: DEFAULT_START_HEIGHT,
            relay: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ConnectionConfiguration {
    /// The protocol version actually advertised.
    pub fn advertised_version(&self) -> i32 {
        self.protocol_version.min(MAX_PROTOCOL_VERSION)
    }

    /// Set the timeout for connection establishment.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use dogemap_connection::ConnectionConfiguration;
    ///
    /// let config = ConnectionConfiguration::default()
    ///     .with_connection_timeout(Duration::from_secs(5));
    /// assert_eq!(config.connection_timeout, Duration::from_secs(5));
    /// ```
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the timeout for the version exchange.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the user agent advertised to peers.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build our `version` message.
    ///
    /// The address fields are placeholders, peers ignore them.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - Our clock in Unix seconds.
    pub fn version_message(&self, timestamp: i64) -> VersionMessage {
        VersionMessage {
            version: self.advertised_version(),
            services: self.services,
            timestamp,
            receiver: NetAddress {
                time: None,
                services: ServiceFlags::NONE,
                address: Ipv4Addr::UNSPECIFIED.to_ipv6_mapped(),
                port: DEFAULT_PORT,
            },
            sender: NetAddress {
                time: None,
                services: self.services,
                address: Ipv6Addr::UNSPECIFIED,
                port: 0,
            },
            nonce: self.nonce,
            user_agent: self.user_agent.clone(),
            start_height: self.start_height,
            relay: self.relay,
        }
    }
}

impl fmt::Display for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfiguration {{ magic: {}, protocol: {}, user_agent: \"{}\", services: {}, relay: {} }}",
            self.magic,
            self.advertised_version(),
            self.user_agent,
            self.services,
            self.relay
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = ConnectionConfiguration::default();
        assert_eq!(config.magic, dogecoin_magic());
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.services, ServiceFlags::NONE);
        assert!(!config.relay);
    }

    #[test]
    fn test_version_is_capped() {
        let config = ConnectionConfiguration {
            protocol_version: 70016,
            ..Default::default()
        };
        assert_eq!(config.version_message(0).version, MAX_PROTOCOL_VERSION);

        let config = ConnectionConfiguration {
            protocol_version: 70001,
            ..Default::default()
        };
        assert_eq!(config.version_message(0).version, 70001);
    }

    #[test]
    fn test_version_message() {
        let msg = ConnectionConfiguration::default().version_message(1_700_000_000);
        assert_eq!(msg.nonce, DEFAULT_NONCE);
        assert_eq!(msg.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(msg.start_height, DEFAULT_START_HEIGHT);
        assert_eq!(msg.receiver.port, DEFAULT_PORT);
        assert_eq!(msg.sender.port, 0);
        assert_eq!(msg.timestamp, 1_700_000_000);
    }
}
