//! Dogecoin peer address structures and utilities.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Default port of Dogecoin mainnet nodes.
pub const DEFAULT_PORT: u16 = 22556;

/// Size of the storage form of a [`PeerAddress`]: a 16 byte IPv6 (or IPv4-mapped)
/// host followed by a big-endian port.
pub const PEER_ADDRESS_SIZE: usize = 18;

/// Errors that can occur when parsing or decoding a [`PeerAddress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The text is not an IP address with an optional port.
    InvalidAddress(String),
    /// The storage key does not have the expected length.
    InvalidLength(usize),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::InvalidAddress(text) => write!(
                f,
                "invalid IP address: {text} (use [<ip>]:<port> for IPv6)"
            ),
            AddressError::InvalidLength(len) => write!(
                f,
                "invalid address key length {len}, expected {PEER_ADDRESS_SIZE}"
            ),
        }
    }
}

impl std::error::Error for AddressError {}

/// Network location of a peer, the identity of a registry row.
///
/// The host is kept in canonical form: IPv4-mapped IPv6 addresses are normalized
/// to plain IPv4 so that the same node gossiped in either form compares equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress {
    host: IpAddr,
    port: u16,
}

impl PeerAddress {
    /// Create a new peer address, canonicalizing the host.
    pub fn new(host: IpAddr, port: u16) -> Self {
        PeerAddress {
            host: host.to_canonical(),
            port,
        }
    }

    /// The canonical host address.
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// The listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The socket address to dial.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The host as a 16 byte IPv6 address, IPv4 hosts being IPv4-mapped.
    ///
    /// This is the form the wire protocol uses in network address records.
    pub fn ipv6(&self) -> Ipv6Addr {
        match self.host {
            IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped(),
            IpAddr::V6(ipv6) => ipv6,
        }
    }

    /// Encode as an 18 byte storage key.
    pub fn to_bytes(&self) -> [u8; PEER_ADDRESS_SIZE] {
        let mut key = [0u8; PEER_ADDRESS_SIZE];
        key[..16].copy_from_slice(&self.ipv6().octets());
        key[16..].copy_from_slice(&self.port.to_be_bytes());
        key
    }

    /// Decode an 18 byte storage key produced by [`PeerAddress::to_bytes`].
    pub fn from_bytes(key: &[u8]) -> Result<Self, AddressError> {
        if key.len() != PEER_ADDRESS_SIZE {
            return Err(AddressError::InvalidLength(key.len()));
        }
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&key[..16]);
        let port = u16::from_be_bytes([key[16], key[17]]);
        Ok(PeerAddress::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
    }

    /// Parse `ip`, `ip:port` or `[ipv6]:port`, using `default_port` when no port
    /// is given.
    ///
    /// # Example
    ///
    /// ```
    /// use dogemap_connection::PeerAddress;
    ///
    /// let addr = PeerAddress::parse_with_default_port("10.0.0.1", 22556).unwrap();
    /// assert_eq!(addr.to_string(), "10.0.0.1:22556");
    ///
    /// let addr = PeerAddress::parse_with_default_port("[::1]:1234", 22556).unwrap();
    /// assert_eq!(addr.port(), 1234);
    /// ```
    pub fn parse_with_default_port(text: &str, default_port: u16) -> Result<Self, AddressError> {
        if let Ok(socket) = text.parse::<SocketAddr>() {
            return Ok(socket.into());
        }
        let bare = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(text);
        bare.parse::<IpAddr>()
            .map(|ip| PeerAddress::new(ip, default_port))
            .map_err(|_| AddressError::InvalidAddress(text.to_string()))
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(socket: SocketAddr) -> Self {
        PeerAddress::new(socket.ip(), socket.port())
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(PeerAddress::from)
            .map_err(|_| AddressError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_mapped_ipv4_is_canonical() {
        let plain = PeerAddress::new(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), DEFAULT_PORT);
        let mapped = PeerAddress::new(
            IpAddr::V6(Ipv4Addr::new(1, 2, 3, 4).to_ipv6_mapped()),
            DEFAULT_PORT,
        );
        assert_eq!(plain, mapped);
        assert_eq!(mapped.host(), IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(mapped.to_string(), "1.2.3.4:22556");
    }

    #[test]
    fn test_storage_key() {
        let addr: PeerAddress = "5.6.7.8:22556".parse().unwrap();
        let key = addr.to_bytes();
        assert_eq!(&key[..12], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(&key[12..16], &[5, 6, 7, 8]);
        assert_eq!(&key[16..], &22556u16.to_be_bytes());
        assert_eq!(PeerAddress::from_bytes(&key).unwrap(), addr);

        let v6: PeerAddress = "[2001:db8::1]:8333".parse().unwrap();
        assert_eq!(PeerAddress::from_bytes(&v6.to_bytes()).unwrap(), v6);

        assert_eq!(
            PeerAddress::from_bytes(&key[..17]),
            Err(AddressError::InvalidLength(17))
        );
    }

    #[test]
    fn test_parse_with_default_port() {
        let addr = PeerAddress::parse_with_default_port("[2001:db8::2]", 22556).unwrap();
        assert_eq!(addr.port(), 22556);
        assert_eq!(addr.to_string(), "[2001:db8::2]:22556");

        let addr = PeerAddress::parse_with_default_port("2001:db8::2", 1).unwrap();
        assert_eq!(addr.port(), 1);

        let addr = PeerAddress::parse_with_default_port("127.0.0.1:9999", 22556).unwrap();
        assert_eq!(addr.port(), 9999);

        assert!(PeerAddress::parse_with_default_port("dogecoin.com", 22556).is_err());
    }
}
