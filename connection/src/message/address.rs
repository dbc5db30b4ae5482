//! Network address records and the `addr` gossip message.

use super::codec::decode_count;
use crate::peer::PeerAddress;
use bitcoin::consensus::encode::{self, Decodable, Encodable, VarInt};
use bitcoin::io::{self, Read, Write};
use bitcoin::p2p::ServiceFlags;
use std::net::Ipv6Addr;

/// Protocol version which added the `time` field to network address records.
///
/// Records embedded in a `version` message never carry it.
pub const ADDR_TIME_VERSION: i32 = 31402;

/// A peer's network address as carried on the wire.
///
/// The consensus encoding is the untimed 26 byte record found in `version`
/// messages. [`AddrMessage`] adds the `time` prefix when the protocol version
/// carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    /// Unix seconds the address was last seen, when the enclosing protocol
    /// version carries it.
    pub time: Option<u32>,
    /// Services advertised for the address.
    pub services: ServiceFlags,
    /// IPv6 or IPv4-mapped host.
    pub address: Ipv6Addr,
    /// Listening port.
    pub port: u16,
}

impl NetAddress {
    /// An all-zero record, used where a peer ignores the field.
    pub const UNSPECIFIED: NetAddress = NetAddress {
        time: None,
        services: ServiceFlags::NONE,
        address: Ipv6Addr::UNSPECIFIED,
        port: 0,
    };

    /// Create an untimed record for a peer.
    pub fn new(peer: &PeerAddress, services: ServiceFlags) -> Self {
        NetAddress {
            time: None,
            services,
            address: peer.ipv6(),
            port: peer.port(),
        }
    }

    /// The canonical peer address of this record.
    pub fn peer_address(&self) -> PeerAddress {
        PeerAddress::new(self.address.into(), self.port)
    }

    fn decode_timed<R: Read + ?Sized>(r: &mut R, version: i32) -> Result<Self, encode::Error> {
        let time = if version >= ADDR_TIME_VERSION {
            Some(u32::consensus_decode(r)?)
        } else {
            None
        };
        Ok(NetAddress {
            time,
            ..NetAddress::consensus_decode(r)?
        })
    }

    fn encode_timed<W: Write + ?Sized>(&self, w: &mut W, version: i32) -> Result<usize, io::Error> {
        let mut len = 0;
        if version >= ADDR_TIME_VERSION {
            len += self.time.unwrap_or_default().consensus_encode(w)?;
        }
        Ok(len + self.consensus_encode(w)?)
    }
}

impl Encodable for NetAddress {
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.services.consensus_encode(w)?;
        len += self.address.octets().consensus_encode(w)?;
        // The port is the one big-endian field.
        len += self.port.to_be_bytes().consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for NetAddress {
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Ok(NetAddress {
            time: None,
            services: Decodable::consensus_decode(r)?,
            address: Ipv6Addr::from(<[u8; 16]>::consensus_decode(r)?),
            port: u16::from_be_bytes(Decodable::consensus_decode(r)?),
        })
    }
}

/// The `addr` message: a batch of gossiped peer addresses.
///
/// Not a consensus type on its own since the record layout depends on the
/// negotiated protocol version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddrMessage {
    pub addresses: Vec<NetAddress>,
}

impl AddrMessage {
    pub fn decode(payload: &[u8], version: i32) -> Result<Self, encode::Error> {
        let mut r = payload;
        let (count, capacity) = decode_count(&mut r)?;
        let mut addresses = Vec::with_capacity(capacity);
        for _ in 0..count {
            addresses.push(NetAddress::decode_timed(&mut r, version)?);
        }
        Ok(AddrMessage { addresses })
    }

    pub fn encode(&self, version: i32) -> Vec<u8> {
        // Typically right: up to 1000 entries with the time field.
        let mut data = Vec::with_capacity(5 + 30 * self.addresses.len());
        // Writing to a Vec cannot fail.
        let _ = VarInt(self.addresses.len() as u64).consensus_encode(&mut data);
        for address in &self.addresses {
            let _ = address.encode_timed(&mut data, version);
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::{deserialize, serialize};
    use std::net::Ipv4Addr;

    /// Encoded size of a record without the `time` field.
    const NET_ADDRESS_SIZE: usize = 26;

    fn record(time: Option<u32>) -> NetAddress {
        NetAddress {
            time,
            services: ServiceFlags::NETWORK | ServiceFlags::BLOOM,
            address: Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped(),
            port: 22556,
        }
    }

    #[test]
    fn test_untimed_record() {
        let bytes = serialize(&record(Some(5)));
        assert_eq!(bytes.len(), NET_ADDRESS_SIZE);
        assert_eq!(deserialize::<NetAddress>(&bytes).unwrap(), record(None));
    }

    #[test]
    fn test_time_field_gate() {
        let msg = AddrMessage {
            addresses: vec![record(Some(1_700_000_000))],
        };

        let old = msg.encode(ADDR_TIME_VERSION - 1);
        assert_eq!(old.len(), 1 + NET_ADDRESS_SIZE);
        assert_eq!(
            AddrMessage::decode(&old, ADDR_TIME_VERSION - 1)
                .unwrap()
                .addresses,
            vec![record(None)]
        );

        let new = msg.encode(ADDR_TIME_VERSION);
        assert_eq!(new.len(), 1 + NET_ADDRESS_SIZE + 4);
        assert_eq!(AddrMessage::decode(&new, ADDR_TIME_VERSION).unwrap(), msg);
    }

    #[test]
    fn test_port_is_big_endian() {
        let bytes = serialize(&record(None));
        assert_eq!(&bytes[24..], &[0x58, 0x1c]);
        assert_eq!(record(None).peer_address().to_string(), "10.1.2.3:22556");
    }

    #[test]
    fn test_addr_message() {
        let msg = AddrMessage {
            addresses: vec![record(Some(1)), record(Some(2))],
        };
        let bytes = msg.encode(70015);
        assert_eq!(bytes[0], 2);
        assert_eq!(AddrMessage::decode(&bytes, 70015).unwrap(), msg);
    }

    #[test]
    fn test_addr_message_truncated() {
        let msg = AddrMessage {
            addresses: vec![record(Some(1)), record(Some(2))],
        };
        let mut bytes = msg.encode(70015);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            AddrMessage::decode(&bytes, 70015),
            Err(encode::Error::Io(_))
        ));
    }

    #[test]
    fn test_addr_count_larger_than_payload() {
        // Claims 0xfdfd records with only two bytes behind the prefix.
        assert!(AddrMessage::decode(&[0xfd, 0xfd, 0xfd, 0x00, 0x00], 70015).is_err());
    }
}
