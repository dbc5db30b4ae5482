//! The `version` handshake message.
//!
//! Fields are disclosed progressively by protocol version:
//!
//! * **106** - sender address, nonce, user agent and start height.
//! * **209** - peers expect a `verack` in reply.
//! * **70001** - relay flag, which some peers still omit.

use super::address::NetAddress;
use super::codec::{decode_lossy_string, decode_optional};
use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::io::{self, Read, Write};
use bitcoin::p2p::ServiceFlags;

/// Protocol version which added the sender address, nonce, user agent and height.
pub const EXTENDED_VERSION: i32 = 106;
/// Protocol version from which a `version` must be acknowledged with `verack`.
pub const VERACK_VERSION: i32 = 209;
/// Protocol version which added the relay flag.
pub const RELAY_VERSION: i32 = 70001;

/// Version announced by a widely deployed seeder bug, which really means 300.
const SEEDER_BUG_VERSION: i32 = 10300;
const SEEDER_BUG_NORMALIZED: i32 = 300;

/// A `version` message.
///
/// Fields a peer's protocol version does not carry keep their default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    /// Protocol version, normalized on decode.
    pub version: i32,
    /// Services offered by the sender.
    pub services: ServiceFlags,
    /// Sender's clock in Unix seconds.
    pub timestamp: i64,
    /// Address of the receiving node as the sender sees it.
    pub receiver: NetAddress,
    /// Address of the sending node, ignored by modern peers.
    pub sender: NetAddress,
    /// Random nonce used to detect connections to self.
    pub nonce: u64,
    /// Free-form software identifier, for example `/Shibetoshi:1.14.9/`.
    pub user_agent: String,
    /// Best chain height known to the sender.
    pub start_height: i32,
    /// Whether the sender wants transactions relayed.
    pub relay: bool,
}

impl Decodable for VersionMessage {
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let mut version = i32::consensus_decode(r)?;
        if version == SEEDER_BUG_VERSION {
            version = SEEDER_BUG_NORMALIZED;
        }

        let mut msg = VersionMessage {
            version,
            services: Decodable::consensus_decode(r)?,
            timestamp: Decodable::consensus_decode(r)?,
            receiver: Decodable::consensus_decode(r)?,
            sender: NetAddress::UNSPECIFIED,
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: false,
        };

        if version >= EXTENDED_VERSION {
            msg.sender = Decodable::consensus_decode(r)?;
            msg.nonce = Decodable::consensus_decode(r)?;
            msg.user_agent = decode_lossy_string(r)?;
            // Peers older than 209 may stop before the height.
            msg.start_height = if version >= VERACK_VERSION {
                Decodable::consensus_decode(r)?
            } else {
                decode_optional(r)?.unwrap_or_default()
            };
            // Some peers claim 70001+ but never send the trailing flag.
            if version >= RELAY_VERSION {
                msg.relay = decode_optional(r)?.unwrap_or_default();
            }
        }

        Ok(msg)
    }
}

impl Encodable for VersionMessage {
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.version.consensus_encode(w)?;
        len += self.services.consensus_encode(w)?;
        len += self.timestamp.consensus_encode(w)?;
        len += self.receiver.consensus_encode(w)?;
        if self.version >= EXTENDED_VERSION {
            len += self.sender.consensus_encode(w)?;
            len += self.nonce.consensus_encode(w)?;
            len += self.user_agent.consensus_encode(w)?;
            len += self.start_height.consensus_encode(w)?;
            if self.version >= RELAY_VERSION {
                len += self.relay.consensus_encode(w)?;
            }
        }
        Ok(len)
    }
}
