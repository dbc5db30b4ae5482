//! Dogecoin wire messages.
//!
//! Every message is framed by a 24 byte header:
//!
//! | bytes  | field                                              |
//! |--------|----------------------------------------------------|
//! | 0..4   | network magic                                      |
//! | 4..16  | ASCII command, NUL padded                          |
//! | 16..20 | payload length, little-endian                      |
//! | 20..24 | first 4 bytes of the double SHA-256 of the payload |
//!
//! Payloads use the `bitcoin::consensus` encoding. Fields added in later protocol
//! versions are gated on the version the message carries or, for `addr`, on the
//! version negotiated with the peer.

mod address;
mod codec;
mod inventory;
mod ping;
mod reject;
mod version;

pub use address::{AddrMessage, NetAddress, ADDR_TIME_VERSION};
pub use inventory::inventory_name;
pub use ping::PingMessage;
pub use reject::{RejectCode, RejectMessage};
pub use version::{VersionMessage, EXTENDED_VERSION, RELAY_VERSION, VERACK_VERSION};

use bitcoin::consensus::encode::{self, serialize};
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::p2p::message_blockdata::{GetHeadersMessage, Inventory};
use bitcoin::p2p::Magic;
use codec::decode_prefix;
use std::fmt;

/// Bytes of the Dogecoin mainnet network magic.
const DOGECOIN_MAGIC_BYTES: [u8; 4] = [0xc0, 0xc0, 0xc0, 0xc0];

/// Dogecoin mainnet network magic.
pub fn dogecoin_magic() -> Magic {
    Magic::from_bytes(DOGECOIN_MAGIC_BYTES)
}
/// Size of a message header in bytes.
pub const HEADER_SIZE: usize = 24;
/// Size of the command field of the header.
pub const COMMAND_SIZE: usize = 12;
/// Largest payload accepted from a peer (32 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 0x0200_0000;

/// Offset in the header where the command is stored.
const COMMAND_OFFSET: usize = 4;
/// Offset in the header where the payload length is stored.
const PAYLOAD_LENGTH_OFFSET: usize = 16;
/// Offset in the header where the checksum is stored.
const CHECKSUM_OFFSET: usize = 20;

/// Violations of the wire protocol by a peer.
#[derive(Debug)]
pub enum ProtocolError {
    /// The header does not start with the expected network magic.
    BadMagic(Magic),
    /// The payload does not hash to the checksum in the header.
    ChecksumMismatch {
        expected: [u8; 4],
        actual: [u8; 4],
    },
    /// The header announces a payload larger than [`MAX_MESSAGE_SIZE`].
    MessageTooLarge(u32),
    /// The command field is not NUL padded ASCII.
    BadCommand,
    /// A payload could not be decoded.
    Malformed {
        command: String,
        error: encode::Error,
    },
    /// A message arrived that is not valid in the current handshake state.
    UnexpectedMessage(String),
    /// The peer answered the handshake with a `reject`.
    Rejected(RejectMessage),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadMagic(magic) => write!(f, "bad magic: {magic}"),
            ProtocolError::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: header {expected:02x?}, payload {actual:02x?}"
            ),
            ProtocolError::MessageTooLarge(len) => {
                write!(f, "message too large: {len} bytes (max {MAX_MESSAGE_SIZE})")
            }
            ProtocolError::BadCommand => write!(f, "bad command name in header"),
            ProtocolError::Malformed { command, error } => {
                write!(f, "malformed '{command}' message: {error}")
            }
            ProtocolError::UnexpectedMessage(command) => {
                write!(f, "expected 'version' message from peer, but received: {command}")
            }
            ProtocolError::Rejected(reject) => write!(f, "reject: {reject}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Malformed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Message commands this crate understands.
pub mod command {
    pub const VERSION: &str = "version";
    pub const VERACK: &str = "verack";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const GETADDR: &str = "getaddr";
    pub const ADDR: &str = "addr";
    pub const INV: &str = "inv";
    pub const GETHEADERS: &str = "getheaders";
    pub const REJECT: &str = "reject";
}

/// First 4 bytes of the double SHA-256 of `payload`.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d::Hash::hash(payload).to_byte_array();
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Frame a payload: header with magic, padded command, length and checksum,
/// followed by the payload itself.
///
/// Commands longer than [`COMMAND_SIZE`] are truncated.
pub fn encode_message(magic: Magic, command: &str, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; HEADER_SIZE + payload.len()];
    data[..COMMAND_OFFSET].copy_from_slice(&magic.to_bytes());
    let name = command.as_bytes();
    let len = name.len().min(COMMAND_SIZE);
    data[COMMAND_OFFSET..COMMAND_OFFSET + len].copy_from_slice(&name[..len]);
    data[PAYLOAD_LENGTH_OFFSET..CHECKSUM_OFFSET]
        .copy_from_slice(&(payload.len() as u32).to_le_bytes());
    data[CHECKSUM_OFFSET..HEADER_SIZE].copy_from_slice(&checksum(payload));
    data[HEADER_SIZE..].copy_from_slice(payload);
    data
}

/// A decoded message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: Magic,
    pub command: String,
    pub length: u32,
    pub checksum: [u8; 4],
}

impl MessageHeader {
    /// Decode and validate a header against the expected network magic.
    ///
    /// The announced length is bounded here, before any payload buffer is allocated.
    pub fn decode(header: &[u8; HEADER_SIZE], expected: Magic) -> Result<Self, ProtocolError> {
        let magic = Magic::from_bytes([header[0], header[1], header[2], header[3]]);
        if magic != expected {
            return Err(ProtocolError::BadMagic(magic));
        }

        let raw_command = &header[COMMAND_OFFSET..PAYLOAD_LENGTH_OFFSET];
        let end = raw_command
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(COMMAND_SIZE);
        if !raw_command[..end].is_ascii() || raw_command[end..].iter().any(|b| *b != 0) {
            return Err(ProtocolError::BadCommand);
        }
        let command = String::from_utf8_lossy(&raw_command[..end]).into_owned();

        let length = u32::from_le_bytes([
            header[PAYLOAD_LENGTH_OFFSET],
            header[PAYLOAD_LENGTH_OFFSET + 1],
            header[PAYLOAD_LENGTH_OFFSET + 2],
            header[PAYLOAD_LENGTH_OFFSET + 3],
        ]);
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        Ok(MessageHeader {
            magic,
            command,
            length,
            checksum: [
                header[CHECKSUM_OFFSET],
                header[CHECKSUM_OFFSET + 1],
                header[CHECKSUM_OFFSET + 2],
                header[CHECKSUM_OFFSET + 3],
            ],
        })
    }

    /// Verify a payload against the checksum of this header.
    pub fn verify(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        let actual = checksum(payload);
        if actual != self.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

/// A framed message whose payload has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub command: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(command: impl Into<String>, payload: Vec<u8>) -> Self {
        RawMessage {
            command: command.into(),
            payload,
        }
    }

    /// Serialize with header for the given network.
    pub fn encode(&self, magic: Magic) -> Vec<u8> {
        encode_message(magic, &self.command, &self.payload)
    }
}

/// The messages exchanged while crawling.
///
/// Anything else a peer sends is kept as [`NetworkMessage::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    Version(VersionMessage),
    Verack,
    Ping(PingMessage),
    Pong(PingMessage),
    GetAddr,
    Addr(AddrMessage),
    Inv(Vec<Inventory>),
    GetHeaders(GetHeadersMessage),
    Reject(RejectMessage),
    Unknown { command: String, payload: Vec<u8> },
}

impl NetworkMessage {
    /// The command name of this message.
    pub fn command(&self) -> &str {
        match self {
            NetworkMessage::Version(_) => command::VERSION,
            NetworkMessage::Verack => command::VERACK,
            NetworkMessage::Ping(_) => command::PING,
            NetworkMessage::Pong(_) => command::PONG,
            NetworkMessage::GetAddr => command::GETADDR,
            NetworkMessage::Addr(_) => command::ADDR,
            NetworkMessage::Inv(_) => command::INV,
            NetworkMessage::GetHeaders(_) => command::GETHEADERS,
            NetworkMessage::Reject(_) => command::REJECT,
            NetworkMessage::Unknown { command, .. } => command,
        }
    }

    /// Interpret a raw message. `version` is the protocol version negotiated with
    /// the peer, which gates optional fields.
    pub fn decode(raw: RawMessage, version: i32) -> Result<Self, ProtocolError> {
        match decode_known(&raw.command, &raw.payload, version) {
            Some(Ok(message)) => Ok(message),
            Some(Err(error)) => Err(ProtocolError::Malformed {
                command: raw.command,
                error,
            }),
            None => Ok(NetworkMessage::Unknown {
                command: raw.command,
                payload: raw.payload,
            }),
        }
    }

    /// Serialize the payload of this message for the negotiated `version`.
    pub fn encode_payload(&self, version: i32) -> Vec<u8> {
        match self {
            NetworkMessage::Version(msg) => serialize(msg),
            NetworkMessage::Verack | NetworkMessage::GetAddr => Vec::new(),
            NetworkMessage::Ping(ping) | NetworkMessage::Pong(ping) => ping.encode(),
            NetworkMessage::Addr(msg) => msg.encode(version),
            NetworkMessage::Inv(inventory) => serialize(inventory),
            NetworkMessage::GetHeaders(msg) => serialize(msg),
            NetworkMessage::Reject(msg) => serialize(msg),
            NetworkMessage::Unknown { payload, .. } => payload.clone(),
        }
    }

    /// Convert into a raw message for the negotiated `version`.
    pub fn into_raw(self, version: i32) -> RawMessage {
        let payload = self.encode_payload(version);
        match self {
            NetworkMessage::Unknown { command, .. } => RawMessage { command, payload },
            other => RawMessage::new(other.command(), payload),
        }
    }
}

/// Decode the payload of a known command, `None` for commands this crate ignores.
fn decode_known(
    name: &str,
    payload: &[u8],
    version: i32,
) -> Option<Result<NetworkMessage, encode::Error>> {
    let message = match name {
        command::VERSION => decode_prefix(payload).map(NetworkMessage::Version),
        command::VERACK => Ok(NetworkMessage::Verack),
        command::PING => Ok(NetworkMessage::Ping(PingMessage::decode(payload))),
        command::PONG => Ok(NetworkMessage::Pong(PingMessage::decode(payload))),
        command::GETADDR => Ok(NetworkMessage::GetAddr),
        command::ADDR => AddrMessage::decode(payload, version).map(NetworkMessage::Addr),
        command::INV => decode_prefix(payload).map(NetworkMessage::Inv),
        command::GETHEADERS => decode_prefix(payload).map(NetworkMessage::GetHeaders),
        command::REJECT => decode_prefix(payload).map(NetworkMessage::Reject),
        _ => return None,
    };
    Some(message)
}
