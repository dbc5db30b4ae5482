//! The `reject` message.

use super::codec::decode_lossy_string;
use super::MAX_MESSAGE_SIZE;
use bitcoin::consensus::encode::{self, Decodable, Encodable};
use bitcoin::io::{self, Read, Write};
use std::fmt;

/// Machine readable reason a peer rejected one of our messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectCode {
    Malformed,
    Invalid,
    Obsolete,
    Duplicate,
    Nonstandard,
    Dust,
    InsufficientFee,
    Checkpoint,
    /// A code this implementation does not know, kept verbatim.
    Unknown(u8),
}

impl RejectCode {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RejectCode::Malformed => "malformed",
            RejectCode::Invalid => "invalid",
            RejectCode::Obsolete => "obsolete",
            RejectCode::Duplicate => "duplicate",
            RejectCode::Nonstandard => "nonstandard",
            RejectCode::Dust => "dust",
            RejectCode::InsufficientFee => "insufficient-fee",
            RejectCode::Checkpoint => "checkpoint",
            RejectCode::Unknown(_) => "unknown",
        }
    }
}

impl From<u8> for RejectCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => RejectCode::Malformed,
            0x10 => RejectCode::Invalid,
            0x11 => RejectCode::Obsolete,
            0x12 => RejectCode::Duplicate,
            0x40 => RejectCode::Nonstandard,
            0x41 => RejectCode::Dust,
            0x42 => RejectCode::InsufficientFee,
            0x43 => RejectCode::Checkpoint,
            other => RejectCode::Unknown(other),
        }
    }
}

impl From<RejectCode> for u8 {
    fn from(code: RejectCode) -> Self {
        match code {
            RejectCode::Malformed => 0x01,
            RejectCode::Invalid => 0x10,
            RejectCode::Obsolete => 0x11,
            RejectCode::Duplicate => 0x12,
            RejectCode::Nonstandard => 0x40,
            RejectCode::Dust => 0x41,
            RejectCode::InsufficientFee => 0x42,
            RejectCode::Checkpoint => 0x43,
            RejectCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A `reject` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectMessage {
    /// Command of the rejected message.
    pub message: String,
    pub code: RejectCode,
    /// Human readable reason.
    pub reason: String,
    /// Trailing data, usually the hash of the rejected object.
    pub data: Vec<u8>,
}

impl Decodable for RejectMessage {
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let message = decode_lossy_string(r)?;
        let code = RejectCode::from(u8::consensus_decode(r)?);
        let reason = decode_lossy_string(r)?;
        let mut data = Vec::new();
        r.read_to_limit(&mut data, u64::from(MAX_MESSAGE_SIZE))?;
        Ok(RejectMessage {
            message,
            code,
            reason,
            data,
        })
    }
}

impl Encodable for RejectMessage {
    fn consensus_encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.message.consensus_encode(w)?;
        len += u8::from(self.code).consensus_encode(w)?;
        len += self.reason.consensus_encode(w)?;
        w.write_all(&self.data)?;
        Ok(len + self.data.len())
    }
}

impl fmt::Display for RejectMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code, self.message, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::consensus::encode::{deserialize, serialize};

    #[test]
    fn test_decode_reject() {
        let mut payload = vec![7];
        payload.extend_from_slice(b"version");
        payload.push(0x11);
        payload.push(8);
        payload.extend_from_slice(b"obsolete");
        payload.extend_from_slice(&[0xaa; 4]);

        let reject = deserialize::<RejectMessage>(&payload).unwrap();
        assert_eq!(reject.message, "version");
        assert_eq!(reject.code, RejectCode::Obsolete);
        assert_eq!(reject.reason, "obsolete");
        assert_eq!(reject.data, vec![0xaa; 4]);
        assert_eq!(reject.to_string(), "obsolete version obsolete");
        assert_eq!(serialize(&reject), payload);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(RejectCode::from(0x42).name(), "insufficient-fee");
        assert_eq!(RejectCode::from(0x43).name(), "checkpoint");
        let unknown = RejectCode::from(0x77);
        assert_eq!(unknown.name(), "unknown");
        assert_eq!(u8::from(unknown), 0x77);
    }
}
