//! The `ping` and `pong` keep-alive messages.

use bitcoin::consensus::encode::{deserialize_partial, serialize};

/// Payload shared by `ping` and `pong`.
///
/// The payload is kept verbatim so a pong echoes exactly what the ping carried.
/// Peers speaking a protocol older than BIP 31 send an empty ping, and some send a
/// nonce of the wrong size; neither is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingMessage {
    payload: Vec<u8>,
}

impl PingMessage {
    pub fn new(nonce: u64) -> Self {
        PingMessage {
            payload: serialize(&nonce),
        }
    }

    pub fn decode(payload: &[u8]) -> Self {
        PingMessage {
            payload: payload.to_vec(),
        }
    }

    /// The nonce, if the payload is long enough to hold one.
    pub fn nonce(&self) -> Option<u64> {
        deserialize_partial(&self.payload)
            .ok()
            .map(|(nonce, _)| nonce)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self) -> Vec<u8> {
        self.payload.clone()
    }
}
