//! The crawler's own network identity.

use bitcoin::hex::{FromHex, HexToBytesError};
use bitcoin::secp256k1::{self, Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;

/// Length of an encoded secret key.
pub const NODE_KEY_SIZE: usize = 32;

/// Errors that can occur while loading a [`NodeKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    InvalidHex(HexToBytesError),
    /// Decoded key is not [`NODE_KEY_SIZE`] bytes.
    InvalidLength(usize),
    /// Zero or out of range for the curve.
    InvalidKey(secp256k1::Error),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::InvalidHex(e) => write!(f, "invalid key hex: {e}"),
            KeyError::InvalidLength(len) => {
                write!(f, "invalid key length: {len} bytes, expected {NODE_KEY_SIZE}")
            }
            KeyError::InvalidKey(e) => write!(f, "invalid key: {e}"),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyError::InvalidHex(e) => Some(e),
            KeyError::InvalidLength(_) => None,
            KeyError::InvalidKey(e) => Some(e),
        }
    }
}

impl From<HexToBytesError> for KeyError {
    fn from(err: HexToBytesError) -> Self {
        KeyError::InvalidHex(err)
    }
}

impl From<secp256k1::Error> for KeyError {
    fn from(err: secp256k1::Error) -> Self {
        KeyError::InvalidKey(err)
    }
}

/// Secret key identifying this crawler, with its public half.
///
/// Passed explicitly to whatever needs it. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeKey {
    keypair: Keypair,
}

impl NodeKey {
    /// Parse a key from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = Vec::<u8>::from_hex(text.trim())?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != NODE_KEY_SIZE {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let secret = SecretKey::from_slice(bytes)?;
        let keypair = Keypair::from_secret_key(&Secp256k1::signing_only(), &secret);
        Ok(Self { keypair })
    }

    pub fn public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
