use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// A typed message carried over a link.
///
/// The first three variants are reserved for the key-exchange
/// handshake; they are consumed by the [`Handshake`](crate::Handshake)
/// interceptor and never reach application handlers. The remaining
/// variants are application payloads.
///
/// Dispatch is exhaustive pattern matching — adding a variant is a
/// compile-time event for every consumer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Client → server: offer an RSA public modulus (big-endian
    /// magnitude bytes).
    OfferPublicKey { modulus: Vec<u8> },
    /// Server → client: the server's session key, RSA-encrypted under
    /// the offered modulus.
    DeliverSecretKey { ciphertext: Vec<u8> },
    /// Client → server: the key is installed; both ends may now
    /// transmit encrypted.
    ConfirmEncryption,
    /// Application text message.
    Message(String),
    /// Application binary payload.
    Blob(Vec<u8>),
}

impl Instruction {
    /// Whether this variant belongs to the reserved handshake set.
    ///
    /// Handshake instructions are exempt from the encrypted-only
    /// transmission rule and always travel in the clear.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Self::OfferPublicKey { .. } | Self::DeliverSecretKey { .. } | Self::ConfirmEncryption
        )
    }

    /// Canonical byte representation (tag + fields), independent of
    /// framing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Inverse of [`Instruction::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(LinkError::MalformedPayload)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OfferPublicKey { modulus } => f
                .debug_struct("OfferPublicKey")
                .field("modulus", &format_args!("<{} bytes>", modulus.len()))
                .finish(),
            Self::DeliverSecretKey { ciphertext } => f
                .debug_struct("DeliverSecretKey")
                .field("ciphertext", &format_args!("<{} bytes>", ciphertext.len()))
                .finish(),
            Self::ConfirmEncryption => f.write_str("ConfirmEncryption"),
            Self::Message(text) => f.debug_tuple("Message").field(text).finish(),
            Self::Blob(bytes) => f
                .debug_tuple("Blob")
                .field(&format_args!("<{} bytes>", bytes.len()))
                .finish(),
        }
    }
}
