use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, Result};

/// Session key length in bytes.
pub const KEY_SIZE: usize = 256;

/// Symmetric session key for one link.
///
/// Generated from the OS CSPRNG, or installed by the handshake after a
/// successful key exchange. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Generate a fresh random session key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Construct a session key from exactly [`KEY_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::WrongKeyLength {
                    len: bytes.len(),
                    expected: KEY_SIZE,
                })?;
        Ok(Self(arr))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionKey")
            .field(&format_args!("<redacted:{KEY_SIZE} bytes>"))
            .finish()
    }
}

/// Encrypt a byte sequence under the given session key.
///
/// Two composed reversible transforms: XOR byte `i` with
/// `key[i % KEY_SIZE]`, then rotate the result left by `i % 8` bits.
/// The rotation amount is a function of position, not a secret.
pub fn encrypt(data: &[u8], key: &SessionKey) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| (b ^ key.0[i % KEY_SIZE]).rotate_left((i % 8) as u32))
        .collect()
}

/// Decrypt a byte sequence under the given session key.
///
/// Exact inverse of [`encrypt`]: rotate right first, then XOR. The
/// order matters — each transform only inverts its counterpart when
/// applied in reverse.
pub fn decrypt(data: &[u8], key: &SessionKey) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| b.rotate_right((i % 8) as u32) ^ key.0[i % KEY_SIZE])
        .collect()
}
