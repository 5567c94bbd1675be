//! Cryptographic primitives for seclink: RSA key exchange and the
//! symmetric session cipher.
//!
//! The RSA side is textbook modular exponentiation over large probable
//! primes and carries real key-exchange weight. The symmetric cipher is
//! a deliberately lightweight XOR + bit-rotation transform: it obscures
//! traffic once a session key is installed but makes no confidentiality
//! guarantee beyond that. Treat it as an obfuscation layer.

pub mod cipher;
pub mod error;
pub mod rsa;

pub use cipher::{decrypt, encrypt, SessionKey, KEY_SIZE};
pub use error::{CryptoError, Result};
pub use rsa::{RsaKeyPair, MIN_PRIME_SEPARATION_BITS, PRIME_BITS, PUBLIC_EXPONENT};
