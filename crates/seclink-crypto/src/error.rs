/// Errors that can occur in cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The plaintext does not fit under the peer's modulus.
    /// Multi-block chunking is not supported.
    #[error("plaintext too large for RSA modulus ({bits} bits, modulus {modulus_bits} bits)")]
    OversizedPlaintext { bits: u64, modulus_bits: u64 },

    /// A session key was constructed from a slice of the wrong length.
    #[error("wrong session key length ({len} bytes, expected {expected})")]
    WrongKeyLength { len: usize, expected: usize },

    /// The public exponent is not invertible modulo phi(n).
    /// Cannot occur for validly generated primes; surfaced rather than
    /// crashing on the arithmetic impossibility.
    #[error("public exponent not invertible modulo phi(n)")]
    NotInvertible,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
