use num_bigint_dig::{BigUint, ModInverse, RandPrime};
use rand::rngs::OsRng;
use tracing::{debug, trace};

use crate::error::{CryptoError, Result};

/// Bit length of each generated prime.
pub const PRIME_BITS: usize = 1536;

/// Minimum bit length of |p - q|. Primes closer together than this are
/// rejected and regenerated, since a modulus built from near-equal
/// primes falls to Fermat-style factorization.
pub const MIN_PRIME_SEPARATION_BITS: usize = 1000;

/// Fixed public exponent, by convention.
pub const PUBLIC_EXPONENT: u32 = 65537;

/// An RSA keypair: modulus n = p*q, fixed public exponent e, private
/// exponent d = e^-1 mod phi(n).
///
/// Owned by whichever handshake run generated it; there is no
/// process-global key state. Redacted in debug output.
#[derive(Clone)]
pub struct RsaKeyPair {
    modulus: BigUint,
    private_exponent: BigUint,
}

impl RsaKeyPair {
    /// Generate a keypair from two 1536-bit probable primes at least
    /// 2^1000 apart.
    pub fn generate() -> Result<Self> {
        Self::generate_with(PRIME_BITS, MIN_PRIME_SEPARATION_BITS)
    }

    /// Generate a keypair with explicit prime size and separation.
    ///
    /// Production callers want [`RsaKeyPair::generate`]; the parameters
    /// exist so tests can exercise the same path with small primes.
    pub fn generate_with(prime_bits: usize, separation_bits: usize) -> Result<Self> {
        let mut rng = OsRng;
        let (p, q) = loop {
            let p: BigUint = rng.gen_prime(prime_bits);
            let q: BigUint = rng.gen_prime(prime_bits);
            let diff = if p > q { &p - &q } else { &q - &p };
            if diff.bits() > separation_bits {
                break (p, q);
            }
            trace!("generated primes too close together; retrying");
        };

        let modulus = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);
        let e = BigUint::from(PUBLIC_EXPONENT);
        let private_exponent = e
            .mod_inverse(&phi)
            .and_then(|d| d.to_biguint())
            .ok_or(CryptoError::NotInvertible)?;

        debug!(modulus_bits = modulus.bits(), "generated RSA keypair");
        Ok(Self {
            modulus,
            private_exponent,
        })
    }

    /// The public modulus n, safe to transmit in the clear.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Decrypt a ciphertext with the private exponent: c^d mod n.
    pub fn decrypt(&self, ciphertext: &BigUint) -> BigUint {
        ciphertext.modpow(&self.private_exponent, &self.modulus)
    }
}

impl std::fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("modulus_bits", &self.modulus.bits())
            .field("private_exponent", &format_args!("<redacted>"))
            .finish()
    }
}

/// Encrypt a plaintext integer under a peer's modulus: p^e mod n.
///
/// The plaintext must be strictly smaller than the modulus; there is no
/// multi-block chunking, so larger inputs are a precondition violation.
pub fn encrypt(plaintext: &BigUint, modulus: &BigUint) -> Result<BigUint> {
    if plaintext >= modulus {
        return Err(CryptoError::OversizedPlaintext {
            bits: plaintext.bits() as u64,
            modulus_bits: modulus.bits() as u64,
        });
    }
    Ok(plaintext.modpow(&BigUint::from(PUBLIC_EXPONENT), modulus))
}
