use std::io::Write;

use num_bigint_dig::BigUint;
use seclink_crypto::{rsa, CryptoError, RsaKeyPair, SessionKey, KEY_SIZE};
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::instruction::Instruction;
use crate::link::Link;

/// Configuration for the key-exchange handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Bit length of each generated RSA prime.
    pub prime_bits: usize,
    /// Minimum bit length of the difference between the two primes.
    pub separation_bits: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            prime_bits: rsa::PRIME_BITS,
            separation_bits: rsa::MIN_PRIME_SEPARATION_BITS,
        }
    }
}

enum Phase {
    /// No exchange in flight. Server links stay here until an offer
    /// arrives.
    Idle,
    /// Client: offer sent, waiting for the encrypted session key.
    AwaitingSecretKey(RsaKeyPair),
    /// Server: key delivered, waiting for the client's confirmation.
    AwaitingConfirmation,
    /// Both ends hold the session key; the link is encrypted.
    Established,
}

/// Drives the three-message key exchange on one link.
///
/// Sits in front of the application handler and consumes the reserved
/// handshake instructions; everything else passes through untouched.
///
/// Exchange sequence, all three messages in plaintext:
/// 1. client sends `OfferPublicKey` with a freshly generated modulus;
/// 2. server RSA-encrypts its link session key under the modulus and
///    replies `DeliverSecretKey`;
/// 3. client decrypts, installs the key, flips its link to encrypted
///    and replies `ConfirmEncryption`; the server flips on receipt.
pub struct Handshake {
    phase: Phase,
    config: HandshakeConfig,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    /// Create a handshake interceptor with production key parameters.
    pub fn new() -> Self {
        Self::with_config(HandshakeConfig::default())
    }

    /// Create a handshake interceptor with explicit key parameters.
    pub fn with_config(config: HandshakeConfig) -> Self {
        Self {
            phase: Phase::Idle,
            config,
        }
    }

    /// Client side: generate a keypair and offer the public modulus.
    pub fn initiate<W: Write>(&mut self, link: &Link<W>) -> Result<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(LinkError::UnexpectedHandshake(
                "exchange already in flight",
            ));
        }
        let keys = RsaKeyPair::generate_with(self.config.prime_bits, self.config.separation_bits)?;
        info!(modulus_bits = keys.modulus().bits(), "offering public key");
        link.transmit(&Instruction::OfferPublicKey {
            modulus: keys.modulus().to_bytes_be(),
        })?;
        self.phase = Phase::AwaitingSecretKey(keys);
        Ok(())
    }

    /// Inspect one received instruction.
    ///
    /// Returns `Ok(true)` when the instruction belonged to the
    /// handshake and was fully consumed here; `Ok(false)` passes it on
    /// to the application handler.
    pub fn intercept<W: Write>(&mut self, instruction: &Instruction, link: &Link<W>) -> Result<bool> {
        match instruction {
            Instruction::OfferPublicKey { modulus } => {
                // Server side: encrypt our session key under the
                // offered modulus and send it back.
                if !matches!(self.phase, Phase::Idle) {
                    return Err(LinkError::UnexpectedHandshake(
                        "offer received mid-exchange",
                    ));
                }
                let peer_modulus = BigUint::from_bytes_be(modulus);
                let key = link.session_key_or_generate();
                let secret = BigUint::from_bytes_be(key.as_bytes());
                let ciphertext = rsa::encrypt(&secret, &peer_modulus)?;
                debug!("delivering encrypted session key");
                link.transmit(&Instruction::DeliverSecretKey {
                    ciphertext: ciphertext.to_bytes_be(),
                })?;
                self.phase = Phase::AwaitingConfirmation;
                Ok(true)
            }
            Instruction::DeliverSecretKey { ciphertext } => {
                // Client side: recover the key with our private
                // exponent, install it, and confirm.
                let keys = match std::mem::replace(&mut self.phase, Phase::Idle) {
                    Phase::AwaitingSecretKey(keys) => keys,
                    other => {
                        self.phase = other;
                        return Err(LinkError::UnexpectedHandshake(
                            "secret key delivered without a pending offer",
                        ));
                    }
                };
                let secret = keys.decrypt(&BigUint::from_bytes_be(ciphertext));
                let key = SessionKey::from_bytes(&key_bytes(&secret)?)?;
                link.install_session_key(key);
                // Confirm before flipping the flag: the flag wakes
                // blocked senders, and their traffic must not overtake
                // the confirmation on the wire.
                link.transmit(&Instruction::ConfirmEncryption)?;
                link.set_encrypted();
                self.phase = Phase::Established;
                Ok(true)
            }
            Instruction::ConfirmEncryption => {
                // Server side: the client holds our key; go encrypted.
                if !matches!(self.phase, Phase::AwaitingConfirmation) {
                    return Err(LinkError::UnexpectedHandshake(
                        "confirmation without a delivered key",
                    ));
                }
                link.set_encrypted();
                self.phase = Phase::Established;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether the exchange has completed on this end.
    pub fn is_established(&self) -> bool {
        matches!(self.phase, Phase::Established)
    }
}

/// Left-pad the big-integer view of the session key back to the fixed
/// key length. `to_bytes_be` strips leading zero bytes, which real keys
/// carry about one time in 256.
fn key_bytes(secret: &BigUint) -> Result<Vec<u8>> {
    let bytes = secret.to_bytes_be();
    if bytes.len() > KEY_SIZE {
        return Err(LinkError::Crypto(CryptoError::WrongKeyLength {
            len: bytes.len(),
            expected: KEY_SIZE,
        }));
    }
    let mut padded = vec![0u8; KEY_SIZE];
    padded[KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
    Ok(padded)
}
