use bytes::{BufMut, BytesMut};
use seclink_crypto::{cipher, SessionKey};

use crate::error::{FrameError, Result};

/// Header indicator: fixed 16-bit constant marking a packet start.
pub const HEADER_INDICATOR: u16 = 0x7FFF;

/// Trailer indicator: fixed 32-bit constant marking the body end.
/// Chosen so its byte sequence never contains the header indicator
/// pair, which would confuse resynchronization scans.
pub const TRAILER_INDICATOR: u32 = 0xF7FF_FF7F;

/// Header size: indicator (2) + body size (2) + sequence index (4).
pub const HEADER_SIZE: usize = 8;

/// Trailer size: indicator (4) + checksum (4).
pub const TRAILER_SIZE: usize = 8;

/// Maximum body size representable by the 16-bit size field.
pub const MAX_BODY_SIZE: usize = u16::MAX as usize;

/// Wraparound byte sum over the plaintext body.
///
/// Deliberately not a CRC: the original wire format uses a plain sum
/// and strengthening it would break compatibility. It detects random
/// corruption, not tampering.
pub fn checksum(body: &[u8]) -> u32 {
    body.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Encode one instruction body into a complete packet.
///
/// Wire format (all fields big-endian):
/// ```text
/// ┌────────────┬──────────┬──────────────┬──────────────┬────────────┬──────────────┐
/// │ Indicator  │ Size     │ Sequence     │ Body         │ Indicator  │ Checksum     │
/// │ (2B)       │ (2B)     │ (4B)         │ (Size bytes) │ (4B)       │ (4B)         │
/// └────────────┴──────────┴──────────────┴──────────────┴────────────┴──────────────┘
/// ```
///
/// The checksum always covers the plaintext body; when a key is given
/// the body itself is ciphered before framing. The cipher preserves
/// length, so `size` describes the wire body either way.
pub fn encode_packet(
    body: &[u8],
    sequence: u32,
    key: Option<&SessionKey>,
    dst: &mut BytesMut,
) -> Result<()> {
    if body.len() > MAX_BODY_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        });
    }
    let sum = checksum(body);

    dst.reserve(HEADER_SIZE + body.len() + TRAILER_SIZE);
    dst.put_u16(HEADER_INDICATOR);
    dst.put_u16(body.len() as u16);
    dst.put_u32(sequence);
    match key {
        Some(key) => dst.put_slice(&cipher::encrypt(body, key)),
        None => dst.put_slice(body),
    }
    dst.put_u32(TRAILER_INDICATOR);
    dst.put_u32(sum);
    Ok(())
}
