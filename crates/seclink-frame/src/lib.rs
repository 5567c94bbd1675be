//! Packet framing and stream reassembly for seclink.
//!
//! This is the core value-add layer. Every instruction body travels as:
//! - An 8-byte header: 2-byte indicator, 2-byte body size, 4-byte
//!   sequence index
//! - The body itself (plaintext or session-ciphered)
//! - An 8-byte trailer: 4-byte indicator, 4-byte checksum over the
//!   plaintext body
//!
//! The [`Framer`] turns arbitrarily chunked socket reads back into
//! validated bodies, resynchronizing on the indicator constants after
//! corruption. No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod framer;

pub use codec::{
    checksum, encode_packet, HEADER_INDICATOR, HEADER_SIZE, MAX_BODY_SIZE, TRAILER_INDICATOR,
    TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use framer::{Framer, FramerConfig, ValidatedBody};
