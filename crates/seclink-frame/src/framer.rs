use bytes::{Buf, Bytes, BytesMut};
use seclink_crypto::{cipher, SessionKey};
use tracing::{debug, warn};

use crate::codec::{
    checksum, HEADER_INDICATOR, HEADER_SIZE, MAX_BODY_SIZE, TRAILER_INDICATOR, TRAILER_SIZE,
};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

const INDICATOR_BYTES: [u8; 2] = HEADER_INDICATOR.to_be_bytes();

/// Configuration for the stream framer.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Bodies whose size field exceeds this are treated as corrupt.
    /// Defaults to the full 16-bit range.
    pub max_body_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

/// One validated instruction body, decrypted if a key was in force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBody {
    /// Sender-assigned sequence index. Informational only; nothing
    /// consumes it for gap filling or retransmission.
    pub sequence: u32,
    /// The plaintext body bytes.
    pub body: Bytes,
}

/// Reassembles validated instruction bodies from arbitrarily chunked
/// stream reads.
///
/// Feed raw bytes with [`Framer::extend`], then drain validated bodies
/// with [`Framer::next_body`]. Partial headers, bodies and trailers are
/// retained across calls; corrupt packets are dropped and the framer
/// resynchronizes on the next header indicator. Each link owns exactly
/// one framer for its lifetime.
///
/// Logical progression per packet: seek header, read size, read
/// sequence, read body, read trailer, validate. Position in the buffer
/// is the authority for where the body ends — trailer-indicator bytes
/// appearing inside the body are data, not a premature trailer.
pub struct Framer {
    buf: BytesMut,
    config: FramerConfig,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Append newly read stream bytes to the accumulation buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next validated body, if a complete packet is
    /// buffered.
    ///
    /// `key` is the session key currently in force on the link: when
    /// present, bodies are decrypted before checksum validation.
    /// Returns `None` once the buffer holds no complete packet; callers
    /// then read more bytes and try again.
    pub fn next_body(&mut self, key: Option<&SessionKey>) -> Option<ValidatedBody> {
        loop {
            self.seek_header();
            if self.buf.len() < HEADER_SIZE {
                // Partial header: retain it and wait for more bytes.
                return None;
            }

            let size = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
            let sequence = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
            if size > self.config.max_body_size {
                warn!(size, sequence, "size field exceeds limit; resynchronizing");
                self.resync_after_indicator();
                continue;
            }

            let trailer_at = HEADER_SIZE + size;
            if self.buf.len() < trailer_at + TRAILER_SIZE {
                // Partial body or trailer: wait for more bytes.
                return None;
            }

            let trailer = u32::from_be_bytes([
                self.buf[trailer_at],
                self.buf[trailer_at + 1],
                self.buf[trailer_at + 2],
                self.buf[trailer_at + 3],
            ]);
            if trailer != TRAILER_INDICATOR {
                warn!(
                    sequence,
                    size, "no trailer indicator at expected position; packet deemed corrupt"
                );
                self.resync_after_indicator();
                continue;
            }

            let carried = u32::from_be_bytes([
                self.buf[trailer_at + 4],
                self.buf[trailer_at + 5],
                self.buf[trailer_at + 6],
                self.buf[trailer_at + 7],
            ]);
            let wire_body = &self.buf[HEADER_SIZE..trailer_at];
            let body: Vec<u8> = match key {
                Some(key) => cipher::decrypt(wire_body, key),
                None => wire_body.to_vec(),
            };
            let computed = checksum(&body);
            self.buf.advance(trailer_at + TRAILER_SIZE);

            if computed != carried {
                // Structure was sound, so the whole packet is consumed;
                // the instruction itself is silently dropped.
                warn!(sequence, carried, computed, "checksum mismatch; dropping instruction");
                continue;
            }

            return Some(ValidatedBody {
                sequence,
                body: Bytes::from(body),
            });
        }
    }

    /// Discard noise ahead of the next header indicator candidate.
    ///
    /// After this the buffer either starts with the indicator, or holds
    /// fewer than two bytes of a possible indicator prefix.
    fn seek_header(&mut self) {
        if let Some(pos) = self
            .buf
            .windows(2)
            .position(|w| w == INDICATOR_BYTES)
        {
            if pos > 0 {
                debug!(skipped = pos, "discarded bytes while seeking header");
                self.buf.advance(pos);
            }
        } else {
            // No match: everything is noise except a possible first
            // indicator byte at the very end.
            let keep = usize::from(self.buf.last() == Some(&INDICATOR_BYTES[0]));
            let drop = self.buf.len() - keep;
            if drop > 0 {
                debug!(skipped = drop, "discarded bytes while seeking header");
                self.buf.advance(drop);
            }
        }
    }

    /// Resume scanning at the byte immediately after the failed header
    /// indicator, so a genuine packet starting inside the bogus body is
    /// still found.
    fn resync_after_indicator(&mut self) {
        self.buf.advance(INDICATOR_BYTES.len());
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_packet;

    fn packet(body: &[u8], sequence: u32, key: Option<&SessionKey>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_packet(body, sequence, key, &mut buf).unwrap();
        buf.to_vec()
    }

    fn feed_in_chunks(framer: &mut Framer, wire: &[u8], chunk_size: usize) -> Vec<ValidatedBody> {
        let mut out = Vec::new();
        for chunk in wire.chunks(chunk_size) {
            framer.extend(chunk);
            while let Some(body) = framer.next_body(None) {
                out.push(body);
            }
        }
        out
    }

    #[test]
    fn roundtrip_all_at_once() {
        let wire = packet(b"hello, framer", 42, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].sequence, 42);
        assert_eq!(got[0].body.as_ref(), b"hello, framer");
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn roundtrip_one_byte_chunks() {
        let wire = packet(b"byte by byte", 7, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, 1);

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"byte by byte");
    }

    #[test]
    fn roundtrip_seven_byte_chunks() {
        let wire = packet(b"seven at a time crosses every boundary", 9, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, 7);

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"seven at a time crosses every boundary");
    }

    #[test]
    fn multiple_packets_in_one_chunk() {
        let mut wire = packet(b"first", 1, None);
        wire.extend(packet(b"second", 2, None));
        wire.extend(packet(b"third", 3, None));

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(
            got.iter().map(|v| v.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(got[2].body.as_ref(), b"third");
    }

    #[test]
    fn empty_body_packet() {
        let wire = packet(b"", 0, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 1);
        assert!(got[0].body.is_empty());
    }

    #[test]
    fn leading_noise_is_discarded() {
        let mut wire = vec![0x00, 0x13, 0x37, 0x7F, 0x00, 0xAB];
        wire.extend(packet(b"after noise", 5, None));

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, 3);

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"after noise");
    }

    #[test]
    fn interior_noise_recovers_next_packet() {
        let mut wire = packet(b"good one", 1, None);
        // Noise avoiding the indicator byte values so it cannot form a
        // fake header on its own.
        wire.extend([0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA]);
        wire.extend(packet(b"good two", 2, None));

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].body.as_ref(), b"good one");
        assert_eq!(got[1].body.as_ref(), b"good two");
    }

    #[test]
    fn truncated_packet_then_full_packets() {
        // A header that promises more body than its packet delivers.
        // Once enough later traffic arrives to reach the promised
        // trailer position, the check fails there and resynchronization
        // recovers the genuine packets that followed.
        let mut wire = packet(b"this body gets cut off", 1, None);
        wire.truncate(HEADER_SIZE + 4);
        wire.extend(packet(b"intact", 2, None));
        wire.extend(packet(b"tail", 3, None));

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].body.as_ref(), b"intact");
        assert_eq!(got[1].body.as_ref(), b"tail");
    }

    #[test]
    fn trailer_pattern_inside_body_is_data() {
        // Body contains the exact trailer indicator bytes mid-stream;
        // position, not pattern, decides where the body ends.
        let mut body = b"prefix".to_vec();
        body.extend(TRAILER_INDICATOR.to_be_bytes());
        body.extend(b"suffix");

        let wire = packet(&body, 11, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), body.as_slice());
    }

    #[test]
    fn header_pattern_inside_body_is_data() {
        let mut body = vec![0x00];
        body.extend(INDICATOR_BYTES);
        body.extend(INDICATOR_BYTES);
        body.push(0xFF);

        let wire = packet(&body, 12, None);
        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, 1);

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), body.as_slice());
    }

    #[test]
    fn corrupt_size_field_recovers_following_packet() {
        let mut wire = packet(b"victim", 1, None);
        // Flip a size byte so the trailer is no longer where the header
        // claims; the packet is deemed corrupt.
        wire[3] ^= 0x04;
        wire.extend(packet(b"survivor", 2, None));

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"survivor");
    }

    #[test]
    fn single_bit_flip_in_body_drops_packet() {
        let wire_clean = packet(b"checksummed body", 1, None);
        for bit in 0..8 {
            let mut wire = wire_clean.clone();
            wire[HEADER_SIZE + 3] ^= 1 << bit;
            wire.extend(packet(b"next", 2, None));

            let mut framer = Framer::new();
            let got = feed_in_chunks(&mut framer, &wire, wire.len());

            // The tampered packet is dropped; the follower survives.
            assert_eq!(got.len(), 1, "bit {bit}");
            assert_eq!(got[0].body.as_ref(), b"next");
        }
    }

    #[test]
    fn decrypts_body_before_checksum_when_key_in_force() {
        let key = SessionKey::generate();
        let wire = packet(b"ciphered contents", 21, Some(&key));

        let mut framer = Framer::new();
        framer.extend(&wire);

        let got = framer.next_body(Some(&key)).unwrap();
        assert_eq!(got.sequence, 21);
        assert_eq!(got.body.as_ref(), b"ciphered contents");
    }

    #[test]
    fn ciphered_packet_without_key_is_dropped() {
        let key = SessionKey::generate();
        let mut wire = packet(b"ciphered contents!", 1, Some(&key));
        wire.extend(packet(b"plain follower", 2, None));

        let mut framer = Framer::new();
        framer.extend(&wire);

        // Without the key the checksum cannot validate, so the ciphered
        // packet is dropped and the plaintext follower comes through.
        let got = framer.next_body(None).unwrap();
        assert_eq!(got.body.as_ref(), b"plain follower");
    }

    #[test]
    fn partial_header_is_retained_across_calls() {
        let wire = packet(b"patience", 3, None);
        let mut framer = Framer::new();

        framer.extend(&wire[..5]); // indicator + size + 1 sequence byte
        assert!(framer.next_body(None).is_none());
        assert_eq!(framer.buffered(), 5);

        framer.extend(&wire[5..]);
        let got = framer.next_body(None).unwrap();
        assert_eq!(got.body.as_ref(), b"patience");
    }

    #[test]
    fn lone_indicator_first_byte_is_kept_while_seeking() {
        let mut framer = Framer::new();
        framer.extend(&[0xAB, 0xCD, INDICATOR_BYTES[0]]);
        assert!(framer.next_body(None).is_none());
        // Noise dropped, candidate byte kept.
        assert_eq!(framer.buffered(), 1);

        let wire = packet(b"late join", 4, None);
        framer.extend(&wire[1..]); // second indicator byte onward
        let got = framer.next_body(None).unwrap();
        assert_eq!(got.body.as_ref(), b"late join");
    }

    #[test]
    fn pure_noise_is_fully_discarded() {
        let mut framer = Framer::new();
        framer.extend(&[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(framer.next_body(None).is_none());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn resync_finds_packet_starting_inside_bogus_body() {
        // A stray header indicator followed by a size field that claims
        // a real packet's bytes as its body. When the trailer check
        // fails, scanning resumes right after the stray indicator and
        // must still find the genuine packet.
        let genuine = packet(b"the real thing", 8, None);
        let mut wire = Vec::new();
        wire.extend(INDICATOR_BYTES);
        wire.extend((genuine.len() as u16).to_be_bytes()); // bogus size
        wire.extend(0u32.to_be_bytes()); // bogus sequence
        wire.extend(&genuine);
        wire.extend([0u8; TRAILER_SIZE]); // feeds the bogus packet's trailer check

        let mut framer = Framer::new();
        let got = feed_in_chunks(&mut framer, &wire, wire.len());

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"the real thing");
    }

    #[test]
    fn oversized_size_field_config_triggers_resync() {
        let config = FramerConfig { max_body_size: 16 };
        let mut framer = Framer::with_config(config);

        let mut wire = packet(&[0xEE; 32], 1, None);
        wire.extend(packet(b"small enough", 2, None));
        let got: Vec<_> = {
            framer.extend(&wire);
            let mut out = Vec::new();
            while let Some(v) = framer.next_body(None) {
                out.push(v);
            }
            out
        };

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].body.as_ref(), b"small enough");
    }
}
