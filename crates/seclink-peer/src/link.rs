use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use seclink_crypto::SessionKey;
use seclink_frame::codec;
use seclink_frame::Framer;
use seclink_transport::NetStream;
use tracing::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::handshake::Handshake;
use crate::instruction::Instruction;

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Recover the guard from a poisoned mutex. Link state stays coherent
/// under panics in peer threads; a torn write already shows up as a
/// corrupt packet on the far end.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One end of an instruction link.
///
/// Owns the write half of the channel plus the per-link security
/// state: the symmetric session key and the encrypted flag. Every link
/// negotiates its own key; two links never share one.
///
/// Transmission policy: handshake instructions always go out in
/// plaintext; anything else requires the link to be encrypted and is
/// refused with [`LinkError::EncryptionRequired`] before a single byte
/// reaches the transport.
///
/// Shared across threads behind an [`Arc`]; all methods take `&self`.
pub struct Link<W> {
    writer: Mutex<W>,
    session: Mutex<Option<SessionKey>>,
    encrypted: Mutex<bool>,
    encrypted_signal: Condvar,
    sequence: AtomicU64,
}

impl<W: Write> Link<W> {
    /// Wrap a writer into an unencrypted link.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            session: Mutex::new(None),
            encrypted: Mutex::new(false),
            encrypted_signal: Condvar::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Serialize, frame and write one instruction.
    ///
    /// Assigns the next sequence index and flushes the writer so small
    /// instructions are not held back by stream buffering.
    pub fn transmit(&self, instruction: &Instruction) -> Result<()> {
        let key = if instruction.is_handshake() {
            None
        } else {
            if !self.is_encrypted() {
                return Err(LinkError::EncryptionRequired);
            }
            match lock(&self.session).clone() {
                Some(key) => Some(key),
                None => return Err(LinkError::EncryptionRequired),
            }
        };

        let body = instruction.to_bytes()?;
        let sequence = self.next_sequence()?;
        let mut packet = BytesMut::new();
        codec::encode_packet(&body, sequence, key.as_ref(), &mut packet)?;
        debug!(sequence, bytes = packet.len(), "transmitting packet");

        let mut writer = lock(&self.writer);
        write_all(&mut *writer, &packet)?;
        writer.flush()?;
        Ok(())
    }

    /// Whether the encrypted-only transmission policy is satisfied.
    pub fn is_encrypted(&self) -> bool {
        *lock(&self.encrypted)
    }

    /// Mark the link encrypted and wake any waiters.
    pub(crate) fn set_encrypted(&self) {
        *lock(&self.encrypted) = true;
        self.encrypted_signal.notify_all();
        info!("link encrypted");
    }

    /// Block until the handshake flips the link to encrypted.
    ///
    /// Returns `false` if the timeout elapses first.
    pub fn wait_until_encrypted(&self, timeout: Duration) -> bool {
        let guard = lock(&self.encrypted);
        let (guard, result) = self
            .encrypted_signal
            .wait_timeout_while(guard, timeout, |encrypted| !*encrypted)
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        !result.timed_out()
    }

    /// Install the session key recovered by the handshake.
    pub(crate) fn install_session_key(&self, key: SessionKey) {
        *lock(&self.session) = Some(key);
    }

    /// The session key in force, if any.
    pub(crate) fn session_key(&self) -> Option<SessionKey> {
        lock(&self.session).clone()
    }

    /// The link's own session key, generated on first use.
    ///
    /// The accepting side has no key until the first offer arrives;
    /// generating lazily keeps unencrypted links free of key material.
    pub(crate) fn session_key_or_generate(&self) -> SessionKey {
        let mut session = lock(&self.session);
        session.get_or_insert_with(SessionKey::generate).clone()
    }

    fn next_sequence(&self) -> Result<u32> {
        let next = self.sequence.fetch_add(1, Ordering::Relaxed);
        u32::try_from(next).map_err(|_| LinkError::SequenceOverflow)
    }

    #[cfg(test)]
    fn force_sequence(&self, value: u64) {
        self.sequence.store(value, Ordering::Relaxed);
    }
}

impl Link<NetStream> {
    /// Split a connected stream into a shareable link and its read
    /// half.
    ///
    /// The returned stream feeds a [`Receiver`]; the link clones the
    /// socket for writes so both directions run concurrently.
    pub fn over(stream: NetStream) -> Result<(Arc<Self>, NetStream)> {
        let writer = stream.try_clone()?;
        Ok((Arc::new(Self::new(writer)), stream))
    }
}

/// Write the whole packet, riding out short writes and interruptions.
fn write_all<W: Write>(writer: &mut W, mut packet: &[u8]) -> Result<()> {
    while !packet.is_empty() {
        match writer.write(packet) {
            Ok(0) => return Err(LinkError::ConnectionLost),
            Ok(n) => packet = &packet[n..],
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Application-side reaction to received instructions.
///
/// Handlers only ever see application instructions; the handshake
/// variants are consumed before dispatch. The link is provided for
/// replies.
pub trait LinkHandler<W: Write> {
    /// React to one received application instruction.
    fn handle(&mut self, instruction: Instruction, link: &Arc<Link<W>>);

    /// The peer closed the connection or the stream failed.
    fn connection_lost(&mut self, _link: &Arc<Link<W>>) {}
}

/// The receive loop for one link.
///
/// Reads raw bytes, reassembles packets through the framer, routes
/// handshake instructions into the [`Handshake`] interceptor and
/// everything else into the handler. Runs on its own thread, one per
/// link.
pub struct Receiver<R, W: Write, H> {
    reader: R,
    link: Arc<Link<W>>,
    handshake: Handshake,
    handler: H,
    framer: Framer,
}

impl<R: Read, W: Write, H: LinkHandler<W>> Receiver<R, W, H> {
    pub fn new(reader: R, link: Arc<Link<W>>, handshake: Handshake, handler: H) -> Self {
        Self {
            reader,
            link,
            handshake,
            handler,
            framer: Framer::new(),
        }
    }

    /// The link this receiver feeds.
    pub fn link(&self) -> &Arc<Link<W>> {
        &self.link
    }

    /// Read until the peer disconnects.
    ///
    /// Returns `Ok(())` on orderly shutdown (EOF). Handshake violations
    /// and stream errors abort the loop; corrupt or malformed packets
    /// do not.
    pub fn run(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    debug!("peer closed the connection");
                    self.handler.connection_lost(&self.link);
                    return Ok(());
                }
                Ok(n) => {
                    self.framer.extend(&chunk[..n]);
                    self.drain()?;
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "read failed; dropping link");
                    self.handler.connection_lost(&self.link);
                    return Err(err.into());
                }
            }
        }
    }

    /// Dispatch every complete packet currently buffered.
    fn drain(&mut self) -> Result<()> {
        loop {
            // Decryption is gated on the link state, not on key
            // presence: the accepting side holds its key before the
            // exchange completes, while the wire is still plaintext.
            let key = if self.link.is_encrypted() {
                self.link.session_key()
            } else {
                None
            };
            let Some(validated) = self.framer.next_body(key.as_ref()) else {
                return Ok(());
            };
            match Instruction::from_bytes(&validated.body) {
                Ok(instruction) => {
                    if !self.handshake.intercept(&instruction, &self.link)? {
                        self.handler.handle(instruction, &self.link);
                    }
                }
                Err(err) => {
                    // Body passed framing validation but is not an
                    // instruction; drop it and keep the link alive.
                    warn!(sequence = validated.sequence, %err, "undecodable body dropped");
                }
            }
        }
    }
}
