/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] seclink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] seclink_frame::FrameError),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(#[from] seclink_crypto::CryptoError),

    /// An I/O error occurred on the link's stream.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection lost")]
    ConnectionLost,

    /// A non-handshake instruction was transmitted before end-to-end
    /// encryption was established. Nothing is written to the transport.
    #[error("end-to-end encryption not established; only handshake instructions may be sent")]
    EncryptionRequired,

    /// The per-link sequence counter passed the 32-bit wire field.
    #[error("sequence index exhausted (exceeds 32-bit range)")]
    SequenceOverflow,

    /// A received body did not decode to an instruction.
    #[error("malformed instruction payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// Instruction serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A handshake instruction arrived that the current exchange state
    /// cannot accept.
    #[error("unexpected handshake instruction: {0}")]
    UnexpectedHandshake(&'static str),
}

pub type Result<T> = std::result::Result<T, LinkError>;
