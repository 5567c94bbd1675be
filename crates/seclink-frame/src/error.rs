/// Errors that can occur during packet encoding.
///
/// Decoding has no error surface: the framer treats every malformed
/// byte as stream noise and resynchronizes instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The body exceeds the 16-bit size field.
    #[error("instruction body too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
