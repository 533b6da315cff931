/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The message header contains an invalid magic number.
    #[error("invalid message magic (expected 0x4950 \"IP\")")]
    InvalidMagic,

    /// The message body exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// More frames than the header can describe.
    #[error("too many frames ({count}, max {max})")]
    TooManyFrames { count: usize, max: usize },

    /// Frame lengths disagree with the body length in the header.
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
