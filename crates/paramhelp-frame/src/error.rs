/// Errors raised while encoding, decoding or moving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header does not start with the "PH" magic.
    #[error("invalid frame magic (expected 0x5048 \"PH\")")]
    InvalidMagic,

    /// Payload is larger than the configured limit.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Underlying stream failed.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// Peer closed the stream in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

impl FrameError {
    /// True when the peer went away, cleanly or not.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::ConnectionClosed | FrameError::Truncated { .. } => true,
            FrameError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
