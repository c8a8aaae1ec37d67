use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by links, listeners and clients.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] paramhelp_frame::FrameError),

    /// Registry or server error.
    #[error(transparent)]
    Param(#[from] paramhelp_core::ParamError),

    #[error("failed to bind {path:?}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `sockaddr_un.sun_path` cannot hold the path.
    #[error("socket path too long ({len} bytes, max {max}): {path:?}")]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link's reader stopped, so nothing more will arrive on `channel`.
    #[error("peer disconnected ({channel} channel)")]
    Disconnected { channel: &'static str },

    /// The channel's receiving end was handed out already.
    #[error("{channel} channel is already taken")]
    ChannelTaken { channel: &'static str },

    /// No reply within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered, but not with the outcome the request needed.
    #[error("request {request:?} rejected: {reply}")]
    Rejected { request: String, reply: String },
}

impl PeerError {
    /// True when the other side went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            PeerError::Disconnected { .. } => true,
            PeerError::Frame(err) => err.is_disconnect(),
            PeerError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
