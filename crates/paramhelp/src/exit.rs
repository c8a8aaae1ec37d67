use std::fmt;
use std::io;

use paramhelp_core::{ErrorKind, ParamError};
use paramhelp_frame::FrameError;
use paramhelp_peer::PeerError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::Truncated { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn param_error(context: &str, err: ParamError) -> CliError {
    if let ParamError::Io(source) = err {
        return io_error(context, source);
    }
    let code = match err.kind() {
        ErrorKind::Config
        | ErrorKind::InvalidDescriptor
        | ErrorKind::DuplicateId
        | ErrorKind::DuplicateName
        | ErrorKind::Parse
        | ErrorKind::TypeViolation
        | ErrorKind::SizeViolation
        | ErrorKind::BoundsViolation => DATA_INVALID,
        ErrorKind::Usage => USAGE,
        _ => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Param(err) => param_error(context, err),
        PeerError::Bind { source, .. } | PeerError::Connect { source, .. } | PeerError::Io(source) => {
            io_error(context, source)
        }
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        PeerError::Disconnected { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        PeerError::Rejected { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn missing_socket_is_transport_error() {
        let err = PeerError::Connect {
            path: PathBuf::from("/tmp/none.sock"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        let cli = peer_error("connect failed", err);
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn timeouts_and_bad_configs() {
        let cli = peer_error("rpc failed", PeerError::Timeout(Duration::from_secs(1)));
        assert_eq!(cli.code, TIMEOUT);

        let cli = param_error("bad config", ParamError::Config("missing name".into()));
        assert_eq!(cli.code, DATA_INVALID);

        let cli = param_error(
            "read failed",
            ParamError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope")),
        );
        assert_eq!(cli.code, PERMISSION_DENIED);
    }
}
