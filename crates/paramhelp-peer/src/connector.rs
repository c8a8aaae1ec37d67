use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::error::{PeerError, Result};
use crate::link::{Link, LinkConfig};
use crate::listener::check_path_len;

/// Connect to a listening paramhelp socket.
pub fn connect(path: impl AsRef<Path>) -> Result<Link> {
    connect_with_config(path, LinkConfig::default())
}

pub fn connect_with_config(path: impl AsRef<Path>, config: LinkConfig) -> Result<Link> {
    let path = path.as_ref();
    check_path_len(path)?;
    let stream = UnixStream::connect(path).map_err(|source| PeerError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(?path, "connected to paramhelp socket");
    Link::with_config(stream, config)
}
