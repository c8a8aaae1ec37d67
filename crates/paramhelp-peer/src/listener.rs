use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{PeerError, Result};
use crate::link::{Link, LinkConfig};

/// `sun_path` capacity: 108 bytes on Linux, 104 elsewhere.
#[cfg(target_os = "linux")]
pub(crate) const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
pub(crate) const MAX_PATH_LEN: usize = 104;

pub(crate) fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(PeerError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Filesystem Unix socket that hands out [`Link`]s.
///
/// The socket file is removed on drop, unless something else has replaced
/// it in the meantime.
pub struct ParamListener {
    listener: UnixListener,
    path: PathBuf,
    identity: (u64, u64),
    config: LinkConfig,
}

impl ParamListener {
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind at `path` with file mode `mode`. A stale socket at `path` is
    /// replaced; any other kind of file is an error.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;
        let bind_err = |source: io::Error| PeerError::Bind {
            path: path.clone(),
            source,
        };

        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(bind_err(err)),
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let meta = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "paramhelp listener bound");
        Ok(Self {
            listener,
            path,
            identity: (meta.dev(), meta.ino()),
            config: LinkConfig::default(),
        })
    }

    pub fn with_link_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn link_config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make [`ParamListener::poll_accept`] return immediately.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Block for the next connection and return the raw stream.
    pub fn accept_stream(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()?;
        info!(path = ?self.path, "accepted connection");
        Ok(stream)
    }

    /// On a non-blocking listener, `Ok(None)` when nobody is waiting.
    pub fn poll_accept(&self) -> Result<Option<UnixStream>> {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                // Some platforms hand out sockets that inherit O_NONBLOCK.
                stream.set_nonblocking(false)?;
                info!(path = ?self.path, "accepted connection");
                Ok(Some(stream))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Block for the next connection and wrap it in a [`Link`].
    pub fn accept(&self) -> Result<Link> {
        Link::with_config(self.accept_stream()?, self.config.clone())
    }
}

impl Drop for ParamListener {
    fn drop(&mut self) {
        let Ok(meta) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if meta.file_type().is_socket() && (meta.dev(), meta.ino()) == self.identity {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced; leaving it alone");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::thread;
    use std::time::Duration;

    use paramhelp_frame::Channel;

    use super::*;
    use crate::connector::connect;

    pub(crate) fn sock_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ph-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("params.sock")
    }

    pub(crate) fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn accept_yields_working_link() {
        let path = sock_path("accept");
        let listener = ParamListener::bind(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let server = thread::spawn(move || {
            let mut link = listener.accept().unwrap();
            let rpc = link.take_receiver(Channel::Rpc).unwrap();
            let request = rpc.recv_timeout(Duration::from_secs(2)).unwrap();
            link.send(Channel::Rpc, &request).unwrap();
        });

        let mut client = connect(&path).unwrap();
        let replies = client.take_receiver(Channel::Rpc).unwrap();
        client.send(Channel::Rpc, b"list").unwrap();
        assert_eq!(replies.recv_timeout(Duration::from_secs(2)).unwrap(), b"list");

        server.join().unwrap();
        cleanup(&path);
    }

    #[test]
    fn drop_removes_socket_file() {
        let path = sock_path("drop");
        let listener = ParamListener::bind(&path).unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
        cleanup(&path);
    }

    #[test]
    fn stale_socket_is_replaced() {
        let path = sock_path("stale");
        let first = ParamListener::bind(&path).unwrap();
        std::mem::forget(first);
        let second = ParamListener::bind(&path).unwrap();
        assert!(path.exists());
        drop(second);
        cleanup(&path);
    }

    #[test]
    fn refuses_to_replace_regular_file() {
        let path = sock_path("file");
        std::fs::write(&path, b"not a socket").unwrap();
        assert!(matches!(
            ParamListener::bind(&path),
            Err(PeerError::Bind { .. })
        ));
        assert!(path.exists());
        cleanup(&path);
    }

    #[test]
    fn drop_keeps_replaced_path() {
        let path = sock_path("replaced");
        let listener = ParamListener::bind(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, b"replacement").unwrap();
        drop(listener);
        assert!(path.exists());
        cleanup(&path);
    }

    #[test]
    fn long_path_rejected() {
        let path = format!("/tmp/{}.sock", "p".repeat(200));
        assert!(matches!(
            ParamListener::bind(path),
            Err(PeerError::PathTooLong { .. })
        ));
    }

    #[test]
    fn poll_accept_without_client() {
        let path = sock_path("poll");
        let listener = ParamListener::bind(&path).unwrap();
        listener.set_nonblocking(true).unwrap();
        assert!(listener.poll_accept().unwrap().is_none());

        let _client = UnixStream::connect(&path).unwrap();
        let mut accepted = None;
        for _ in 0..100 {
            if let Some(stream) = listener.poll_accept().unwrap() {
                accepted = Some(stream);
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(accepted.is_some());
        drop(listener);
        cleanup(&path);
    }
}
