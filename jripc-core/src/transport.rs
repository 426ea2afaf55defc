//! Local IPC transport: Unix domain sockets and Windows named pipes
//!
//! The protocol engine only needs an ordered, reliable byte stream. This
//! module hands it one on each platform:
//!
//! - **Unix**: a `tokio::net::UnixListener` bound to a socket file
//! - **Windows**: a chain of `tokio::net::windows::named_pipe` server
//!   instances, one per accepted client
//!
//! # Addresses
//!
//! Callers may pass a bare name instead of a full path; [`socket_path`]
//! shows the address that will actually be used:
//!
//! | input | Unix | Windows |
//! |---|---|---|
//! | `myapp` | `/tmp/myapp.sock` | `\\.\pipe\myapp` |
//! | `myapp.sock` | `/tmp/myapp.sock` | `\\.\pipe\myapp.sock` |
//! | `\\.\pipe\myapp` | `\\.\pipe\myapp` | unchanged |
//!
//! # Stale Sockets
//!
//! A server that exits without cleaning up leaves its socket file behind,
//! and binding to it again fails with `AddrInUse`. [`listen`] removes a
//! leftover socket file before binding. It refuses to delete a path that
//! exists but is not a socket.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jripc_core::transport;
//!
//! # async fn example() -> jripc_core::Result<()> {
//! let listener = transport::listen("myapp").await?;
//! let client = transport::dial("myapp").await?;
//! let (server_side, peer) = listener.accept().await?;
//! # drop((client, server_side, peer));
//! listener.close()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};

#[cfg(unix)]
pub use unix::{ClientStream, ServerStream};
#[cfg(windows)]
pub use windows::{ClientStream, ServerStream};

#[cfg(unix)]
use unix as platform;
#[cfg(windows)]
use windows as platform;

/// Normalize a socket name to the address `listen` and `dial` will use.
pub fn socket_path(name: &str) -> String {
    platform::normalize(name)
}

/// Bind a listener at `path`, removing a stale socket file first.
pub async fn listen(path: &str) -> Result<IpcListener> {
    let path = socket_path(path);
    let inner = platform::Listener::bind(&path)?;
    tracing::debug!(path = %path, "IPC listener bound");
    Ok(IpcListener { path, inner })
}

/// Connect to a listener at `path`.
pub async fn dial(path: &str) -> Result<ClientStream> {
    let path = socket_path(path);
    platform::dial(&path)
        .await
        .map_err(|e| Error::Io(format!("failed to connect to {}: {}", path, e)))
}

/// Remove the socket file for `path`. A missing file is not an error.
///
/// Named pipes vanish with their last handle, so this is a no-op on Windows.
pub fn cleanup_socket(path: &str) -> Result<()> {
    platform::cleanup(&socket_path(path))
}

/// A bound IPC listener
pub struct IpcListener {
    path: String,
    inner: platform::Listener,
}

impl IpcListener {
    /// Wait for the next client.
    ///
    /// Returns the server side of the stream and a description of the peer
    /// suitable for logs.
    pub async fn accept(&self) -> Result<(ServerStream, String)> {
        self.inner.accept(&self.path).await.map_err(|e| Error::Io(e.to_string()))
    }

    /// The normalized address this listener is bound to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop listening and remove the socket file.
    pub fn close(self) -> Result<()> {
        drop(self.inner);
        platform::cleanup(&self.path)
    }
}

#[cfg(unix)]
mod unix {
    use crate::error::{Error, Result};
    use std::os::unix::fs::FileTypeExt;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    pub type ServerStream = UnixStream;
    pub type ClientStream = UnixStream;

    pub fn normalize(name: &str) -> String {
        if name.contains('/') || name.contains('\\') {
            name.to_string()
        } else if name.ends_with(".sock") {
            format!("/tmp/{}", name)
        } else {
            format!("/tmp/{}.sock", name)
        }
    }

    pub struct Listener(UnixListener);

    impl Listener {
        pub fn bind(path: &str) -> Result<Self> {
            cleanup(path)?;
            UnixListener::bind(path)
                .map(Listener)
                .map_err(|e| Error::Io(format!("failed to create listener on {}: {}", path, e)))
        }

        pub async fn accept(&self, path: &str) -> std::io::Result<(UnixStream, String)> {
            let (stream, addr) = self.0.accept().await?;
            let peer = addr
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("unix:{}", path));
            Ok((stream, peer))
        }
    }

    pub async fn dial(path: &str) -> std::io::Result<UnixStream> {
        UnixStream::connect(path).await
    }

    pub fn cleanup(path: &str) -> Result<()> {
        let path = Path::new(path);
        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(Error::Io(format!(
                    "failed to stat socket file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if !metadata.file_type().is_socket() {
            return Err(Error::Io(format!(
                "path {} exists but is not a socket",
                path.display()
            )));
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed socket file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!(
                "failed to remove socket file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(windows)]
mod windows {
    use crate::error::{Error, Result};
    use std::time::Duration;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };
    use tokio::sync::Mutex;

    pub type ServerStream = NamedPipeServer;
    pub type ClientStream = NamedPipeClient;

    const PIPE_PREFIX: &str = r"\\.\pipe\";
    const PIPE_PREFIX_RAW: &str = r"\\?\pipe\";
    const ERROR_PIPE_BUSY: i32 = 231;

    pub fn normalize(name: &str) -> String {
        if name.starts_with(PIPE_PREFIX) || name.starts_with(PIPE_PREFIX_RAW) {
            name.to_string()
        } else {
            format!("{}{}", PIPE_PREFIX, name)
        }
    }

    // Holds the instance that the next client will connect to.
    pub struct Listener(Mutex<NamedPipeServer>);

    impl Listener {
        pub fn bind(path: &str) -> Result<Self> {
            ServerOptions::new()
                .first_pipe_instance(true)
                .create(path)
                .map(|server| Listener(Mutex::new(server)))
                .map_err(|e| {
                    Error::Io(format!(
                        "failed to create named pipe listener on {}: {}",
                        path, e
                    ))
                })
        }

        pub async fn accept(&self, path: &str) -> std::io::Result<(NamedPipeServer, String)> {
            let mut pending = self.0.lock().await;
            pending.connect().await?;
            let next = ServerOptions::new().create(path)?;
            let connected = std::mem::replace(&mut *pending, next);
            Ok((connected, path.to_string()))
        }
    }

    pub async fn dial(path: &str) -> std::io::Result<NamedPipeClient> {
        loop {
            match ClientOptions::new().open(path) {
                Ok(client) => return Ok(client),
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn cleanup(_path: &str) -> Result<()> {
        Ok(())
    }
}
