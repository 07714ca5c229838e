//! Control socket for the daemon
//!
//! Length-prefixed JSON over a Unix domain socket. The CLI connects as a
//! [`ControlClient`]; the daemon accepts on a [`ControlServer`].

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use crate::constants::paths;

mod messages;
pub mod server;
pub use messages::{ControlRequest, ControlResponse};

/// Frames above 10 MB are refused before allocating; an adapter dump is the
/// largest thing ever sent
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// `$XDG_RUNTIME_DIR/overlay-displays/control.sock`, or under the cache dir
/// when no runtime dir is set
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(paths::APP_DIR).join(paths::SOCKET_FILENAME));
    }

    let cache = dirs::cache_dir().context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(paths::APP_DIR).join(paths::SOCKET_FILENAME))
}

/// CLI side of one control connection
pub struct ControlClient {
    stream: UnixStream,
}

impl ControlClient {
    pub fn connect() -> Result<Self> {
        let path = default_socket_path()?;
        Self::connect_to(&path)
    }

    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to overlay display daemon at {}", path.display()))?;
        Ok(Self { stream })
    }

    /// One request, one response; the daemon answers in order on the same stream
    pub fn request(&mut self, req: ControlRequest) -> Result<ControlResponse> {
        write_message(&mut self.stream, &req)?;
        read_message(&mut self.stream)
    }
}

/// Daemon side: owns the socket file and unlinks it on drop
pub struct ControlServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ControlServer {
    pub fn bind() -> Result<Self> {
        let socket_path = default_socket_path()?;
        Self::bind_to(socket_path)
    }

    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Stale socket from a daemon that did not exit cleanly
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self { listener, socket_path })
    }

    /// Blocks until the next CLI connects
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Frame `msg` as a little-endian `u32` byte count followed by its JSON
pub(crate) fn write_message<T: Serialize>(stream: &mut impl Write, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;

    let len = u32::try_from(json.len()).context("Message too large to frame")?;
    stream.write_all(&len.to_le_bytes()).context("Failed to write message length")?;
    stream.write_all(&json).context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Inverse of [`write_message`]; a short read or oversized count is an error
pub(crate) fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut impl Read) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream.read_exact(&mut json_buf).context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_framing_over_buffer() {
        let mut buf = Vec::new();
        let req = ControlRequest::RequestMode {
            unique_id: "overlay:1".to_string(),
            mode_id: 3,
        };
        write_message(&mut buf, &req).unwrap();
        assert_eq!(&buf[..4], &(buf.len() as u32 - 4).to_le_bytes());

        let decoded: ControlRequest = read_message(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let mut buf = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(b"{}");
        let result: Result<ControlResponse> = read_message(&mut Cursor::new(buf));
        assert!(result.unwrap_err().to_string().contains("Message too large"));
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let mut buf = 10u32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"\"Po");
        let result: Result<ControlResponse> = read_message(&mut Cursor::new(buf));
        assert!(result.is_err());
    }
}
