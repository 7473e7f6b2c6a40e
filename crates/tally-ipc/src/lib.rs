//! Wire protocol for the word-tally daemon.
//!
//! Every message is a frame: a 4-byte little-endian payload length followed
//! by the JSON encoding of a [`TallyRequest`] or [`TallyResponse`]. The JSON
//! bodies of `CountWords` and `Words` are exactly the request map
//! (`{"key": "/path"}`) and the result map (`{"key": {"word": n}}`).
//!
//! Requests are small and capped at [`MAX_REQUEST_SIZE`]. Responses carry
//! whole frequency tables and get the much larger [`MAX_RESPONSE_SIZE`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_core::{RootRequest, WordCountResult};

/// Largest accepted request payload (16 MiB)
pub const MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024;

/// Largest response payload sent or accepted (1 GiB)
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
    #[error("Daemon error: {0}")]
    Daemon(String),
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TallyRequest {
    Handshake { client_version: String },
    Status,
    CountWords { roots: RootRequest },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TallyResponse {
    HandshakeAck { server_version: String },
    StatusAck { status: String },
    Words { result: WordCountResult },
    Error(String),
}

impl TallyResponse {
    fn kind(&self) -> &'static str {
        match self {
            TallyResponse::HandshakeAck { .. } => "HandshakeAck",
            TallyResponse::StatusAck { .. } => "StatusAck",
            TallyResponse::Words { .. } => "Words",
            TallyResponse::Error(_) => "Error",
        }
    }
}

/// Encode `message` as a length-prefixed frame of at most `max` payload bytes
pub fn encode_frame<T: Serialize>(message: &T, max: usize) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    check_frame_size(payload.len(), max)?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame payload (without its length prefix)
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn check_frame_size(size: usize, max: usize) -> Result<()> {
    let max = max.min(u32::MAX as usize);
    if size > max {
        return Err(IpcError::FrameTooLarge { size, max });
    }
    Ok(())
}

/// Async frame I/O over any tokio stream
#[cfg(feature = "tokio")]
pub mod frame {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Read one frame payload of at most `max` bytes
    ///
    /// Returns `None` when the peer closed between frames.
    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        check_frame_size(len, max)?;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }

    /// Write `message` as one frame of at most `max` payload bytes
    pub async fn write_frame<W, T>(writer: &mut W, message: &T, max: usize) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let frame = encode_frame(message, max)?;
        write_encoded(writer, &frame).await
    }

    /// Write a frame produced by [`encode_frame`]
    pub async fn write_encoded<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// IPC client for communicating with tallyd
#[cfg(feature = "tokio")]
pub mod client {
    use super::frame::{read_frame, write_frame};
    use super::*;
    use std::path::Path;
    use tokio::net::UnixStream;

    pub struct DaemonClient {
        stream: UnixStream,
    }

    impl DaemonClient {
        /// Connect to the daemon listening on `socket_path`
        pub async fn connect_to(socket_path: impl AsRef<Path>) -> Result<Self> {
            let stream = UnixStream::connect(socket_path.as_ref()).await?;
            Ok(Self { stream })
        }

        /// Send a request and receive response
        pub async fn send(&mut self, request: TallyRequest) -> Result<TallyResponse> {
            write_frame(&mut self.stream, &request, MAX_REQUEST_SIZE).await?;
            match read_frame(&mut self.stream, MAX_RESPONSE_SIZE).await? {
                Some(payload) => decode_payload(&payload),
                None => Err(IpcError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "daemon closed the connection",
                ))),
            }
        }

        /// Handshake with daemon
        pub async fn handshake(&mut self) -> Result<String> {
            let request = TallyRequest::Handshake {
                client_version: env!("CARGO_PKG_VERSION").to_string(),
            };
            match self.send(request).await? {
                TallyResponse::HandshakeAck { server_version } => Ok(server_version),
                TallyResponse::Error(e) => Err(IpcError::Daemon(e)),
                other => Err(IpcError::Unexpected(other.kind().to_string())),
            }
        }

        /// Get daemon status
        pub async fn status(&mut self) -> Result<String> {
            match self.send(TallyRequest::Status).await? {
                TallyResponse::StatusAck { status } => Ok(status),
                TallyResponse::Error(e) => Err(IpcError::Daemon(e)),
                other => Err(IpcError::Unexpected(other.kind().to_string())),
            }
        }

        /// Count words under every root of `roots`
        pub async fn count_words(&mut self, roots: RootRequest) -> Result<WordCountResult> {
            match self.send(TallyRequest::CountWords { roots }).await? {
                TallyResponse::Words { result } => Ok(result),
                TallyResponse::Error(e) => Err(IpcError::Daemon(e)),
                other => Err(IpcError::Unexpected(other.kind().to_string())),
            }
        }
    }
}
