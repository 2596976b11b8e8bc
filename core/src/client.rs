// Relay client — the connection as seen from the client side

use std::path::Path;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::codec;
use crate::protocol::envelope::{Envelope, ProtocolError};
use crate::protocol::frame::{self, FrameError, MAX_FRAME_LEN};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting or local file access failed.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level read or write failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A received frame did not contain a valid envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ============================================================================
// CLIENT
// ============================================================================

/// One framed connection to a relay.
///
/// Sends are fire-and-forget: the relay never acknowledges, so a successful
/// send only means the frame left this machine. Receiving and sending share
/// the connection; interleave them from one task.
pub struct RelayClient {
    stream: TcpStream,
    name: Option<String>,
}

impl RelayClient {
    /// Connect to a relay. No name is claimed yet.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { stream, name: None })
    }

    /// Claim a display name on the relay and remember it as the sender
    /// identity for subsequent sends. Claiming again switches names.
    pub async fn register(&mut self, name: &str) -> Result<(), ClientError> {
        self.send_envelope(&Envelope::Register {
            name: name.to_string(),
        })
        .await?;
        self.name = Some(name.to_string());
        Ok(())
    }

    /// Name this client last registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Send a text message to a registered receiver.
    pub async fn send_text(&mut self, receiver: &str, text: &str) -> Result<(), ClientError> {
        let envelope = Envelope::Text {
            sender: self.sender_name(),
            receiver: receiver.to_string(),
            data: codec::encode(text.as_bytes()),
        };
        self.send_envelope(&envelope).await
    }

    /// Send a file's contents. The relay stores it under the path's final
    /// component (sanitized on the server side).
    pub async fn send_file(&mut self, receiver: &str, path: &Path) -> Result<(), ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let envelope = Envelope::File {
            sender: self.sender_name(),
            receiver: receiver.to_string(),
            filename,
            data: codec::encode(&bytes),
        };
        self.send_envelope(&envelope).await
    }

    /// Read the next frame and parse its envelope.
    pub async fn next_envelope(&mut self) -> Result<Envelope, ClientError> {
        let body = self.next_frame().await?;
        Ok(Envelope::parse(&body)?)
    }

    /// Read the next raw frame body without interpreting it.
    pub async fn next_frame(&mut self) -> Result<Vec<u8>, ClientError> {
        Ok(frame::read_frame(&mut self.stream, MAX_FRAME_LEN).await?)
    }

    /// Push raw bytes down the connection, bypassing framing entirely.
    /// Exists so tests can feed the relay malformed and oversized input.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let body = envelope.to_wire_bytes()?;
        frame::write_frame(&mut self.stream, &body).await?;
        Ok(())
    }

    fn sender_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}
