// Wire framing — length-prefixed transport units
//
// Each frame is a 4-byte little-endian length followed by exactly that many
// bytes of envelope text. The length counts the body only, never itself.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Largest frame body a peer may declare.
///
/// Once a declared length is refused there is no way to resynchronize the
/// byte stream, so exceeding this limit is fatal to the connection.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum FrameError {
    /// Transport-level read or write failure. Fatal to the connection.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Declared or submitted body length exceeds the accepted bound. Fatal
    /// to the connection on the read side.
    #[error("frame length {len} exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}

// ============================================================================
// FRAME I/O
// ============================================================================

/// Read one complete frame body.
///
/// Reads are strictly sequential: the length prefix first, then exactly the
/// declared number of body bytes. EOF anywhere, including before the first
/// prefix byte, surfaces as `Io(UnexpectedEof)`.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32_le().await? as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one frame as a single contiguous buffer, then flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_all(&encode_frame(body)).await?;
    writer.flush().await?;
    Ok(())
}

/// Build the full wire bytes for one body: length prefix plus body.
///
/// The prefix is deterministic, so rebuilding a frame from a received body
/// yields bytes identical to what the sender put on the wire. The forward
/// path relies on this. Callers enforce [`MAX_FRAME_LEN`] before framing.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= u32::MAX as usize);
    let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(body);
    frame
}

// ============================================================================
// TESTS
// ============================================================================
