//! Length-prefixed framing.
//!
//! Each frame is a 4-byte big-endian length followed by exactly that many
//! payload bytes: `[u32 length][payload]`. Readers either return a complete
//! payload or fail; partial frames are never exposed.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const LEN_PREFIX: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Peer closed (or reset) the connection before the frame was complete.
    #[error("connection closed after {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },

    /// Declared length exceeds the configured maximum. Only the prefix has
    /// been consumed.
    #[error("frame too large: {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("no complete frame within {0:?}")]
    Timeout(Duration),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

impl FrameError {
    /// True when the peer went away mid-read.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ShortRead { .. })
    }
}

/// Read one frame, rejecting declared lengths above `max_len`.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX];
    read_full(reader, &mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    read_full(reader, &mut payload).await?;
    Ok(payload)
}

/// [`read_frame`] bounded by an optional deadline for the whole frame.
pub async fn read_frame_timeout<R>(
    reader: &mut R,
    max_len: usize,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read_frame(reader, max_len))
            .await
            .map_err(|_| FrameError::Timeout(limit))?,
        None => read_frame(reader, max_len).await,
    }
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| {
        FrameError::Write(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a u32 length", payload.len()),
        ))
    })?;

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(FrameError::Write)?;
    writer.write_all(payload).await.map_err(FrameError::Write)?;
    writer.flush().await.map_err(FrameError::Write)
}

/// Fill `buf` completely, tracking how much arrived before EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let expected = buf.len();
    let mut got = 0;
    while got < expected {
        match reader.read(&mut buf[got..]).await {
            Ok(0) => return Err(FrameError::ShortRead { expected, got }),
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_disconnect(&e) => return Err(FrameError::ShortRead { expected, got }),
            Err(e) => return Err(FrameError::Read(e)),
        }
    }
    Ok(())
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
