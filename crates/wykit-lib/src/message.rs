//! Message layer — JSON header frames and raw payload frames.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use wykit_core::protocol::{decode_text, parse_request_header};
use wykit_core::types::{AudioHeader, InfoResponse, RequestHeader, ResponseHeader, SessionLimits};
use wykit_core::RequestError;

use crate::frame::{read_frame_timeout, write_frame, FrameError};

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Connection-level failure; the peer gets no response.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Bad request; answered with an `ERROR` header.
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to encode header: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Read and parse the request header frame.
pub async fn read_request_header<R>(
    reader: &mut R,
    limits: &SessionLimits,
) -> Result<RequestHeader, MessageError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame_timeout(reader, limits.max_frame_len, limits.read_timeout).await?;
    debug!("header frame: {} bytes", payload.len());
    Ok(parse_request_header(&payload)?)
}

/// Read the UTF-8 text frame that follows a `TTS` header.
pub async fn read_text<R>(reader: &mut R, limits: &SessionLimits) -> Result<String, MessageError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame_timeout(reader, limits.max_frame_len, limits.read_timeout).await?;
    debug!("text frame: {} bytes", payload.len());
    Ok(decode_text(payload)?)
}

pub async fn write_success_header<W>(
    writer: &mut W,
    sample_rate: u32,
    voice: &str,
) -> Result<(), MessageError>
where
    W: AsyncWrite + Unpin,
{
    write_header(writer, &ResponseHeader::Audio(AudioHeader::wav(sample_rate, voice))).await
}

pub async fn write_error_header<W>(writer: &mut W, message: &str) -> Result<(), MessageError>
where
    W: AsyncWrite + Unpin,
{
    write_header(writer, &ResponseHeader::error(message)).await
}

pub async fn write_info<W>(writer: &mut W, info: InfoResponse) -> Result<(), MessageError>
where
    W: AsyncWrite + Unpin,
{
    write_header(writer, &ResponseHeader::Info(info)).await
}

/// Write the WAV payload. Only valid after [`write_success_header`].
pub async fn write_audio<W>(writer: &mut W, wav: &[u8]) -> Result<(), MessageError>
where
    W: AsyncWrite + Unpin,
{
    Ok(write_frame(writer, wav).await?)
}

async fn write_header<W>(writer: &mut W, header: &ResponseHeader) -> Result<(), MessageError>
where
    W: AsyncWrite + Unpin,
{
    let json = header.to_json()?;
    Ok(write_frame(writer, &json).await?)
}
