//! Client side of the protocol, used by the CLI and the integration tests.
//!
//! Each call opens a fresh connection, sends one request and reads the
//! response. The whole exchange is bounded by the client timeout.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::debug;

use wykit_core::types::{
    AudioHeader, InfoQuery, InfoResponse, RequestHeader, ResponseHeader, TtsRequest,
    AUDIO_FORMAT_WAV,
};
use wykit_core::wav::WAV_HEADER_LEN;

use crate::frame::{read_frame, write_frame, FrameError};

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Responses can be long WAVs; this only guards against garbage prefixes.
const MAX_RESPONSE_FRAME_LEN: usize = 256 << 20;

/// Voice and text used by [`Client::health_check`].
pub const HEALTH_VOICE: &str = "expr-voice-5-m";
pub const HEALTH_TEXT: &str = "ok";

/// Sample rates a healthy server is expected to answer with.
pub const HEALTHY_SAMPLE_RATES: [u32; 5] = [16_000, 22_050, 24_000, 44_100, 48_000];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid response header: {0}")]
    InvalidHeader(#[from] serde_json::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl ClientError {
    /// Network-level failure, as opposed to a bad or unexpected response.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout(_) => true,
            Self::Frame(e) => !matches!(e, FrameError::TooLarge { .. }),
            _ => false,
        }
    }
}

/// A successful TTS response.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub header: AudioHeader,
    pub wav: Vec<u8>,
}

/// Result of a health probe that got an `AUDIO` response.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub header: AudioHeader,
    pub wav_bytes: usize,
    pub elapsed: Duration,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.header.ok
            && self.header.format == AUDIO_FORMAT_WAV
            && HEALTHY_SAMPLE_RATES.contains(&self.header.sample_rate)
            && self.wav_bytes > WAV_HEADER_LEN
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    timeout: Duration,
}

impl Client {
    /// `addr` is a `host:port` string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one TTS request and return the WAV.
    pub async fn synthesize(
        &self,
        request: &TtsRequest,
        text: &str,
    ) -> Result<SynthesizedAudio, ClientError> {
        self.bounded(async {
            let mut stream = self.connect().await?;
            let header = serde_json::to_vec(&RequestHeader::Tts(request.clone()))?;
            write_frame(&mut stream, &header).await?;
            write_frame(&mut stream, text.as_bytes()).await?;

            match read_header(&mut stream).await? {
                ResponseHeader::Audio(header) => {
                    let wav = read_frame(&mut stream, MAX_RESPONSE_FRAME_LEN).await?;
                    Ok(SynthesizedAudio { header, wav })
                }
                ResponseHeader::Error { message } => Err(ClientError::Server(message)),
                other => Err(ClientError::Unexpected(format!("{other:?}"))),
            }
        })
        .await
    }

    /// Voices the server accepts, in registration order.
    pub async fn voices(&self) -> Result<Vec<String>, ClientError> {
        let info = self.info("voices").await?;
        info.voices
            .ok_or_else(|| ClientError::Unexpected("INFO response without voices".into()))
    }

    pub async fn version(&self) -> Result<String, ClientError> {
        let info = self.info("version").await?;
        info.version
            .ok_or_else(|| ClientError::Unexpected("INFO response without version".into()))
    }

    /// Minimal end-to-end readiness probe: synthesize a short word and
    /// time it. Judge the result with [`HealthReport::is_healthy`].
    pub async fn health_check(&self) -> Result<HealthReport, ClientError> {
        let started = Instant::now();
        let request = TtsRequest::new(HEALTH_VOICE, 1.0, 24_000);
        let audio = self.synthesize(&request, HEALTH_TEXT).await?;
        Ok(HealthReport {
            header: audio.header,
            wav_bytes: audio.wav.len(),
            elapsed: started.elapsed(),
        })
    }

    async fn info(&self, what: &str) -> Result<InfoResponse, ClientError> {
        self.bounded(async {
            let mut stream = self.connect().await?;
            let header = serde_json::to_vec(&RequestHeader::Info(InfoQuery::new(what)))?;
            write_frame(&mut stream, &header).await?;

            match read_header(&mut stream).await? {
                ResponseHeader::Info(info) => Ok(info),
                ResponseHeader::Error { message } => Err(ClientError::Server(message)),
                other => Err(ClientError::Unexpected(format!("{other:?}"))),
            }
        })
        .await
    }

    async fn connect(&self) -> Result<TcpStream, ClientError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr = %self.addr, "set_nodelay failed: {e}");
        }
        Ok(stream)
    }

    async fn bounded<T>(
        &self,
        exchange: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }
}

async fn read_header(stream: &mut TcpStream) -> Result<ResponseHeader, ClientError> {
    let payload = read_frame(stream, MAX_RESPONSE_FRAME_LEN).await?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn report(format: &str, sample_rate: u32, ok: bool, wav_bytes: usize) -> HealthReport {
        HealthReport {
            header: AudioHeader {
                format: format.into(),
                sample_rate,
                voice: HEALTH_VOICE.into(),
                ok,
            },
            wav_bytes,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn health_requires_sane_header_and_payload() {
        assert!(report("wav", 24_000, true, 1000).is_healthy());
        assert!(report("wav", 22_050, true, 45).is_healthy());
        assert!(!report("wav", 24_000, false, 1000).is_healthy());
        assert!(!report("mp3", 24_000, true, 1000).is_healthy());
        assert!(!report("wav", 8_000, true, 1000).is_healthy());
        assert!(!report("wav", 24_000, true, 44).is_healthy());
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Client::new(addr.to_string()).voices().await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let err = Client::new(addr.to_string())
            .with_timeout(Duration::from_millis(100))
            .voices()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(err.is_connection());
    }

    #[test]
    fn server_error_is_not_connection_error() {
        assert!(!ClientError::Server("voice not available: x".into()).is_connection());
        assert!(!ClientError::Unexpected("INFO".into()).is_connection());
    }
}
