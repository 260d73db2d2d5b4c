//! Session handler — one connection, one request.
//!
//! ```text
//! AwaitingHeader ─► AwaitingText ─► Synthesizing ─► RespondingSuccess ─► Closed
//!       │                 │               │
//!       └─────────────────┴───────────────┴───► RespondingError ─► Closed
//! ```
//!
//! Protocol, validation and synthesis failures are answered with a single
//! `ERROR` header. Transport failures (peer gone, read timeout, oversized
//! frame, write error) end the session without a response.
//!
//! `INFO` headers skip the text frame and get one `INFO` frame back.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use wykit_core::protocol::check_text_len;
use wykit_core::types::{
    InfoQuery, InfoResponse, InfoTopic, PcmAudio, RequestHeader, SessionLimits, SynthesisJob,
    MAX_OUTPUT_SAMPLES,
};
use wykit_core::{wav, RequestError, VoiceRegistry};

use crate::message::{self, MessageError};
use crate::synth::SynthService;

/// Everything a session may touch. Shared read-only across sessions.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<VoiceRegistry>,
    pub synth: SynthService,
    pub limits: SessionLimits,
}

impl SessionContext {
    pub fn new(registry: Arc<VoiceRegistry>, synth: SynthService, limits: SessionLimits) -> Self {
        Self {
            registry,
            synth,
            limits,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Success header and WAV frame delivered.
    Audio {
        voice: String,
        sample_rate: u32,
        wav_bytes: usize,
    },
    /// INFO query answered.
    Info,
    /// `ERROR` header delivered.
    Rejected { message: String },
    /// Connection abandoned without (complete) response.
    Dropped { reason: String },
}

enum Failure {
    /// Answer with an `ERROR` header.
    Reject(String),
    /// Abandon the connection.
    Drop(String),
}

impl From<RequestError> for Failure {
    fn from(e: RequestError) -> Self {
        Failure::Reject(e.to_string())
    }
}

impl From<MessageError> for Failure {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Request(e) => Failure::Reject(e.to_string()),
            other => Failure::Drop(other.to_string()),
        }
    }
}

/// Serve one request on `stream`, then shut down its write side.
pub async fn run_session<S>(stream: &mut S, ctx: &SessionContext) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = match serve(stream, ctx).await {
        Ok(outcome) => outcome,
        Err(Failure::Reject(message)) => reject(stream, message).await,
        Err(Failure::Drop(reason)) => SessionOutcome::Dropped { reason },
    };
    let _ = stream.shutdown().await;
    outcome
}

async fn serve<S>(stream: &mut S, ctx: &SessionContext) -> Result<SessionOutcome, Failure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match message::read_request_header(stream, &ctx.limits).await? {
        RequestHeader::Tts(request) => request,
        RequestHeader::Info(query) => return answer_info(stream, ctx, &query).await,
    };
    let text = message::read_text(stream, &ctx.limits).await?;

    let voice = ctx.registry.resolve(&request.voice)?;
    request.validate()?;
    check_text_len(&text, ctx.limits.max_text_chars)?;

    info!(
        voice = %request.voice,
        speed = request.speed,
        sample_rate = request.sample_rate,
        "synthesize request: '{}'",
        preview(&text)
    );

    let job = SynthesisJob {
        text,
        voice,
        speed: request.speed,
        sample_rate: request.sample_rate,
    };
    let pcm = ctx.synth.synthesize(&job).await.map_err(|e| {
        error!("synthesis failed: {e}");
        Failure::Reject(e.to_string())
    })?;

    let samples = conform_rate(pcm, request.sample_rate)?;
    let wav = wav::write_wav(&samples, request.sample_rate);

    message::write_success_header(stream, request.sample_rate, &request.voice)
        .await
        .inspect_err(|e| error!("failed to send audio header: {e}"))?;
    message::write_audio(stream, &wav)
        .await
        .inspect_err(|e| error!("failed to send {} byte WAV: {e}", wav.len()))?;

    Ok(SessionOutcome::Audio {
        voice: request.voice,
        sample_rate: request.sample_rate,
        wav_bytes: wav.len(),
    })
}

async fn answer_info<S>(
    stream: &mut S,
    ctx: &SessionContext,
    query: &InfoQuery,
) -> Result<SessionOutcome, Failure>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let info = match query.topic()? {
        InfoTopic::Voices => InfoResponse {
            voices: Some(ctx.registry.list_voices().to_vec()),
            version: None,
        },
        InfoTopic::Version => InfoResponse {
            voices: None,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        },
    };
    message::write_info(stream, info).await?;
    Ok(SessionOutcome::Info)
}

async fn reject<S>(stream: &mut S, message: String) -> SessionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match message::write_error_header(stream, &message).await {
        Ok(()) => SessionOutcome::Rejected { message },
        Err(e) => {
            error!("failed to send error response: {e}");
            SessionOutcome::Dropped {
                reason: format!("error response not delivered ({message}): {e}"),
            }
        }
    }
}

/// Bring backend output to the requested rate, refusing to build more
/// than [`MAX_OUTPUT_SAMPLES`].
fn conform_rate(pcm: PcmAudio, sample_rate: u32) -> Result<Vec<i16>, Failure> {
    if pcm.sample_rate == sample_rate {
        return Ok(pcm.samples);
    }
    let out_len = wav::resampled_len(pcm.samples.len(), pcm.sample_rate, sample_rate);
    if out_len > MAX_OUTPUT_SAMPLES as u64 {
        let message = format!(
            "resampled audio of {out_len} samples exceeds limit of {MAX_OUTPUT_SAMPLES}"
        );
        error!("{message}");
        return Err(Failure::Reject(message));
    }
    debug!(
        "resampling {} samples from {} Hz to {} Hz",
        pcm.samples.len(),
        pcm.sample_rate,
        sample_rate
    );
    Ok(wav::resample_linear(&pcm.samples, pcm.sample_rate, sample_rate))
}

/// First 80 characters on one line, for logs.
fn preview(text: &str) -> String {
    text.chars()
        .take(80)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::AsyncWriteExt;
    use wykit_core::types::ResponseHeader;
    use wykit_core::wav::parse_wav_header;
    use wykit_core::SynthError;

    use crate::backend::ToneSynthesizer;
    use crate::frame::read_frame;
    use crate::synth::Synthesizer;

    const HELLO_HEADER: &[u8] =
        br#"{"type":"TTS","voice":"expr-voice-5-m","speed":1.0,"sample_rate":24000}"#;

    fn context_with(synth: impl Synthesizer + 'static, limits: SessionLimits) -> SessionContext {
        let synth = SynthService::serialized(Arc::new(synth));
        let registry = VoiceRegistry::from_capabilities(synth.capabilities()).unwrap();
        SessionContext::new(Arc::new(registry), synth, limits)
    }

    fn context() -> SessionContext {
        context_with(ToneSynthesizer::new(), SessionLimits::default())
    }

    fn frames(parts: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for part in parts {
            out.extend_from_slice(&(part.len() as u32).to_be_bytes());
            out.extend_from_slice(part);
        }
        out
    }

    /// Send `wire`, half-close, and collect every response frame.
    async fn exchange(ctx: SessionContext, wire: Vec<u8>) -> (SessionOutcome, Vec<Vec<u8>>) {
        let (mut client, mut server) = tokio::io::duplex(1 << 20);
        let session = tokio::spawn(async move { run_session(&mut server, &ctx).await });

        client.write_all(&wire).await.unwrap();
        client.shutdown().await.unwrap();

        let mut responses = Vec::new();
        while let Ok(frame) = read_frame(&mut client, 64 << 20).await {
            responses.push(frame);
        }
        (session.await.unwrap(), responses)
    }

    fn header(frame: &[u8]) -> ResponseHeader {
        serde_json::from_slice(frame).unwrap()
    }

    fn error_message(frame: &[u8]) -> String {
        match header(frame) {
            ResponseHeader::Error { message } => message,
            other => panic!("expected ERROR header, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hello_produces_header_and_wav() {
        let (outcome, responses) =
            exchange(context(), frames(&[HELLO_HEADER, b"hello"])).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(
            std::str::from_utf8(&responses[0]).unwrap(),
            r#"{"type":"AUDIO","format":"wav","sample_rate":24000,"voice":"expr-voice-5-m","ok":true}"#
        );
        let wav = parse_wav_header(&responses[1]).unwrap();
        assert_eq!(wav.sample_rate, 24000);
        assert_eq!(wav.bits_per_sample, 16);
        assert_eq!(wav.channels, 1);
        assert!(wav.frames() > 0);

        assert_eq!(
            outcome,
            SessionOutcome::Audio {
                voice: "expr-voice-5-m".into(),
                sample_rate: 24000,
                wav_bytes: responses[1].len(),
            }
        );
    }

    #[tokio::test]
    async fn unknown_voice_gets_error_and_no_audio() {
        let (outcome, responses) = exchange(
            context(),
            frames(&[
                br#"{"type":"TTS","voice":"does-not-exist","speed":1.0,"sample_rate":24000}"#,
                b"hello",
            ]),
        )
        .await;

        assert_eq!(responses.len(), 1);
        let message = error_message(&responses[0]);
        assert!(message.contains("voice"), "{message}");
        assert!(matches!(outcome, SessionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn invalid_json_is_answered_without_reading_text() {
        // no text frame is sent; the server must not wait for one
        let (outcome, responses) = exchange(context(), frames(&[b"{oops"])).await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).starts_with("malformed header"));
        assert!(matches!(outcome, SessionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn unsupported_type_is_rejected() {
        let (_, responses) =
            exchange(context(), frames(&[br#"{"type":"STT","voice":"x"}"#])).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(
            error_message(&responses[0]),
            "unsupported message type: STT"
        );
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_rejected() {
        let (_, responses) =
            exchange(context(), frames(&[HELLO_HEADER, &[0x68, 0xff, 0x69]])).await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).contains("UTF-8"));
    }

    #[tokio::test]
    async fn non_positive_speed_is_rejected() {
        let (_, responses) = exchange(
            context(),
            frames(&[
                br#"{"type":"TTS","voice":"expr-voice-5-m","speed":0,"sample_rate":24000}"#,
                b"hello",
            ]),
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).contains("speed"));
    }

    #[tokio::test]
    async fn zero_sample_rate_is_rejected() {
        let (_, responses) = exchange(
            context(),
            frames(&[
                br#"{"type":"TTS","voice":"expr-voice-5-m","speed":1.0,"sample_rate":0}"#,
                b"hello",
            ]),
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).contains("sample_rate"));
    }

    #[tokio::test]
    async fn empty_text_reports_backend_message() {
        let (_, responses) = exchange(context(), frames(&[HELLO_HEADER, b""])).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(error_message(&responses[0]), "text is empty");
    }

    #[tokio::test]
    async fn text_over_limit_is_rejected() {
        let limits = SessionLimits {
            max_text_chars: 4,
            ..SessionLimits::default()
        };
        let ctx = context_with(ToneSynthesizer::new(), limits);
        let (_, responses) = exchange(ctx, frames(&[HELLO_HEADER, b"hello"])).await;
        assert!(error_message(&responses[0]).contains("text too long"));
    }

    #[tokio::test]
    async fn backend_failure_is_passed_through_verbatim() {
        struct Broken;

        #[async_trait]
        impl Synthesizer for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn voices(&self) -> Vec<String> {
                vec!["expr-voice-5-m".into()]
            }
            async fn synthesize(&self, _: &SynthesisJob) -> Result<PcmAudio, SynthError> {
                Err(SynthError::internal("kv cache exhausted"))
            }
        }

        let ctx = context_with(Broken, SessionLimits::default());
        let (outcome, responses) = exchange(ctx, frames(&[HELLO_HEADER, b"hello"])).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(error_message(&responses[0]), "kv cache exhausted");
        assert_eq!(
            outcome,
            SessionOutcome::Rejected {
                message: "kv cache exhausted".into()
            }
        );
    }

    #[tokio::test]
    async fn partial_length_prefix_is_dropped_silently() {
        let (outcome, responses) = exchange(context(), vec![0, 0]).await;
        assert!(responses.is_empty());
        assert!(matches!(outcome, SessionOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn disconnect_before_text_is_dropped_silently() {
        let (outcome, responses) = exchange(context(), frames(&[HELLO_HEADER])).await;
        assert!(responses.is_empty());
        assert!(matches!(outcome, SessionOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn oversized_frame_is_dropped_silently() {
        let limits = SessionLimits {
            max_frame_len: 1024,
            ..SessionLimits::default()
        };
        let ctx = context_with(ToneSynthesizer::new(), limits);
        // declare 4 KiB, send nothing more
        let (outcome, responses) = exchange(ctx, 4096u32.to_be_bytes().to_vec()).await;
        assert!(responses.is_empty());
        match outcome {
            SessionOutcome::Dropped { reason } => {
                assert!(reason.starts_with("frame too large"), "{reason}")
            }
            other => panic!("expected Dropped, got {other:?}"),
        }
    }

    fn tts_header(sample_rate: u32) -> Vec<u8> {
        format!(
            r#"{{"type":"TTS","voice":"expr-voice-5-m","speed":1.0,"sample_rate":{sample_rate}}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn high_sample_rate_is_passed_through() {
        let (outcome, responses) =
            exchange(context(), frames(&[&tts_header(384_000), b"hello"])).await;
        assert_eq!(responses.len(), 2);
        match header(&responses[0]) {
            ResponseHeader::Audio(audio) => assert_eq!(audio.sample_rate, 384_000),
            other => panic!("expected AUDIO, got {other:?}"),
        }
        assert_eq!(parse_wav_header(&responses[1]).unwrap().sample_rate, 384_000);
        assert!(matches!(outcome, SessionOutcome::Audio { sample_rate: 384_000, .. }));
    }

    #[tokio::test]
    async fn render_past_sample_budget_is_rejected() {
        let (outcome, responses) =
            exchange(context(), frames(&[&tts_header(u32::MAX), b"hello"])).await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).contains("exceeds"));
        assert!(matches!(outcome, SessionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn resample_past_sample_budget_is_rejected() {
        let ctx = context_with(
            ToneSynthesizer::new().with_output_rate(8_000),
            SessionLimits::default(),
        );
        let (outcome, responses) =
            exchange(ctx, frames(&[&tts_header(u32::MAX), b"hello"])).await;
        assert_eq!(responses.len(), 1);
        assert!(error_message(&responses[0]).starts_with("resampled audio"));
        assert!(matches!(outcome, SessionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn info_lists_voices_in_order() {
        let (outcome, responses) =
            exchange(context(), frames(&[br#"{"type":"INFO","what":"voices"}"#])).await;
        assert_eq!(outcome, SessionOutcome::Info);
        assert_eq!(responses.len(), 1);
        match header(&responses[0]) {
            ResponseHeader::Info(info) => {
                let voices = info.voices.unwrap();
                assert_eq!(voices.first().map(String::as_str), Some("expr-voice-2-m"));
                assert_eq!(voices.len(), 8);
            }
            other => panic!("expected INFO, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn info_reports_version() {
        let (_, responses) =
            exchange(context(), frames(&[br#"{"type":"INFO","what":"version"}"#])).await;
        match header(&responses[0]) {
            ResponseHeader::Info(info) => {
                assert_eq!(info.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
            }
            other => panic!("expected INFO, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_info_query_is_rejected() {
        let (_, responses) =
            exchange(context(), frames(&[br#"{"type":"INFO","what":"models"}"#])).await;
        assert!(error_message(&responses[0]).contains("unsupported info query"));
    }

    #[tokio::test]
    async fn non_string_info_query_is_unsupported() {
        let (outcome, responses) =
            exchange(context(), frames(&[br#"{"type":"INFO","what":5}"#])).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(error_message(&responses[0]), "unsupported info query: 5");
        assert!(matches!(outcome, SessionOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn native_rate_output_is_resampled_to_request() {
        let ctx = context_with(
            ToneSynthesizer::new().with_output_rate(24_000),
            SessionLimits::default(),
        );
        let at_24k = ToneSynthesizer::new()
            .synthesize(&SynthesisJob {
                text: "hello".into(),
                voice: ctx.registry.resolve("expr-voice-5-m").unwrap(),
                speed: 1.0,
                sample_rate: 24_000,
            })
            .await
            .unwrap();

        let (_, responses) = exchange(
            ctx,
            frames(&[
                br#"{"type":"TTS","voice":"expr-voice-5-m","speed":1.0,"sample_rate":16000}"#,
                b"hello",
            ]),
        )
        .await;

        match header(&responses[0]) {
            ResponseHeader::Audio(audio) => assert_eq!(audio.sample_rate, 16_000),
            other => panic!("expected AUDIO, got {other:?}"),
        }
        let wav = parse_wav_header(&responses[1]).unwrap();
        assert_eq!(wav.sample_rate, 16_000);
        assert_eq!(wav.frames(), at_24k.samples.len() * 2 / 3);
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\nb"), "a b");
        assert_eq!(preview(&"x".repeat(200)).len(), 80);
    }
}
