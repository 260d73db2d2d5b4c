//! Kokoro backend — forwards synthesis to a Kokoro server over HTTP.
//!
//! Uses the OpenAI-compatible endpoints:
//!
//! ```text
//! GET  {url}/v1/audio/voices  → {"voices": [...]}
//! POST {url}/v1/audio/speech  → raw PCM, 24 kHz mono 16-bit LE (streamed)
//! ```
//!
//! Kokoro always renders at 24 kHz; the session resamples when a request
//! asks for another rate.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, error};

use wykit_core::types::{PcmAudio, SynthesisJob};
use wykit_core::SynthError;

use crate::synth::Synthesizer;

pub const DEFAULT_KOKORO_URL: &str = "http://localhost:8880";

/// Kokoro PCM streaming format: 24 kHz mono 16-bit signed LE.
const PCM_SAMPLE_RATE: u32 = 24_000;

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<String>,
}

pub struct KokoroSynthesizer {
    client: reqwest::Client,
    base_url: String,
    voices: Vec<String>,
}

impl KokoroSynthesizer {
    /// Use a known voice list without asking the server.
    pub fn new(base_url: &str, voices: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voices,
        }
    }

    /// Query the server's voice list. Fails if the server is unreachable,
    /// which aborts startup.
    pub async fn connect(base_url: &str) -> Result<Self, SynthError> {
        let mut synth = Self::new(base_url, Vec::new());
        let url = format!("{}/v1/audio/voices", synth.base_url);

        let resp = synth.client.get(&url).send().await.map_err(|e| {
            SynthError::model_not_loaded(format!("kokoro unreachable at {}: {e}", synth.base_url))
        })?;
        if !resp.status().is_success() {
            return Err(SynthError::model_not_loaded(format!(
                "kokoro voice listing failed: {}",
                resp.status()
            )));
        }
        let body: VoicesResponse = resp
            .json()
            .await
            .map_err(|e| SynthError::model_not_loaded(format!("bad kokoro voice list: {e}")))?;

        debug!("kokoro: {} voices at {}", body.voices.len(), synth.base_url);
        synth.voices = body.voices;
        Ok(synth)
    }
}

#[async_trait]
impl Synthesizer for KokoroSynthesizer {
    fn name(&self) -> &str {
        "kokoro"
    }

    fn voices(&self) -> Vec<String> {
        self.voices.clone()
    }

    async fn synthesize(&self, job: &SynthesisJob) -> Result<PcmAudio, SynthError> {
        if job.text.trim().is_empty() {
            return Err(SynthError::EmptyInput);
        }
        let voice = self.voices.get(job.voice.index()).ok_or_else(|| {
            SynthError::internal(format!("no kokoro voice at index {}", job.voice.index()))
        })?;

        let body = serde_json::json!({
            "input": job.text,
            "voice": voice,
            "model": "kokoro",
            "response_format": "pcm",
            "stream": true,
            "speed": job.speed,
        });
        let url = format!("{}/v1/audio/speech", self.base_url);
        debug!("kokoro: POST {} bytes as {voice}", job.text.len());

        let resp = match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                error!("kokoro: error {status}: {text}");
                return Err(SynthError::internal(format!("kokoro error {status}: {text}")));
            }
            Err(e) => {
                error!("kokoro: request failed: {e}");
                return Err(SynthError::internal(format!("kokoro request failed: {e}")));
            }
        };

        let mut stream = resp.bytes_stream();
        let mut samples = Vec::new();
        let mut leftover: Option<u8> = None;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| SynthError::internal(format!("kokoro stream error: {e}")))?;
            let (decoded, lo) = bytes_to_i16(&chunk, leftover.take());
            samples.extend(decoded);
            leftover = lo;
        }

        if samples.is_empty() {
            return Err(SynthError::internal("kokoro returned no audio"));
        }
        Ok(PcmAudio::new(samples, PCM_SAMPLE_RATE))
    }
}

/// Convert raw little-endian bytes to i16 samples, carrying an odd trailing
/// byte over to the next chunk.
fn bytes_to_i16(bytes: &[u8], leftover: Option<u8>) -> (Vec<i16>, Option<u8>) {
    let joined: Vec<u8>;
    let slice = match leftover {
        Some(lo) => {
            joined = std::iter::once(lo).chain(bytes.iter().copied()).collect();
            &joined[..]
        }
        None => bytes,
    };

    let pairs = slice.chunks_exact(2);
    let remainder = pairs.remainder().first().copied();
    let samples = pairs.map(|p| i16::from_le_bytes([p[0], p[1]])).collect();
    (samples, remainder)
}
