//! Shared types for the wykit TTS server.
//!
//! Wire messages (request/response headers), synthesis job/result shapes and
//! server configuration. Keeping them in wykit-core means clients can depend
//! on the protocol without pulling in tokio or reqwest.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::voices::VoiceHandle;

// ─── Defaults ──────────────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10200;
pub const DEFAULT_VOICE: &str = "expr-voice-4-f";
pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Largest inbound frame the server accepts (header or text).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;
/// Longest text (in characters) accepted for one synthesis request.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 20_000;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Largest PCM buffer (in samples) a session builds for one utterance,
/// before or after resampling.
pub const MAX_OUTPUT_SAMPLES: usize = 1 << 25;

/// Only container format the server produces.
pub const AUDIO_FORMAT_WAV: &str = "wav";

// ─── Configuration ─────────────────────────────────────────────────────────

/// Per-session resource limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    pub max_frame_len: usize,
    pub max_text_chars: usize,
    /// Deadline for reading one complete frame. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub default_voice: String,
    pub default_speed: f64,
    pub default_sample_rate: u32,
    pub limits: SessionLimits,
    /// How long in-flight sessions may run after a shutdown signal.
    pub shutdown_grace: Duration,
    /// Number of synthesis calls allowed to run at once. 1 serializes them.
    pub synth_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            default_voice: DEFAULT_VOICE.into(),
            default_speed: DEFAULT_SPEED,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            limits: SessionLimits::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            synth_concurrency: 1,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ─── Request headers ───────────────────────────────────────────────────────

/// Header frame sent by a client. Serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestHeader {
    /// Synthesis request; a UTF-8 text frame follows.
    #[serde(rename = "TTS")]
    Tts(TtsRequest),
    /// Metadata query; no further frame follows.
    #[serde(rename = "INFO")]
    Info(InfoQuery),
}

/// Body of a `TTS` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsRequest {
    pub voice: String,
    pub speed: f64,
    pub sample_rate: u32,
}

impl TtsRequest {
    pub fn new(voice: impl Into<String>, speed: f64, sample_rate: u32) -> Self {
        Self {
            voice: voice.into(),
            speed,
            sample_rate,
        }
    }
}

/// Body of an `INFO` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoQuery {
    #[serde(default)]
    pub what: String,
}

impl InfoQuery {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// What an [`InfoQuery`] asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTopic {
    Voices,
    Version,
}

// ─── Response headers ──────────────────────────────────────────────────────

/// Header frame sent by the server. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseHeader {
    /// Success; one WAV frame follows.
    #[serde(rename = "AUDIO")]
    Audio(AudioHeader),
    /// Failure; nothing follows.
    #[serde(rename = "ERROR")]
    Error { message: String },
    /// Answer to an [`InfoQuery`].
    #[serde(rename = "INFO")]
    Info(InfoResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioHeader {
    pub format: String,
    pub sample_rate: u32,
    pub voice: String,
    pub ok: bool,
}

impl AudioHeader {
    /// Success header for a WAV payload.
    pub fn wav(sample_rate: u32, voice: impl Into<String>) -> Self {
        Self {
            format: AUDIO_FORMAT_WAV.into(),
            sample_rate,
            voice: voice.into(),
            ok: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ResponseHeader {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Compact JSON encoding, as written to the wire.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ─── Synthesis ─────────────────────────────────────────────────────────────

/// One validated synthesis request handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisJob {
    pub text: String,
    pub voice: VoiceHandle,
    pub speed: f64,
    pub sample_rate: u32,
}

/// Mono 16-bit PCM returned by a backend, at the backend's output rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
