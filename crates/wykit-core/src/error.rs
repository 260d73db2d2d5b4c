//! Error types for request handling and synthesis.

/// A request the server refuses to synthesize. Always answered with an
/// `ERROR` header carrying the `Display` text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// Header is not JSON, or does not have the expected fields.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Header `type` is neither `TTS` nor `INFO`.
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    /// Text frame is not valid UTF-8.
    #[error("text is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("voice not available: {0}")]
    UnknownVoice(String),

    #[error("invalid speed: {0} (must be a positive number)")]
    InvalidSpeed(f64),

    #[error("invalid sample_rate: {0} (must be a positive integer)")]
    InvalidSampleRate(u32),

    #[error("text too long: {len} characters exceeds limit of {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("unsupported info query: {0}")]
    UnsupportedInfo(String),
}

impl RequestError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }
}

/// Failure reported by a synthesis backend. The `Display` text is sent to
/// the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("text is empty")]
    EmptyInput,

    #[error("{0}")]
    Internal(String),
}

impl SynthError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn model_not_loaded(msg: impl Into<String>) -> Self {
        Self::ModelNotLoaded(msg.into())
    }
}
