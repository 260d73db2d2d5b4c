//! Request parsing and validation.
//!
//! Pure functions over frame payloads — the async codec lives in wykit-lib.

use serde_json::Value;

use crate::error::RequestError;
use crate::types::{InfoQuery, InfoTopic, RequestHeader, TtsRequest};

pub const TYPE_TTS: &str = "TTS";
pub const TYPE_INFO: &str = "INFO";

/// Parse a request header frame.
///
/// The `type` field is inspected before the rest of the shape so that an
/// unknown type is reported as such even when its other fields are missing.
/// An INFO `what` that is not a string is kept as its JSON text and left
/// for [`InfoQuery::topic`] to refuse.
pub fn parse_request_header(payload: &[u8]) -> Result<RequestHeader, RequestError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| RequestError::malformed(format!("invalid JSON: {e}")))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => return Err(RequestError::malformed("field `type` must be a string")),
        None => return Err(RequestError::malformed("missing field `type`")),
    };

    match kind.as_str() {
        TYPE_TTS => serde_json::from_value::<TtsRequest>(value)
            .map(RequestHeader::Tts)
            .map_err(|e| RequestError::malformed(e.to_string())),
        TYPE_INFO => {
            let what = match value.get("what") {
                None => String::new(),
                Some(Value::String(what)) => what.clone(),
                Some(other) => other.to_string(),
            };
            Ok(RequestHeader::Info(InfoQuery { what }))
        }
        _ => Err(RequestError::UnsupportedType(kind)),
    }
}

/// Decode a text frame.
pub fn decode_text(payload: Vec<u8>) -> Result<String, RequestError> {
    String::from_utf8(payload).map_err(|e| RequestError::Encoding(e.utf8_error().to_string()))
}

impl TtsRequest {
    /// Check `speed` and `sample_rate` are positive. Values are otherwise
    /// passed through to the backend.
    pub fn validate(&self) -> Result<(), RequestError> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(RequestError::InvalidSpeed(self.speed));
        }
        if self.sample_rate == 0 {
            return Err(RequestError::InvalidSampleRate(self.sample_rate));
        }
        Ok(())
    }
}

/// Reject text longer than `max_chars` characters.
pub fn check_text_len(text: &str, max_chars: usize) -> Result<(), RequestError> {
    let len = text.chars().count();
    if len > max_chars {
        return Err(RequestError::TextTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(())
}

impl InfoQuery {
    pub fn topic(&self) -> Result<InfoTopic, RequestError> {
        match self.what.to_ascii_lowercase().as_str() {
            "voices" | "voice" | "list_voices" => Ok(InfoTopic::Voices),
            "version" | "ver" => Ok(InfoTopic::Version),
            _ => Err(RequestError::UnsupportedInfo(self.what.clone())),
        }
    }
}
