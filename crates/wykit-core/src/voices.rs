//! Voice registry — fixed mapping from voice id to backend voice handle.
//!
//! Built once at startup from the backend's reported voice list and shared
//! read-only by every session, so it needs no locking.

use std::collections::HashMap;

use crate::error::RequestError;

/// Opaque reference to one of the backend's voices.
///
/// The handle is the voice's position in the list the backend reported,
/// so a backend resolves it with `voices[handle.index()]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(usize);

impl VoiceHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no voices available")]
    Empty,
}

/// Immutable voice id → handle table.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    ids: Vec<String>,
    handles: HashMap<String, VoiceHandle>,
}

impl VoiceRegistry {
    /// Build the registry from a backend's capability list.
    ///
    /// Order is preserved; a repeated id keeps its first position.
    pub fn from_capabilities<I, S>(voices: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = Vec::new();
        let mut handles = HashMap::new();
        for (position, voice) in voices.into_iter().enumerate() {
            let voice = voice.into();
            if handles.contains_key(&voice) {
                continue;
            }
            handles.insert(voice.clone(), VoiceHandle(position));
            ids.push(voice);
        }

        if ids.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { ids, handles })
    }

    /// Look up a voice id.
    pub fn resolve(&self, voice: &str) -> Result<VoiceHandle, RequestError> {
        self.handles
            .get(voice)
            .copied()
            .ok_or_else(|| RequestError::UnknownVoice(voice.to_string()))
    }

    /// Voice ids in registration order.
    pub fn list_voices(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.handles.contains_key(voice)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
