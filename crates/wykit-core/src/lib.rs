//! wykit-core — Pure wire types, validation and audio encoding.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod error;
pub mod protocol;
pub mod types;
pub mod voices;
pub mod wav;

pub use error::{RequestError, SynthError};
pub use voices::{RegistryError, VoiceHandle, VoiceRegistry};
