//! Synthesis backends shipped with the server.

pub mod kokoro;
pub mod tone;

pub use kokoro::KokoroSynthesizer;
pub use tone::ToneSynthesizer;
