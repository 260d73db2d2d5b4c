//! wykit-lib — framed TCP text-to-speech server engine.
//!
//! Frame codec, message layer, per-connection session handler, connection
//! acceptor, synthesis backends and the matching client.
//! Depends on wykit-core for pure types, validation and WAV handling.

pub mod backend;
pub mod client;
pub mod frame;
pub mod message;
pub mod server;
pub mod session;
pub mod synth;

// Re-export wykit-core for convenience
pub use wykit_core;
