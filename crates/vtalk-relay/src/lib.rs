//! VTALK Relay - HTTP front for the virtual character backend
//!
//! Relays requests to the local speech engine and chat backend:
//! - TTS relay (VOICEVOX-compatible two-step synthesis)
//! - Chat relay (OpenAI-compatible completions with emotion tags)
//! - Mouth tracks rendered from synthesized speech

pub mod config;
pub mod error;
pub mod tts;
pub mod chat;
pub mod routes;
pub mod logging;

pub use config::*;
pub use error::*;
pub use tts::*;
pub use chat::*;
pub use routes::*;
pub use logging::*;
