//! VTALK Core - Shared types for the virtual character backend
//!
//! This crate defines the types used by the lip-sync engine and the relays:
//! - Session identity (SessionId)
//! - Emotion tags and expression mapping
//! - Error and result types

pub mod id;
pub mod emotion;
pub mod error;

pub use id::*;
pub use emotion::*;
pub use error::*;
