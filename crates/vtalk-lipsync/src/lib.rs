//! VTALK Lip-Sync - Mouth movement from speech amplitude
//!
//! The pipeline per rendered frame:
//! 1. Measure RMS of the most recent audio block (amplitude tap)
//! 2. Smooth it with an attack/decay envelope follower
//! 3. Gate, apply gain, clamp to [0, 1]
//! 4. Map onto the model's mouth parameter and hand it to the renderer
//!
//! Sessions own all filter state; the frame loop owns at most one session.

pub mod envelope;
pub mod amplitude;
pub mod wav;
pub mod param;
pub mod session;
pub mod frame_loop;
pub mod render;

pub use envelope::*;
pub use amplitude::*;
pub use wav::*;
pub use param::*;
pub use session::*;
pub use frame_loop::*;
pub use render::*;
