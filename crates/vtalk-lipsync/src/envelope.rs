//! Envelope Follower - per-frame mouth openness from speech loudness
//!
//! A first-order exponential filter with asymmetric attack/decay
//! coefficients, followed by a noise gate, gain and a clamp to [0, 1].
//!
//! INVARIANT: the emitted level is always in [0, 1]
//! INVARIANT: the filter approaches its target exponentially, never overshoots
//! INVARIANT: gate and gain never feed back into the filter memory

use serde::{Deserialize, Serialize};

/// Envelope follower configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Coefficient used while the target is above the current level, (0, 1]
    pub attack: f32,
    /// Coefficient used while the target is at or below the current level, (0, 1]
    pub decay: f32,
    /// Output gain, > 0
    pub gain: f32,
    /// Noise gate threshold, [0, 1)
    pub gate: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        EnvelopeConfig {
            attack: 0.35,
            decay: 0.18,
            gain: 1.8,
            gate: 0.04,
        }
    }
}

impl EnvelopeConfig {
    /// Snappier mouth for fast, clipped speech
    pub fn responsive() -> Self {
        EnvelopeConfig {
            attack: 0.6,
            decay: 0.35,
            gain: 2.2,
            gate: 0.05,
        }
    }

    /// Slow, soft mouth for calm voices
    pub fn smooth() -> Self {
        EnvelopeConfig {
            attack: 0.2,
            decay: 0.1,
            gain: 3.0,
            gate: 0.03,
        }
    }

    /// Clamp every field into its legal range.
    ///
    /// NaN coefficients become 1.0 (track instantly), a NaN gain becomes 0
    /// and a NaN gate becomes 0.
    pub fn sanitized(&self) -> Self {
        EnvelopeConfig {
            attack: sanitize_coefficient(self.attack),
            decay: sanitize_coefficient(self.decay),
            gain: if self.gain.is_nan() {
                0.0
            } else {
                self.gain.clamp(0.0, f32::MAX)
            },
            gate: if self.gate.is_nan() {
                0.0
            } else {
                self.gate.clamp(0.0, 1.0 - f32::EPSILON)
            },
        }
    }
}

fn sanitize_coefficient(c: f32) -> f32 {
    if c.is_nan() {
        1.0
    } else {
        c.clamp(f32::EPSILON, 1.0)
    }
}

/// Clamp a level into [0, 1]; NaN is silence
#[inline]
pub fn sanitize_level(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-session smoothing state
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnvelopeState {
    /// Last filtered level, pre-gate and pre-gain
    pub current: f32,
}

impl EnvelopeState {
    /// Silent state at the start of a session
    pub const ZERO: EnvelopeState = EnvelopeState { current: 0.0 };

    pub fn new(current: f32) -> Self {
        EnvelopeState {
            current: sanitize_level(current),
        }
    }

    /// Reset to silence
    pub fn reset(&mut self) {
        self.current = 0.0;
    }
}

/// Advance the envelope by one frame.
///
/// Returns the new state and the output level to render. The returned
/// state holds the raw filtered value; gating and gain only shape the
/// output, otherwise a gated signal would freeze the filter at zero.
#[inline]
pub fn step(state: EnvelopeState, target: f32, config: &EnvelopeConfig) -> (EnvelopeState, f32) {
    let config = config.sanitized();
    let current = sanitize_level(state.current);
    let target = sanitize_level(target);

    // Bounding by the target keeps float rounding from stepping past it.
    let next = if target > current {
        (current + (target - current) * config.attack).min(target)
    } else {
        (current + (target - current) * config.decay).max(target)
    };

    let gated = if next < config.gate { 0.0 } else { next };
    let output = sanitize_level(gated * config.gain);

    (EnvelopeState { current: next }, output)
}
