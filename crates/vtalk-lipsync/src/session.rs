//! Lip-sync sessions and the single-session driver
//!
//! A session owns the envelope state for one playback. The driver owns at
//! most one session at a time, so two filters can never drive the same
//! mouth parameter.

use std::sync::Arc;

use vtalk_core::SessionId;

use crate::{step, EnvelopeConfig, EnvelopeState, ParamRange, ParamResolution};

/// One frame of mouth output
#[derive(Clone, Debug, PartialEq)]
pub struct MouthFrame {
    /// Session that produced the frame
    pub session: SessionId,
    /// Model parameter to write
    pub parameter: Arc<str>,
    /// Gated, scaled level in [0, 1]
    pub level: f32,
    /// Level mapped onto the parameter range
    pub value: f32,
}

/// Per-playback lip-sync state
#[derive(Debug)]
pub struct LipSyncSession {
    id: SessionId,
    resolution: ParamResolution,
    parameter: Arc<str>,
    range: ParamRange,
    state: EnvelopeState,
    /// Last amplitude target, reused when a frame has no new sample
    last_target: f32,
    frames: u64,
    active: bool,
}

impl LipSyncSession {
    /// Create a session starting from silence
    pub fn create(id: SessionId, resolution: ParamResolution, range: ParamRange) -> Self {
        let parameter: Arc<str> = Arc::from(resolution.name());
        LipSyncSession {
            id,
            resolution,
            parameter,
            range,
            state: EnvelopeState::ZERO,
            last_target: 0.0,
            frames: 0,
            active: true,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn resolution(&self) -> &ParamResolution {
        &self.resolution
    }

    pub fn parameter(&self) -> &Arc<str> {
        &self.parameter
    }

    pub fn range(&self) -> ParamRange {
        self.range
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Frames stepped so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Step the filter toward `target`. Returns `None` once disposed.
    pub fn step(&mut self, target: f32, config: &EnvelopeConfig) -> Option<MouthFrame> {
        if !self.active {
            return None;
        }
        self.last_target = target;
        let (state, level) = step(self.state, target, config);
        self.state = state;
        self.frames += 1;

        Some(MouthFrame {
            session: self.id,
            parameter: Arc::clone(&self.parameter),
            level,
            value: self.range.map(level),
        })
    }

    /// Step with the newest sample, or the previous one if none arrived
    pub fn frame(&mut self, sample: Option<f32>, config: &EnvelopeConfig) -> Option<MouthFrame> {
        let target = sample.unwrap_or(self.last_target);
        self.step(target, config)
    }

    /// End the session and discard its state. Idempotent.
    pub fn dispose(&mut self) {
        if self.active {
            tracing::debug!(session = %self.id, frames = self.frames, "lip-sync session disposed");
        }
        self.active = false;
        self.state.reset();
        self.last_target = 0.0;
    }
}

/// Owns at most one active lip-sync session
#[derive(Debug, Default)]
pub struct LipSyncDriver {
    session: Option<LipSyncSession>,
    last_id: SessionId,
}

impl LipSyncDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver whose first session id follows `last`
    pub fn starting_after(last: SessionId) -> Self {
        LipSyncDriver {
            session: None,
            last_id: last,
        }
    }

    /// Start a new session, force-cancelling any session still running
    pub fn start(&mut self, resolution: ParamResolution, range: ParamRange) -> SessionId {
        if let Some(previous) = self.stop() {
            tracing::debug!(session = %previous, "previous lip-sync session force-cancelled");
        }

        self.last_id = self.last_id.next();
        let session = LipSyncSession::create(self.last_id, resolution, range);
        tracing::debug!(
            session = %session.id(),
            parameter = %session.resolution(),
            "lip-sync session started"
        );
        self.session = Some(session);
        self.last_id
    }

    /// Advance the active session by one frame
    pub fn frame(&mut self, sample: Option<f32>, config: &EnvelopeConfig) -> Option<MouthFrame> {
        self.session.as_mut()?.frame(sample, config)
    }

    /// Stop the active session. Safe to call at any time.
    pub fn stop(&mut self) -> Option<SessionId> {
        let mut session = self.session.take()?;
        session.dispose();
        Some(session.id())
    }

    pub fn session(&self) -> Option<&LipSyncSession> {
        self.session.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }
}
