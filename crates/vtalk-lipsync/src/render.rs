//! Offline mouth tracks
//!
//! Runs the same session path as live playback over a whole buffer, one
//! step per video frame. Useful for clients that cannot analyse audio
//! themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vtalk_core::VtalkResult;

use crate::{
    AmplitudeTap, DecodedAudio, EnvelopeConfig, FrameLoopConfig, LipSyncDriver, ParamRange,
    ParamResolution, TapConfig,
};

/// Mouth levels for a whole clip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MouthTrack {
    pub fps: f32,
    /// One level in [0, 1] per frame
    pub levels: Vec<f32>,
}

impl MouthTrack {
    /// Frames with the mouth visibly open
    pub fn open_frames(&self) -> usize {
        self.levels.iter().filter(|l| **l > 0.0).count()
    }

    pub fn peak(&self) -> f32 {
        self.levels.iter().copied().fold(0.0, f32::max)
    }
}

/// Render a mouth track for decoded audio
pub fn render_track(
    audio: &DecodedAudio,
    frames: FrameLoopConfig,
    tap: TapConfig,
    envelope: &EnvelopeConfig,
) -> VtalkResult<MouthTrack> {
    frames.period()?;
    let fps = frames.fps as f64;
    let tap = AmplitudeTap::new(audio.samples.as_slice(), audio.sample_rate, tap);
    let duration = tap.duration();
    let count = (duration.as_secs_f64() * fps).ceil() as usize;

    let mut driver = LipSyncDriver::new();
    driver.start(
        ParamResolution::Found(crate::DEFAULT_MOUTH_PARAM.into()),
        ParamRange::default(),
    );

    let mut levels = Vec::with_capacity(count);
    for i in 0..count {
        // Each frame reads the block that has just finished playing.
        let position = Duration::from_secs_f64((i + 1) as f64 / fps).min(duration);
        let target = tap.level_at(position);
        if let Some(frame) = driver.frame(Some(target), envelope) {
            levels.push(frame.level);
        }
    }
    driver.stop();

    tracing::debug!(
        frames = levels.len(),
        duration_ms = duration.as_millis() as u64,
        "mouth track rendered"
    );
    Ok(MouthTrack {
        fps: frames.fps,
        levels,
    })
}
