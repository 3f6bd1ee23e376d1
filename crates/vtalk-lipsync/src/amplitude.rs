//! Amplitude Tap - per-frame loudness of the audio that is playing
//!
//! Loudness is the RMS of the most recent block of time-domain samples,
//! scaled by an empirically tuned factor and clamped to [0, 1]. Readers see
//! the latest measurement only; nothing is queued.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::sanitize_level;

/// Amplitude tap configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Samples per RMS block
    pub block_size: usize,
    /// RMS to target level scale, tuned per voice
    pub level_scale: f32,
}

impl Default for TapConfig {
    fn default() -> Self {
        TapConfig {
            block_size: 1024,
            level_scale: 3.0,
        }
    }
}

impl TapConfig {
    /// Scaled and clamped target level for a raw RMS value
    #[inline]
    pub fn level(&self, rms: f32) -> f32 {
        sanitize_level(rms * self.level_scale)
    }
}

/// RMS of float samples in [-1, 1]. An empty block is silent.
pub fn rms_f32(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block
        .iter()
        .map(|s| {
            let s = if s.is_finite() { *s } else { 0.0 };
            s * s
        })
        .sum();
    (sum / block.len() as f32).sqrt()
}

/// RMS of unsigned 8-bit samples centred on 128
pub fn rms_u8(block: &[u8]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block
        .iter()
        .map(|b| {
            let s = (*b as f32 - 128.0) / 128.0;
            s * s
        })
        .sum();
    (sum / block.len() as f32).sqrt()
}

/// Tap over a decoded mono buffer
#[derive(Clone, Debug)]
pub struct AmplitudeTap {
    samples: Arc<[f32]>,
    sample_rate: u32,
    config: TapConfig,
}

impl AmplitudeTap {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, config: TapConfig) -> Self {
        AmplitudeTap {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            config,
        }
    }

    /// Total playback length
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Target level at a playback position
    pub fn level_at(&self, position: Duration) -> f32 {
        let index = (position.as_secs_f64() * self.sample_rate as f64) as usize;
        self.level_at_sample(index)
    }

    /// Target level for the block ending at `end` (exclusive)
    pub fn level_at_sample(&self, end: usize) -> f32 {
        self.config.level(self.rms_at_sample(end))
    }

    /// Raw RMS for the block ending at `end` (exclusive).
    ///
    /// The window is clipped at the start of the buffer and reads silence
    /// past its end.
    pub fn rms_at_sample(&self, end: usize) -> f32 {
        let block = self.config.block_size.max(1);
        let start = end.saturating_sub(block).min(self.samples.len());
        let stop = end.min(self.samples.len());
        let sum: f32 = self.samples[start..stop]
            .iter()
            .map(|s| if s.is_finite() { s * s } else { 0.0 })
            .sum();
        let len = end - end.saturating_sub(block);
        if len == 0 {
            return 0.0;
        }
        (sum / len as f32).sqrt()
    }
}

/// Create a latest-value amplitude channel
pub fn amplitude_channel() -> (AmplitudePublisher, AmplitudeReader) {
    let (tx, rx) = watch::channel(0.0);
    (AmplitudePublisher { tx }, AmplitudeReader { rx })
}

/// Writing half, owned by the audio tap
#[derive(Debug)]
pub struct AmplitudePublisher {
    tx: watch::Sender<f32>,
}

impl AmplitudePublisher {
    /// Publish the newest measurement, replacing any unread one
    pub fn publish(&self, level: f32) {
        self.tx.send_replace(level);
    }
}

/// Reading half, owned by the frame loop
#[derive(Debug)]
pub struct AmplitudeReader {
    rx: watch::Receiver<f32>,
}

impl AmplitudeReader {
    /// Newest measurement if one arrived since the last poll
    pub fn poll(&mut self) -> Option<f32> {
        match self.rx.has_changed() {
            Ok(true) => Some(*self.rx.borrow_and_update()),
            _ => None,
        }
    }

    /// Has the tap been released?
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}
