//! Frame Loop - drives one lip-sync session at display rate
//!
//! Each tick:
//! 1. Take the newest amplitude sample (or reuse the last one)
//! 2. Read the newest envelope config
//! 3. Step the session
//! 4. Write the mouth value to the sink
//!
//! The filter writes before the renderer reads within a tick. Stopping a
//! loop awaits its task, so no step runs once `stop` returns.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vtalk_core::{SessionId, VtalkError, VtalkResult};

use crate::{AmplitudeReader, EnvelopeConfig, LipSyncDriver, ParamRange, ParamResolution};

/// Receives mouth values for the rendered model
pub trait ParameterSink: Send + 'static {
    /// Write a parameter value for the current frame
    fn set_parameter(&mut self, name: &str, value: f32);
}

/// Frame loop configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameLoopConfig {
    /// Frames per second
    pub fps: f32,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        FrameLoopConfig { fps: 60.0 }
    }
}

impl FrameLoopConfig {
    /// Tick period. Rejects rates whose period is not a representable
    /// `Duration`.
    pub fn period(&self) -> VtalkResult<Duration> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(VtalkError::InvalidFrameRate(self.fps));
        }
        Duration::try_from_secs_f64(1.0 / self.fps as f64)
            .map_err(|_| VtalkError::InvalidFrameRate(self.fps))
    }
}

/// Summary of a finished loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameLoopStats {
    /// Ticks that stepped the filter
    pub frames: u64,
    /// Ticks that reused the previous sample
    pub reused_samples: u64,
}

/// Handle to a running frame loop
pub struct FrameLoop<S> {
    session: SessionId,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<(S, FrameLoopStats)>,
}

impl<S: ParameterSink> FrameLoop<S> {
    /// Spawn a loop for a session already started on `driver`.
    ///
    /// The loop ends on its own when the amplitude publisher is dropped.
    pub fn spawn(
        config: FrameLoopConfig,
        mut driver: LipSyncDriver,
        mut amplitude: AmplitudeReader,
        envelope: watch::Receiver<EnvelopeConfig>,
        mut sink: S,
    ) -> VtalkResult<Self> {
        let period = config.period()?;
        let (session, parameter, range) = match driver.session() {
            Some(s) => (s.id(), s.parameter().clone(), s.range()),
            None => return Err(VtalkError::NoActiveSession),
        };
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut stats = FrameLoopStats::default();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    _ = interval.tick() => {
                        let sample = amplitude.poll();
                        if sample.is_none() && amplitude.is_closed() {
                            tracing::debug!(%session, "amplitude tap closed, ending frame loop");
                            break;
                        }
                        let config = *envelope.borrow();
                        let Some(frame) = driver.frame(sample, &config) else {
                            break;
                        };
                        if sample.is_none() {
                            stats.reused_samples += 1;
                        }
                        stats.frames += 1;
                        sink.set_parameter(&frame.parameter, frame.value);
                    }
                }
            }

            driver.stop();
            sink.set_parameter(&parameter, range.rest());
            (sink, stats)
        });

        tracing::debug!(%session, fps = config.fps, "frame loop spawned");
        Ok(FrameLoop {
            session,
            cancel: Some(cancel_tx),
            task,
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Has the loop ended on its own?
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    ///
    /// Returns the sink and loop statistics. Audio resources may be
    /// released once this returns.
    pub async fn stop(mut self) -> VtalkResult<(S, FrameLoopStats)> {
        if let Some(cancel) = self.cancel.take() {
            // The task may already have exited.
            let _ = cancel.send(());
        }
        let session = self.session;
        let (sink, stats) = self
            .task
            .await
            .map_err(|e| VtalkError::FrameLoop(e.to_string()))?;
        tracing::debug!(%session, frames = stats.frames, "frame loop stopped");
        Ok((sink, stats))
    }
}

/// Sink shared between a controller and the loops it spawns
pub type SharedSink<S> = Arc<Mutex<S>>;

impl<S: ParameterSink> ParameterSink for SharedSink<S> {
    fn set_parameter(&mut self, name: &str, value: f32) {
        self.lock().set_parameter(name, value);
    }
}

/// Runs at most one frame loop for a model at a time.
///
/// The controller keeps its own handle on the sink, so a loop that dies
/// mid-playback never takes the sink with it.
pub struct PlaybackController<S> {
    config: FrameLoopConfig,
    resolution: ParamResolution,
    range: ParamRange,
    envelope: watch::Receiver<EnvelopeConfig>,
    active: Option<FrameLoop<SharedSink<S>>>,
    sink: SharedSink<S>,
    last_session: SessionId,
    last_stats: FrameLoopStats,
}

impl<S: ParameterSink> PlaybackController<S> {
    pub fn new(
        config: FrameLoopConfig,
        resolution: ParamResolution,
        range: ParamRange,
        envelope: watch::Receiver<EnvelopeConfig>,
        sink: S,
    ) -> Self {
        if resolution.is_fallback() {
            tracing::warn!(parameter = %resolution, "lip-sync driving an unverified parameter");
        }
        PlaybackController {
            config,
            resolution,
            range,
            envelope,
            active: None,
            sink: Arc::new(Mutex::new(sink)),
            last_session: SessionId::ZERO,
            last_stats: FrameLoopStats::default(),
        }
    }

    /// Start playback-driven lip-sync, stopping any loop still running.
    ///
    /// A previous loop that failed is logged and replaced.
    pub async fn start(&mut self, amplitude: AmplitudeReader) -> VtalkResult<SessionId> {
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "previous frame loop ended abnormally");
        }
        self.config.period()?;

        let mut driver = LipSyncDriver::starting_after(self.last_session);
        let id = driver.start(self.resolution.clone(), self.range);
        self.last_session = id;

        let frame_loop = FrameLoop::spawn(
            self.config,
            driver,
            amplitude,
            self.envelope.clone(),
            Arc::clone(&self.sink),
        )?;
        self.active = Some(frame_loop);
        Ok(id)
    }

    /// Stop the running loop, if any. Safe before, during or after playback.
    ///
    /// If the loop task failed, the mouth is still rested and the error is
    /// returned; the controller stays usable.
    pub async fn stop(&mut self) -> VtalkResult<Option<SessionId>> {
        let Some(frame_loop) = self.active.take() else {
            return Ok(None);
        };
        let id = frame_loop.session();
        match frame_loop.stop().await {
            Ok((_, stats)) => {
                self.last_stats = stats;
                Ok(Some(id))
            }
            Err(e) => {
                self.last_stats = FrameLoopStats::default();
                self.sink
                    .lock()
                    .set_parameter(self.resolution.name(), self.range.rest());
                Err(e)
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Statistics of the last stopped loop
    pub fn last_stats(&self) -> FrameLoopStats {
        self.last_stats
    }

    /// Sink the loops write to
    pub fn sink(&self) -> &SharedSink<S> {
        &self.sink
    }
}
