//! Playback scheduling for the scratch state.
//!
//! A run walks a normalized cursor from 0 to 1 in fixed steps. The host drives
//! it by calling [`PlaybackScheduler::tick`] once per frame with the real time
//! that elapsed; each tick is a yield point and executes at most one step, and
//! a step only fires once the step interval has passed since the previous one.
//!
//! ```text
//!            play              pause
//!   Idle ──────────▶ Running ◀──────▶ Paused
//!    ▲                  │   resume      │
//!    │     finished /   │ cancel        │ cancel
//!    │     rig lost     ▼               ▼
//!    └──────────── Terminating ◀────────┘
//! ```
//!
//! Each run owns one cancellation token. Cancelling only flips the token; the
//! run observes it on its next tick and returns the scheduler to `Idle`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PreviewConfig;
use crate::events::{CancelReason, EventQueue, PreviewEvent};
use crate::host::PreviewHost;
use crate::ids::{IdAllocator, RunId};
use crate::injector::ScratchTarget;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
    /// Cancellation requested, not yet observed by the run.
    Terminating,
}

impl PlaybackState {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Terminating => "terminating",
        }
    }

    /// A run exists (possibly paused or about to stop).
    #[inline]
    pub fn has_run(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Options for a single run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayOptions {
    /// Rig speed during steps. Also divides the wait between steps.
    pub speed: f32,
}

impl PlayOptions {
    pub fn from_config(cfg: &PreviewConfig) -> Self {
        Self {
            speed: cfg.play_speed,
        }
    }
}

/// What a call to [`PlaybackScheduler::tick`] did.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TickReport {
    Idle,
    /// The step interval has not elapsed yet.
    Waiting,
    Paused,
    Stepped { run: RunId, cursor: f32 },
    Finished { run: RunId },
    Cancelled { run: RunId, reason: CancelReason },
}

#[derive(Debug)]
struct PlaybackRun {
    id: RunId,
    target: ScratchTarget,
    token: CancellationToken,
    cancel_reason: CancelReason,
    /// Increments applied so far; the cursor is `steps * step`.
    steps: u32,
    speed: f32,
    interval: Duration,
    wait_remaining: Duration,
}

#[derive(Debug)]
pub struct PlaybackScheduler {
    ids: IdAllocator,
    step: f32,
    steps_per_run: u32,
    base_interval: Duration,
    default_speed: f32,

    state: PlaybackState,
    run: Option<PlaybackRun>,
}

impl PlaybackScheduler {
    pub fn new(cfg: &PreviewConfig) -> Self {
        Self {
            ids: IdAllocator::new(),
            step: cfg.step,
            steps_per_run: cfg.steps_per_run(),
            base_interval: cfg.step_interval(),
            default_speed: cfg.play_speed,
            state: PlaybackState::Idle,
            run: None,
        }
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline]
    pub fn active_run(&self) -> Option<RunId> {
        self.run.as_ref().map(|r| r.id)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        matches!(self.state, PlaybackState::Paused)
    }

    /// Current normalized cursor of the active run.
    pub fn cursor(&self) -> Option<f32> {
        self.run.as_ref().map(|r| self.cursor_at(r.steps))
    }

    #[inline]
    fn cursor_at(&self, steps: u32) -> f32 {
        steps as f32 * self.step
    }

    /// Freeze the rig on the scratch state at `normalized_time`.
    ///
    /// The value is passed through unclamped. Returns false if the rig is gone.
    pub fn scrub(
        &self,
        host: &mut dyn PreviewHost,
        target: &ScratchTarget,
        normalized_time: f32,
    ) -> bool {
        let Some(rig) = host.live_rig_mut(target.rig) else {
            return false;
        };
        rig.set_speed(0.0);
        rig.play(&target.state_name, target.layer, normalized_time);
        rig.update(0.0);
        trace!(normalized_time, layer = target.layer, "scrubbed scratch state");
        true
    }

    /// Start a run from cursor 0, replacing any run already in flight.
    ///
    /// The first step is pushed immediately; later steps happen on `tick`.
    pub fn play(
        &mut self,
        host: &mut dyn PreviewHost,
        target: ScratchTarget,
        opts: PlayOptions,
        events: &mut EventQueue,
    ) -> TickReport {
        if let Some(previous) = self.run.as_mut() {
            previous.cancel_reason = CancelReason::Superseded;
            previous.token.cancel();
            self.finish_cancelled(events);
        }

        let speed = if opts.speed.is_finite() && opts.speed > 0.0 {
            opts.speed
        } else {
            self.default_speed
        };
        // Tiny speeds overflow Duration; such a run just never reaches its next step.
        let interval =
            Duration::try_from_secs_f64(self.base_interval.as_secs_f64() / f64::from(speed))
                .unwrap_or(Duration::MAX);
        let id = self.ids.alloc_run();
        self.run = Some(PlaybackRun {
            id,
            target,
            token: CancellationToken::new(),
            cancel_reason: CancelReason::Requested,
            steps: 0,
            speed,
            interval,
            wait_remaining: Duration::ZERO,
        });
        self.state = PlaybackState::Running;
        events.push(PreviewEvent::PlaybackStarted { run: id });
        debug!(run = ?id, speed, ?interval, "playback started");

        self.push_step(host, events)
    }

    pub fn pause(&mut self, events: &mut EventQueue) -> bool {
        if self.state != PlaybackState::Running {
            return false;
        }
        let Some(run) = self.run.as_ref() else {
            return false;
        };
        let cursor = self.cursor_at(run.steps);
        events.push(PreviewEvent::PlaybackPaused {
            run: run.id,
            cursor,
        });
        debug!(run = ?run.id, cursor, "playback paused");
        self.state = PlaybackState::Paused;
        true
    }

    pub fn resume(&mut self, events: &mut EventQueue) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        let Some(run) = self.run.as_ref() else {
            return false;
        };
        let cursor = self.cursor_at(run.steps);
        events.push(PreviewEvent::PlaybackResumed {
            run: run.id,
            cursor,
        });
        debug!(run = ?run.id, cursor, "playback resumed");
        self.state = PlaybackState::Running;
        true
    }

    /// Request termination of the active run; observed on the next tick.
    pub fn cancel(&mut self) -> bool {
        let Some(run) = self.run.as_ref() else {
            return false;
        };
        run.token.cancel();
        self.state = PlaybackState::Terminating;
        debug!(run = ?run.id, "playback cancellation requested");
        true
    }

    /// Cancel and finalize immediately. Used when the caller takes time
    /// ownership back (scrub) or the session goes away.
    pub fn abort(&mut self, events: &mut EventQueue) -> bool {
        if !self.cancel() {
            return false;
        }
        self.finish_cancelled(events);
        true
    }

    /// Advance the active run by `elapsed` real time.
    pub fn tick(
        &mut self,
        host: &mut dyn PreviewHost,
        elapsed: Duration,
        events: &mut EventQueue,
    ) -> TickReport {
        let Some(run) = self.run.as_mut() else {
            return TickReport::Idle;
        };

        if run.token.is_cancelled() {
            return self.finish_cancelled(events);
        }
        if host.live_rig_mut(run.target.rig).is_none() {
            run.cancel_reason = CancelReason::RigLost;
            run.token.cancel();
            return self.finish_cancelled(events);
        }
        if self.state == PlaybackState::Paused {
            return TickReport::Paused;
        }

        run.wait_remaining = run.wait_remaining.saturating_sub(elapsed);
        if !run.wait_remaining.is_zero() {
            return TickReport::Waiting;
        }

        run.steps += 1;
        if run.steps >= self.steps_per_run {
            return self.finish_completed(events);
        }
        self.push_step(host, events)
    }

    /// Direct the rig to the current cursor and let it advance for one interval.
    fn push_step(&mut self, host: &mut dyn PreviewHost, events: &mut EventQueue) -> TickReport {
        let Some(run) = self.run.as_mut() else {
            return TickReport::Idle;
        };
        let cursor = run.steps as f32 * self.step;
        let Some(rig) = host.live_rig_mut(run.target.rig) else {
            run.cancel_reason = CancelReason::RigLost;
            run.token.cancel();
            return self.finish_cancelled(events);
        };

        rig.set_speed(run.speed);
        rig.play(&run.target.state_name, run.target.layer, cursor);
        rig.update(run.interval.as_secs_f32());
        run.wait_remaining = run.interval;
        trace!(run = ?run.id, cursor, "playback step");

        TickReport::Stepped {
            run: run.id,
            cursor,
        }
    }

    fn finish_completed(&mut self, events: &mut EventQueue) -> TickReport {
        self.state = PlaybackState::Idle;
        let Some(run) = self.run.take() else {
            return TickReport::Idle;
        };
        events.push(PreviewEvent::PlaybackFinished { run: run.id });
        debug!(run = ?run.id, "playback finished");
        TickReport::Finished { run: run.id }
    }

    fn finish_cancelled(&mut self, events: &mut EventQueue) -> TickReport {
        self.state = PlaybackState::Idle;
        let Some(run) = self.run.take() else {
            return TickReport::Idle;
        };
        let reason = run.cancel_reason;
        events.push(PreviewEvent::PlaybackCancelled {
            run: run.id,
            reason,
        });
        debug!(run = ?run.id, ?reason, "playback cancelled");
        TickReport::Cancelled {
            run: run.id,
            reason,
        }
    }
}
