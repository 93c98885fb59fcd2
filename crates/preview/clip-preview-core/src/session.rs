//! Preview session: the context object every operation goes through.
//!
//! A session owns the graph injector, the playback scheduler, the lifecycle
//! guard and the event queue for one preview panel. Several sessions can
//! exist side by side as long as they target different graphs.

use std::time::Duration;

use tracing::{debug, info_span};

use crate::config::PreviewConfig;
use crate::error::Result;
use crate::events::{EventQueue, PreviewEvent};
use crate::host::{resolve_base_graph, Clip, PreviewHost};
use crate::ids::{RigId, RunId, SessionId};
use crate::injector::{GraphInjector, InjectOutcome, RemoveOutcome, ScratchTarget, SkipReason};
use crate::lifecycle::{HostSignal, LifecycleGuard, LifecycleHub};
use crate::scheduler::{PlayOptions, PlaybackScheduler, PlaybackState, TickReport};

#[derive(Debug)]
pub struct PreviewSession {
    id: SessionId,
    cfg: PreviewConfig,
    hub: LifecycleHub,
    guard: Option<LifecycleGuard>,
    target: Option<RigId>,
    injector: GraphInjector,
    scheduler: PlaybackScheduler,
    events: EventQueue,
}

impl PreviewSession {
    /// Create a session context. The config is validated up front.
    pub fn new(cfg: PreviewConfig, hub: LifecycleHub) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            id: SessionId::new(),
            injector: GraphInjector::new(&cfg),
            scheduler: PlaybackScheduler::new(&cfg),
            cfg,
            hub,
            guard: None,
            target: None,
            events: EventQueue::default(),
        })
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &PreviewConfig {
        &self.cfg
    }

    #[inline]
    pub fn target(&self) -> Option<RigId> {
        self.target
    }

    #[inline]
    pub fn injector(&self) -> &GraphInjector {
        &self.injector
    }

    #[inline]
    pub fn playback_state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    #[inline]
    pub fn active_run(&self) -> Option<RunId> {
        self.scheduler.active_run()
    }

    #[inline]
    pub fn cursor(&self) -> Option<f32> {
        self.scheduler.cursor()
    }

    /// Whether this session holds a lifecycle registration.
    #[inline]
    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// Derived from the graph shape, never from a stored flag.
    pub fn is_active(&self, host: &dyn PreviewHost) -> bool {
        self.injector.is_active(host)
    }

    pub fn drain_events(&mut self) -> Vec<PreviewEvent> {
        self.events.drain()
    }

    /// Start previewing `clip` on `rig`, or rebind the clip if a preview is
    /// already running against the same graph.
    pub fn start_session(
        &mut self,
        host: &mut dyn PreviewHost,
        clip: Option<&Clip>,
        rig: Option<RigId>,
    ) -> Result<InjectOutcome> {
        let Some(clip) = clip else {
            return Ok(InjectOutcome::Skipped(SkipReason::MissingClip));
        };
        let Some(rig) = rig else {
            return Ok(InjectOutcome::Skipped(SkipReason::MissingRig));
        };
        let _span = info_span!("start_session", session = %self.id, ?rig).entered();

        // Moving to another graph is a full teardown of the current region.
        let next_graph = resolve_base_graph(&*host, rig);
        if let (Some(current), Some(next)) = (self.injector.graph(), next_graph) {
            if current != next {
                debug!(?current, ?next, "retargeting session to another graph");
                if let RemoveOutcome::ForeignLayer { .. } = self.end_session(host)? {
                    return Ok(InjectOutcome::Skipped(SkipReason::ForeignLayer));
                }
            }
        }

        let outcome = self.injector.inject(host, clip, rig)?;
        match outcome {
            InjectOutcome::Injected { graph, .. } => {
                // A run aimed at a previous region has nothing left to drive.
                self.scheduler.abort(&mut self.events);
                self.target = Some(rig);
                self.events.push(PreviewEvent::SessionStarted {
                    graph,
                    clip: clip.id,
                });
            }
            InjectOutcome::Reused { .. } => {
                if self.target != Some(rig) {
                    self.scheduler.abort(&mut self.events);
                }
                self.target = Some(rig);
                self.events.push(PreviewEvent::ClipRebound { clip: clip.id });
            }
            InjectOutcome::Skipped(reason) => {
                debug!(?reason, "start request skipped");
                return Ok(outcome);
            }
        }

        if self.guard.is_none() {
            self.guard = Some(self.hub.acquire());
        }
        Ok(outcome)
    }

    /// Tear the preview down and restore the graph. Safe to call repeatedly.
    pub fn end_session(&mut self, host: &mut dyn PreviewHost) -> Result<RemoveOutcome> {
        let _span = info_span!("end_session", session = %self.id).entered();
        let outcome = self.injector.remove(host, self.target)?;
        if matches!(outcome, RemoveOutcome::ForeignLayer { .. }) {
            return Ok(outcome);
        }

        self.scheduler.abort(&mut self.events);
        self.guard = None;
        self.target = None;
        if matches!(outcome, RemoveOutcome::Removed { .. }) {
            self.events.push(PreviewEvent::SessionEnded);
            debug!("session ended");
        }
        Ok(outcome)
    }

    fn scratch_target(&self, host: &dyn PreviewHost) -> Option<ScratchTarget> {
        let rig = self.target?;
        self.injector.target(host, rig)
    }

    /// Freeze the rig on the scratch state at `normalized_time`.
    ///
    /// Takes time ownership back from an active run. Returns false when no
    /// session is active or the rig is gone.
    pub fn scrub(&mut self, host: &mut dyn PreviewHost, normalized_time: f32) -> bool {
        let Some(target) = self.scratch_target(&*host) else {
            return false;
        };
        self.scheduler.abort(&mut self.events);
        self.scheduler.scrub(host, &target, normalized_time)
    }

    /// Scrub to a frame of `clip`, converted with the clip's frame rate and length.
    pub fn scrub_frame(&mut self, host: &mut dyn PreviewHost, frame: u32, clip: &Clip) -> bool {
        self.scrub(host, clip.normalized_time_of_frame(frame))
    }

    /// Start a run at the configured speed.
    pub fn play(&mut self, host: &mut dyn PreviewHost) -> Option<RunId> {
        let opts = PlayOptions::from_config(&self.cfg);
        self.play_with(host, opts)
    }

    /// Start a run, replacing any run in flight. `None` if no session is active.
    pub fn play_with(&mut self, host: &mut dyn PreviewHost, opts: PlayOptions) -> Option<RunId> {
        let target = self.scratch_target(&*host)?;
        match self.scheduler.play(host, target, opts, &mut self.events) {
            TickReport::Stepped { run, .. } => Some(run),
            _ => None,
        }
    }

    pub fn pause(&mut self) -> bool {
        self.scheduler.pause(&mut self.events)
    }

    pub fn resume(&mut self) -> bool {
        self.scheduler.resume(&mut self.events)
    }

    /// Request the active run to stop; it does so on the next tick.
    pub fn cancel(&mut self) -> bool {
        self.scheduler.cancel()
    }

    /// Handle pending lifecycle signals. Any of them ends the session.
    pub fn pump_signals(&mut self, host: &mut dyn PreviewHost) -> Result<Option<HostSignal>> {
        let Some(guard) = self.guard.as_ref() else {
            return Ok(None);
        };
        let Some(signal) = guard.take_signals().into_iter().next() else {
            return Ok(None);
        };
        debug!(session = %self.id, ?signal, "host lifecycle signal, ending session");
        self.end_session(host)?;
        Ok(Some(signal))
    }

    /// Per-frame entry point: services lifecycle signals, then advances playback.
    pub fn tick(&mut self, host: &mut dyn PreviewHost, elapsed: Duration) -> Result<TickReport> {
        if self.pump_signals(host)?.is_some() {
            return Ok(TickReport::Idle);
        }
        Ok(self.scheduler.tick(host, elapsed, &mut self.events))
    }
}
