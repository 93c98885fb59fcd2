//! Notifications emitted by a preview session.
//!
//! Events queue on the session and the caller drains them after each
//! operation or tick. UI resets its own state on [`PreviewEvent::SessionEnded`].

use serde::{Deserialize, Serialize};

use crate::ids::{ClipId, GraphId, RunId};

/// Why a run stopped before reaching the end of the clip.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CancelReason {
    /// `cancel`, `scrub` or session teardown.
    Requested,
    /// A newer `play` replaced it.
    Superseded,
    /// The rig stopped being valid mid-run.
    RigLost,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PreviewEvent {
    SessionStarted {
        graph: GraphId,
        clip: ClipId,
    },
    ClipRebound {
        clip: ClipId,
    },
    PlaybackStarted {
        run: RunId,
    },
    PlaybackPaused {
        run: RunId,
        cursor: f32,
    },
    PlaybackResumed {
        run: RunId,
        cursor: f32,
    },
    PlaybackFinished {
        run: RunId,
    },
    PlaybackCancelled {
        run: RunId,
        reason: CancelReason,
    },
    SessionEnded,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<PreviewEvent>,
}

impl EventQueue {
    #[inline]
    pub fn push(&mut self, event: PreviewEvent) {
        self.events.push(event);
    }

    #[inline]
    pub fn drain(&mut self) -> Vec<PreviewEvent> {
        std::mem::take(&mut self.events)
    }
}
