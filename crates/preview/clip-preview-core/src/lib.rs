//! Clip preview core (engine-agnostic)
//!
//! Previews a single animation clip on a live rig without permanently editing
//! the rig's animation graph. A session injects a reserved scratch layer and
//! default state into the rig's base graph, drives that state's time either by
//! scrubbing or by a cancellable, pausable stepped run, and removes the layer
//! again on teardown, host run-mode entry or host shutdown.
//!
//! Hosts implement the traits in [`host`]; [`memory::MemoryHost`] is a
//! complete in-memory implementation.

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod ids;
pub mod injector;
pub mod lifecycle;
pub mod memory;
pub mod scheduler;
pub mod session;

// Re-exports for hosts and adapters
pub use config::PreviewConfig;
pub use error::{HostError, PreviewError};
pub use events::{CancelReason, PreviewEvent};
pub use host::{
    resolve_base_graph, AnimatorGraph, Clip, ControllerRef, LayerDesc, PreviewHost, RigControl,
};
pub use ids::{ClipId, GraphId, OverrideId, RigId, RunId, SessionId, StateId};
pub use injector::{GraphInjector, InjectOutcome, RemoveOutcome, ScratchTarget, SkipReason};
pub use lifecycle::{HostSignal, LifecycleGuard, LifecycleHub};
pub use memory::{MemoryGraph, MemoryHost, MemoryRig, RigCall, SceneDesc};
pub use scheduler::{PlayOptions, PlaybackScheduler, PlaybackState, TickReport};
pub use session::PreviewSession;
