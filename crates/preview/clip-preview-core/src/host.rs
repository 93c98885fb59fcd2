//! Collaborator contracts implemented by the embedding application.
//!
//! The graph asset and the rig are owned by the host. The core reaches them
//! through these traits, by id, on every call, and never caches a borrow.

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::ids::{ClipId, GraphId, OverrideId, RigId, StateId};

/// What a rig's controller slot points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ControllerRef {
    /// A mutable graph asset.
    Graph(GraphId),
    /// An override controller layered on top of some base controller.
    Override(OverrideId),
}

/// An animation clip as seen by the preview tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    #[serde(default)]
    pub name: String,
    /// Frames per second.
    pub frame_rate: f32,
    /// Length in seconds.
    pub length: f32,
}

impl Clip {
    pub fn new(id: ClipId, name: &str, frame_rate: f32, length: f32) -> Self {
        Self {
            id,
            name: name.to_string(),
            frame_rate,
            length,
        }
    }

    /// Map a frame index onto normalized clip time. Degenerate clips map to 0.
    pub fn normalized_time_of_frame(&self, frame: u32) -> f32 {
        let total_frames = self.frame_rate * self.length;
        if !total_frames.is_finite() || total_frames <= 0.0 {
            return 0.0;
        }
        frame as f32 / total_frames
    }
}

/// Layer appended to a graph: a name, a blend weight and an empty state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDesc {
    pub name: String,
    pub weight: f32,
}

/// Mutation surface of a layered animation-state graph.
pub trait AnimatorGraph {
    fn layer_count(&self) -> usize;
    fn layer_name(&self, index: usize) -> Option<&str>;

    /// Append a layer with a fresh, empty state machine. Returns its index.
    fn add_layer(&mut self, desc: LayerDesc) -> usize;
    fn remove_layer(&mut self, index: usize) -> Result<(), HostError>;

    fn add_state(&mut self, layer: usize, name: &str) -> Result<StateId, HostError>;
    fn set_default_state(&mut self, layer: usize, state: StateId) -> Result<(), HostError>;
    fn default_state(&self, layer: usize) -> Option<StateId>;

    fn set_state_motion(&mut self, state: StateId, clip: ClipId) -> Result<(), HostError>;
    fn state_motion(&self, state: StateId) -> Option<ClipId>;
}

/// Playback head of a live rig.
pub trait RigControl {
    /// False once the rig has been destroyed or unloaded on the host side.
    fn is_valid(&self) -> bool;
    fn controller(&self) -> Option<ControllerRef>;
    fn set_speed(&mut self, speed: f32);
    /// Direct playback to a named state on a layer at a normalized time.
    fn play(&mut self, state_name: &str, layer: usize, normalized_time: f32);
    /// Evaluate the pose now. `0.0` snaps, a positive delta advances.
    fn update(&mut self, dt: f32);
}

/// Resolves ids to host-owned collaborators.
pub trait PreviewHost {
    fn rig(&self, id: RigId) -> Option<&dyn RigControl>;
    fn rig_mut(&mut self, id: RigId) -> Option<&mut dyn RigControl>;
    fn graph(&self, id: GraphId) -> Option<&dyn AnimatorGraph>;
    fn graph_mut(&mut self, id: GraphId) -> Option<&mut dyn AnimatorGraph>;
    /// The controller an override controller wraps.
    fn override_base(&self, id: OverrideId) -> Option<ControllerRef>;

    /// A rig that exists and still reports itself valid.
    fn live_rig_mut(&mut self, id: RigId) -> Option<&mut dyn RigControl> {
        self.rig_mut(id).filter(|rig| rig.is_valid())
    }
}

/// Resolve the base graph behind a rig's controller.
///
/// One level of override indirection is unwrapped; override graphs are never
/// handed out for mutation, so an override of an override resolves to nothing.
pub fn resolve_base_graph(host: &dyn PreviewHost, rig: RigId) -> Option<GraphId> {
    let rig = host.rig(rig).filter(|r| r.is_valid())?;
    match rig.controller()? {
        ControllerRef::Graph(graph) => Some(graph),
        ControllerRef::Override(id) => match host.override_base(id)? {
            ControllerRef::Graph(graph) => Some(graph),
            ControllerRef::Override(_) => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_maps_to_normalized_time() {
        let clip = Clip::new(ClipId(1), "walk", 30.0, 2.0);
        assert_eq!(clip.normalized_time_of_frame(0), 0.0);
        assert_eq!(clip.normalized_time_of_frame(30), 0.5);
        assert_eq!(clip.normalized_time_of_frame(60), 1.0);
        // Past the end is passed through, not clamped.
        assert_eq!(clip.normalized_time_of_frame(90), 1.5);
    }

    #[test]
    fn degenerate_clip_maps_to_zero() {
        assert_eq!(
            Clip::new(ClipId(1), "empty", 30.0, 0.0).normalized_time_of_frame(10),
            0.0
        );
        assert_eq!(
            Clip::new(ClipId(1), "bad", f32::NAN, 1.0).normalized_time_of_frame(10),
            0.0
        );
    }
}
