//! In-memory host: graphs, override controllers and rigs held in plain maps.
//!
//! Useful as a reference implementation of the host traits, for tooling that
//! has no engine attached, and for tests. Rigs record every call made on them.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::host::{AnimatorGraph, ControllerRef, LayerDesc, PreviewHost, RigControl};
use crate::ids::{ClipId, GraphId, IdAllocator, OverrideId, RigId, StateId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub id: StateId,
    pub name: String,
    #[serde(default)]
    pub motion: Option<ClipId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryLayer {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub states: Vec<MemoryState>,
    #[serde(default)]
    pub default_state: Option<StateId>,
}

fn default_weight() -> f32 {
    1.0
}

impl MemoryLayer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            weight: 1.0,
            states: Vec::new(),
            default_state: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryGraph {
    #[serde(default)]
    pub layers: Vec<MemoryLayer>,
    #[serde(skip)]
    ids: IdAllocator,
}

impl MemoryGraph {
    pub fn with_layers(names: &[&str]) -> Self {
        Self {
            layers: names.iter().map(|n| MemoryLayer::new(n)).collect(),
            ids: IdAllocator::new(),
        }
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn state(&self, id: StateId) -> Option<&MemoryState> {
        self.layers
            .iter()
            .flat_map(|l| l.states.iter())
            .find(|s| s.id == id)
    }

    fn state_mut(&mut self, id: StateId) -> Option<&mut MemoryState> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.states.iter_mut())
            .find(|s| s.id == id)
    }

    fn fresh_state_id(&mut self) -> StateId {
        loop {
            let id = self.ids.alloc_state();
            if self.state(id).is_none() {
                return id;
            }
        }
    }

    fn out_of_range(&self, index: usize) -> HostError {
        HostError::LayerOutOfRange {
            index,
            count: self.layers.len(),
        }
    }
}

impl AnimatorGraph for MemoryGraph {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_name(&self, index: usize) -> Option<&str> {
        self.layers.get(index).map(|l| l.name.as_str())
    }

    fn add_layer(&mut self, desc: LayerDesc) -> usize {
        self.layers.push(MemoryLayer {
            name: desc.name,
            weight: desc.weight,
            states: Vec::new(),
            default_state: None,
        });
        self.layers.len() - 1
    }

    fn remove_layer(&mut self, index: usize) -> Result<(), HostError> {
        if index >= self.layers.len() {
            return Err(self.out_of_range(index));
        }
        self.layers.remove(index);
        Ok(())
    }

    fn add_state(&mut self, layer: usize, name: &str) -> Result<StateId, HostError> {
        if layer >= self.layers.len() {
            return Err(self.out_of_range(layer));
        }
        let id = self.fresh_state_id();
        self.layers[layer].states.push(MemoryState {
            id,
            name: name.to_string(),
            motion: None,
        });
        Ok(id)
    }

    fn set_default_state(&mut self, layer: usize, state: StateId) -> Result<(), HostError> {
        let err = self.out_of_range(layer);
        let l = self.layers.get_mut(layer).ok_or(err)?;
        if !l.states.iter().any(|s| s.id == state) {
            return Err(HostError::StateNotFound { state: state.0 });
        }
        l.default_state = Some(state);
        Ok(())
    }

    fn default_state(&self, layer: usize) -> Option<StateId> {
        self.layers.get(layer).and_then(|l| l.default_state)
    }

    fn set_state_motion(&mut self, state: StateId, clip: ClipId) -> Result<(), HostError> {
        let s = self
            .state_mut(state)
            .ok_or(HostError::StateNotFound { state: state.0 })?;
        s.motion = Some(clip);
        Ok(())
    }

    fn state_motion(&self, state: StateId) -> Option<ClipId> {
        self.state(state).and_then(|s| s.motion)
    }
}

/// One call observed on a [`MemoryRig`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RigCall {
    SetSpeed(f32),
    Play {
        state: String,
        layer: usize,
        normalized_time: f32,
    },
    Update(f32),
}

/// What the rig currently reports as playing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayHead {
    pub state: Option<String>,
    pub layer: usize,
    pub normalized_time: f32,
    /// Time the rig accumulated on its own since the last `play`.
    pub advanced: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryRig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub controller: Option<ControllerRef>,
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default = "default_weight")]
    pub speed: f32,
    #[serde(skip)]
    pub head: PlayHead,
    #[serde(skip)]
    pub calls: Vec<RigCall>,
}

fn default_valid() -> bool {
    true
}

impl MemoryRig {
    pub fn new(name: &str, controller: ControllerRef) -> Self {
        Self {
            name: name.to_string(),
            controller: Some(controller),
            valid: true,
            speed: 1.0,
            head: PlayHead::default(),
            calls: Vec::new(),
        }
    }

    /// Normalized times of every `play` call, in order.
    pub fn played_times(&self) -> Vec<f32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                RigCall::Play {
                    normalized_time, ..
                } => Some(*normalized_time),
                _ => None,
            })
            .collect()
    }
}

impl RigControl for MemoryRig {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn controller(&self) -> Option<ControllerRef> {
        self.controller
    }

    fn set_speed(&mut self, speed: f32) {
        self.calls.push(RigCall::SetSpeed(speed));
        self.speed = speed;
    }

    fn play(&mut self, state_name: &str, layer: usize, normalized_time: f32) {
        self.calls.push(RigCall::Play {
            state: state_name.to_string(),
            layer,
            normalized_time,
        });
        self.head = PlayHead {
            state: Some(state_name.to_string()),
            layer,
            normalized_time,
            advanced: 0.0,
        };
    }

    fn update(&mut self, dt: f32) {
        self.calls.push(RigCall::Update(dt));
        self.head.advanced += dt * self.speed;
    }
}

/// Serializable description of a whole scene.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SceneDesc {
    #[serde(default)]
    pub graphs: Vec<GraphEntry>,
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
    #[serde(default)]
    pub rigs: Vec<RigEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphEntry {
    pub id: GraphId,
    #[serde(flatten)]
    pub graph: MemoryGraph,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub id: OverrideId,
    pub base: ControllerRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RigEntry {
    pub id: RigId,
    #[serde(flatten)]
    pub rig: MemoryRig,
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    graphs: HashMap<GraphId, MemoryGraph>,
    overrides: HashMap<OverrideId, ControllerRef>,
    rigs: HashMap<RigId, MemoryRig>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scene(scene: SceneDesc) -> Self {
        let mut host = Self::new();
        for entry in scene.graphs {
            host.graphs.insert(entry.id, entry.graph);
        }
        for entry in scene.overrides {
            host.overrides.insert(entry.id, entry.base);
        }
        for entry in scene.rigs {
            host.rigs.insert(entry.id, entry.rig);
        }
        host
    }

    pub fn insert_graph(&mut self, id: GraphId, graph: MemoryGraph) {
        self.graphs.insert(id, graph);
    }

    pub fn insert_override(&mut self, id: OverrideId, base: ControllerRef) {
        self.overrides.insert(id, base);
    }

    pub fn insert_rig(&mut self, id: RigId, rig: MemoryRig) {
        self.rigs.insert(id, rig);
    }

    pub fn memory_graph(&self, id: GraphId) -> Option<&MemoryGraph> {
        self.graphs.get(&id)
    }

    pub fn memory_graph_mut(&mut self, id: GraphId) -> Option<&mut MemoryGraph> {
        self.graphs.get_mut(&id)
    }

    pub fn memory_rig(&self, id: RigId) -> Option<&MemoryRig> {
        self.rigs.get(&id)
    }

    pub fn memory_rig_mut(&mut self, id: RigId) -> Option<&mut MemoryRig> {
        self.rigs.get_mut(&id)
    }

    /// Mark a rig destroyed without removing its record.
    pub fn invalidate_rig(&mut self, id: RigId) {
        if let Some(rig) = self.rigs.get_mut(&id) {
            rig.valid = false;
        }
    }

    /// Drain the call log of a rig.
    pub fn take_calls(&mut self, id: RigId) -> Vec<RigCall> {
        self.rigs
            .get_mut(&id)
            .map(|r| std::mem::take(&mut r.calls))
            .unwrap_or_default()
    }
}

impl PreviewHost for MemoryHost {
    fn rig(&self, id: RigId) -> Option<&dyn RigControl> {
        self.rigs.get(&id).map(|r| r as &dyn RigControl)
    }

    fn rig_mut(&mut self, id: RigId) -> Option<&mut dyn RigControl> {
        self.rigs.get_mut(&id).map(|r| r as &mut dyn RigControl)
    }

    fn graph(&self, id: GraphId) -> Option<&dyn AnimatorGraph> {
        self.graphs.get(&id).map(|g| g as &dyn AnimatorGraph)
    }

    fn graph_mut(&mut self, id: GraphId) -> Option<&mut dyn AnimatorGraph> {
        self.graphs.get_mut(&id).map(|g| g as &mut dyn AnimatorGraph)
    }

    fn override_base(&self, id: OverrideId) -> Option<ControllerRef> {
        self.overrides.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::resolve_base_graph;

    #[test]
    fn graph_layer_and_state_mutation() {
        let mut g = MemoryGraph::with_layers(&["Base"]);
        let idx = g.add_layer(LayerDesc {
            name: "Extra".into(),
            weight: 0.5,
        });
        assert_eq!(idx, 1);
        let s = g.add_state(idx, "Idle").unwrap();
        g.set_default_state(idx, s).unwrap();
        g.set_state_motion(s, ClipId(7)).unwrap();
        assert_eq!(g.default_state(1), Some(s));
        assert_eq!(g.state_motion(s), Some(ClipId(7)));

        assert!(matches!(
            g.add_state(5, "Nope"),
            Err(HostError::LayerOutOfRange { index: 5, count: 2 })
        ));
        g.remove_layer(1).unwrap();
        assert_eq!(g.layer_names(), vec!["Base"]);
        assert!(g.remove_layer(1).is_err());
        assert_eq!(g.state_motion(s), None);
    }

    #[test]
    fn state_ids_skip_existing_ones() {
        let json = r#"{ "layers": [ { "name": "Base", "states": [ { "id": 0, "name": "Idle" } ] } ] }"#;
        let mut g: MemoryGraph = serde_json::from_str(json).unwrap();
        let s = g.add_state(0, "Run").unwrap();
        assert_ne!(s, StateId(0));
    }

    #[test]
    fn rig_accumulates_only_when_speed_and_dt_are_nonzero() {
        let mut rig = MemoryRig::new("r", ControllerRef::Graph(GraphId(1)));
        rig.set_speed(0.0);
        rig.play("S", 1, 0.5);
        rig.update(0.0);
        rig.update(0.1);
        assert_eq!(rig.head.advanced, 0.0);
        rig.set_speed(1.0);
        rig.update(0.25);
        assert_eq!(rig.head.advanced, 0.25);
        assert_eq!(rig.played_times(), vec![0.5]);
    }

    #[test]
    fn override_unwraps_one_level() {
        let mut host = MemoryHost::new();
        host.insert_graph(GraphId(1), MemoryGraph::with_layers(&["Base"]));
        host.insert_override(OverrideId(10), ControllerRef::Graph(GraphId(1)));
        host.insert_override(OverrideId(11), ControllerRef::Override(OverrideId(10)));
        host.insert_rig(
            RigId(1),
            MemoryRig::new("direct", ControllerRef::Graph(GraphId(1))),
        );
        host.insert_rig(
            RigId(2),
            MemoryRig::new("override", ControllerRef::Override(OverrideId(10))),
        );
        host.insert_rig(
            RigId(3),
            MemoryRig::new("nested", ControllerRef::Override(OverrideId(11))),
        );

        assert_eq!(resolve_base_graph(&host, RigId(1)), Some(GraphId(1)));
        assert_eq!(resolve_base_graph(&host, RigId(2)), Some(GraphId(1)));
        assert_eq!(resolve_base_graph(&host, RigId(3)), None);
        assert_eq!(resolve_base_graph(&host, RigId(99)), None);

        host.invalidate_rig(RigId(1));
        assert_eq!(resolve_base_graph(&host, RigId(1)), None);
    }
}
