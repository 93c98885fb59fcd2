//! Scratch region injection into a host-owned animation graph.
//!
//! The injector appends one reserved layer (with one reserved default state)
//! on top of the rig's base graph and removes it again on teardown. Whether a
//! scratch region is present is always re-derived from the graph itself: the
//! live layer count must exceed the recorded baseline and the topmost layer
//! must carry the reserved name. No separate "active" flag is kept.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::host::{resolve_base_graph, AnimatorGraph, Clip, LayerDesc, PreviewHost};
use crate::ids::{GraphId, RigId, StateId};

/// Why a start request did nothing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingClip,
    MissingRig,
    /// The rig has no controller, an unresolvable override, or its graph is gone.
    GraphUnresolved,
    /// A layer this injector did not create blocks the region it owns.
    ForeignLayer,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InjectOutcome {
    /// A new scratch layer was appended at `layer`.
    Injected { graph: GraphId, layer: usize },
    /// An existing scratch layer was rebound to the new clip.
    Reused { graph: GraphId, layer: usize },
    Skipped(SkipReason),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RemoveOutcome {
    Removed { graph: GraphId },
    /// Nothing to remove.
    NotActive,
    /// The topmost layer is not ours; the graph was left untouched.
    ForeignLayer { found: String },
}

/// Where playback has to be directed to hit the scratch state.
#[derive(Clone, Debug, PartialEq)]
pub struct ScratchTarget {
    pub rig: RigId,
    pub layer: usize,
    pub state_name: String,
}

#[derive(Debug)]
pub struct GraphInjector {
    layer_name: String,
    state_name: String,
    layer_weight: f32,
    rest_speed: f32,

    graph: Option<GraphId>,
    rig: Option<RigId>,
    baseline_layer_count: usize,
    scratch_state: Option<StateId>,
}

impl GraphInjector {
    pub fn new(cfg: &PreviewConfig) -> Self {
        Self {
            layer_name: cfg.scratch_layer_name.clone(),
            state_name: cfg.scratch_state_name.clone(),
            layer_weight: cfg.scratch_layer_weight,
            rest_speed: cfg.play_speed,
            graph: None,
            rig: None,
            baseline_layer_count: 0,
            scratch_state: None,
        }
    }

    #[inline]
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    #[inline]
    pub fn baseline_layer_count(&self) -> usize {
        self.baseline_layer_count
    }

    #[inline]
    pub fn scratch_state(&self) -> Option<StateId> {
        self.scratch_state
    }

    #[inline]
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// True when our scratch layer sits on top of the recorded graph.
    pub fn is_active(&self, host: &dyn PreviewHost) -> bool {
        let Some(graph) = self.graph.and_then(|id| host.graph(id)) else {
            return false;
        };
        self.region_present(graph, self.baseline_layer_count)
    }

    fn region_present(&self, graph: &dyn AnimatorGraph, baseline: usize) -> bool {
        let count = graph.layer_count();
        count > baseline
            && graph
                .layer_name(count - 1)
                .is_some_and(|name| name == self.layer_name)
    }

    /// Playback target for the scratch state on `rig`, if the region exists.
    pub fn target(&self, host: &dyn PreviewHost, rig: RigId) -> Option<ScratchTarget> {
        if !self.is_active(host) {
            return None;
        }
        Some(ScratchTarget {
            rig,
            layer: self.baseline_layer_count,
            state_name: self.state_name.clone(),
        })
    }

    /// Establish (or reuse) the scratch region for `rig` and bind `clip` to it.
    pub fn inject(
        &mut self,
        host: &mut dyn PreviewHost,
        clip: &Clip,
        rig: RigId,
    ) -> Result<InjectOutcome> {
        let Some(graph_id) = resolve_base_graph(&*host, rig) else {
            return Ok(InjectOutcome::Skipped(SkipReason::GraphUnresolved));
        };

        // Retargeting to another graph restores the previous one first.
        if let Some(previous) = self.graph.filter(|g| *g != graph_id) {
            debug!(graph = ?previous, "leaving previous graph before retargeting");
            if let RemoveOutcome::ForeignLayer { .. } = self.remove(host, self.rig)? {
                // Keep tracking the old region so a later teardown can finish.
                return Ok(InjectOutcome::Skipped(SkipReason::ForeignLayer));
            }
        }

        let Some(graph) = host.graph_mut(graph_id) else {
            return Ok(InjectOutcome::Skipped(SkipReason::GraphUnresolved));
        };

        let count = graph.layer_count();
        let reuse_layer = if self.graph == Some(graph_id) && count > self.baseline_layer_count {
            // Our layer sits at the baseline index even if something was stacked on it.
            let baseline = self.baseline_layer_count;
            if graph.layer_name(baseline) != Some(self.layer_name.as_str()) {
                warn!(
                    graph = ?graph_id,
                    layer = baseline,
                    "scratch layer was displaced; not injecting a second one"
                );
                return Ok(InjectOutcome::Skipped(SkipReason::ForeignLayer));
            }
            Some(baseline)
        } else if count > 0 && self.region_present(graph, count - 1) {
            // Left behind by an earlier session against the same graph.
            Some(count - 1)
        } else {
            None
        };

        let outcome = match reuse_layer {
            Some(layer) => {
                let state = graph
                    .default_state(layer)
                    .ok_or(PreviewError::StateMissing { layer })?;
                graph.set_state_motion(state, clip.id)?;
                self.graph = Some(graph_id);
                self.rig = Some(rig);
                self.baseline_layer_count = layer;
                self.scratch_state = Some(state);
                debug!(graph = ?graph_id, layer, clip = ?clip.id, "rebound scratch state");
                InjectOutcome::Reused {
                    graph: graph_id,
                    layer,
                }
            }
            None => {
                let layer = graph.add_layer(LayerDesc {
                    name: self.layer_name.clone(),
                    weight: self.layer_weight,
                });
                let state = match Self::populate_layer(graph, layer, &self.state_name, clip) {
                    Ok(state) => state,
                    Err(err) => {
                        // Never leave a half-built layer behind.
                        graph.remove_layer(layer)?;
                        return Err(err);
                    }
                };
                self.graph = Some(graph_id);
                self.rig = Some(rig);
                self.baseline_layer_count = count;
                self.scratch_state = Some(state);
                debug!(
                    graph = ?graph_id,
                    layer,
                    baseline = count,
                    clip = ?clip.id,
                    "injected scratch layer"
                );
                InjectOutcome::Injected {
                    graph: graph_id,
                    layer,
                }
            }
        };

        if let Some(rig) = host.live_rig_mut(rig) {
            rig.update(0.0);
        }
        Ok(outcome)
    }

    fn populate_layer(
        graph: &mut dyn AnimatorGraph,
        layer: usize,
        state_name: &str,
        clip: &Clip,
    ) -> Result<StateId> {
        let state = graph.add_state(layer, state_name)?;
        graph.set_default_state(layer, state)?;
        graph.set_state_motion(state, clip.id)?;
        Ok(state)
    }

    /// Remove the scratch layer and restore the graph to its baseline shape.
    ///
    /// When `rig` is still live its speed goes back to normal and its pose is
    /// re-evaluated without the scratch layer.
    pub fn remove(
        &mut self,
        host: &mut dyn PreviewHost,
        rig: Option<RigId>,
    ) -> Result<RemoveOutcome> {
        let Some(graph_id) = self.graph else {
            return Ok(RemoveOutcome::NotActive);
        };
        let Some(graph) = host.graph_mut(graph_id) else {
            self.clear();
            return Ok(RemoveOutcome::NotActive);
        };

        let count = graph.layer_count();
        if count <= self.baseline_layer_count {
            self.clear();
            return Ok(RemoveOutcome::NotActive);
        }

        let top = count - 1;
        let found = graph.layer_name(top).unwrap_or_default();
        if found != self.layer_name {
            warn!(
                graph = ?graph_id,
                found,
                expected = %self.layer_name,
                "topmost layer is not the scratch layer; leaving graph untouched"
            );
            return Ok(RemoveOutcome::ForeignLayer {
                found: found.to_string(),
            });
        }

        graph.remove_layer(top)?;
        debug!(graph = ?graph_id, restored = top, "removed scratch layer");

        if let Some(rig_id) = rig {
            if let Some(rig) = host.live_rig_mut(rig_id) {
                rig.set_speed(self.rest_speed);
                rig.update(0.0);
            }
        }
        self.clear();
        Ok(RemoveOutcome::Removed { graph: graph_id })
    }

    fn clear(&mut self) {
        self.graph = None;
        self.rig = None;
        self.baseline_layer_count = 0;
        self.scratch_state = None;
    }
}
