//! Preview configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PreviewError, Result};

/// Names and timing used by a preview session.
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Reserved name of the injected layer. Teardown refuses to remove a
    /// topmost layer with any other name.
    pub scratch_layer_name: String,
    /// Reserved name of the injected (default) state.
    pub scratch_state_name: String,
    /// Blend weight of the injected layer.
    pub scratch_layer_weight: f32,

    /// Normalized increment per playback step.
    pub step: f32,
    /// Real-time wait between two playback steps.
    pub step_interval_ms: u64,
    /// Rig speed while a run is stepping, and after teardown.
    pub play_speed: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            scratch_layer_name: "AnimationViewer Layer".to_string(),
            scratch_state_name: "AnimationViewer State".to_string(),
            scratch_layer_weight: 1.0,
            step: 0.01,
            step_interval_ms: 10,
            play_speed: 1.0,
        }
    }
}

impl PreviewConfig {
    /// Parse and validate a (possibly partial) JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.step > 0.0 && self.step <= 1.0) {
            return Err(PreviewError::invalid_config(format!(
                "step must be in (0, 1], got {}",
                self.step
            )));
        }
        if !self.play_speed.is_finite() || self.play_speed <= 0.0 {
            return Err(PreviewError::invalid_config(format!(
                "play_speed must be positive, got {}",
                self.play_speed
            )));
        }
        if !self.scratch_layer_weight.is_finite() || self.scratch_layer_weight < 0.0 {
            return Err(PreviewError::invalid_config(format!(
                "scratch_layer_weight must be non-negative, got {}",
                self.scratch_layer_weight
            )));
        }
        if self.scratch_layer_name.is_empty() || self.scratch_state_name.is_empty() {
            return Err(PreviewError::invalid_config(
                "scratch layer and state names must not be empty",
            ));
        }
        if self.scratch_layer_name == self.scratch_state_name {
            return Err(PreviewError::invalid_config(
                "scratch layer and state names must differ",
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    /// Number of steps a run takes to cover [0, 1): `ceil(1 / step)`.
    ///
    /// `1 / 0.01f32` lands a hair above 100, so values within 1e-4 of an
    /// integer are snapped before taking the ceiling.
    pub fn steps_per_run(&self) -> u32 {
        let exact = 1.0 / f64::from(self.step);
        let nearest = exact.round();
        let steps = if (exact - nearest).abs() < 1e-4 {
            nearest
        } else {
            exact.ceil()
        };
        steps.max(1.0) as u32
    }
}
