//! Error types for the clip preview core.
//!
//! Missing selections, absent sessions and stale rigs are not errors here; they
//! come back as no-op outcomes. These types only cover collaborator failures
//! and bad configuration.

use serde::{Deserialize, Serialize};

/// Failure reported by a host collaborator while mutating its graph.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HostError {
    #[error("Layer index {index} out of range (layer count {count})")]
    LayerOutOfRange { index: usize, count: usize },

    #[error("State {state} not found in graph")]
    StateNotFound { state: u32 },

    #[error("Host rejected mutation: {reason}")]
    Rejected { reason: String },
}

/// Error type surfaced by preview operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PreviewError {
    /// Configuration failed validation
    #[error("Invalid preview config: {reason}")]
    InvalidConfig { reason: String },

    /// A graph or rig collaborator refused an operation
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// The scratch layer exists but its state machine has no default state
    #[error("Scratch layer {layer} has no default state")]
    StateMissing { layer: usize },
}

impl PreviewError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether retrying the operation later can succeed without user action.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Host(HostError::Rejected { .. }) | Self::StateMissing { .. }
        )
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "config",
            Self::Host(_) => "host",
            Self::StateMissing { .. } => "graph",
        }
    }
}

impl From<serde_json::Error> for PreviewError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
