//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur at the public boundary of the simulation.
///
/// Numerical degeneracies (singular tensors, zero-length contact directions,
/// exhausted friction budgets) never surface here; they are absorbed by
/// well-defined fallbacks inside the dynamics code.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// A force or step request targeted a body that is not moving.
    #[error("body {0} is not a moving body")]
    BodyNotMoving(u64),

    /// A body with this ID is already registered.
    #[error("body ID {0} already exists")]
    DuplicateBody(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be non-negative and finite)")]
    InvalidTimestep(f64),

    /// Simulation diverged or stopped making progress.
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },

    /// Malformed body geometry.
    #[error("invalid mesh: {reason}")]
    InvalidMesh {
        /// Description of what's wrong.
        reason: String,
    },
}

impl SimError {
    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Create an invalid mesh error.
    #[must_use]
    pub fn invalid_mesh(reason: impl Into<String>) -> Self {
        Self::InvalidMesh {
            reason: reason.into(),
        }
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }

    /// Check if this error refers to a specific body.
    #[must_use]
    pub fn body_id(&self) -> Option<u64> {
        match self {
            Self::InvalidBodyId(id) | Self::BodyNotMoving(id) | Self::DuplicateBody(id) => Some(*id),
            _ => None,
        }
    }
}
