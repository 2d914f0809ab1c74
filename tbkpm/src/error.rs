// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for model construction and spectral evaluation.
//!
//! Every failure is synchronous and local: it is raised at construction or
//! evaluation time and never retried. Callers pattern-match on the failure
//! mode rather than parsing opaque strings.

use crate::scalar::ScalarTag;

/// Errors arising from lattice description, system assembly, or KPM runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TbError {
    /// Invalid lattice/model description: empty or duplicate names, unknown
    /// references, id capacity overflow, duplicate hopping terms, bad offsets.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Degenerate geometry, e.g. collinear primitive vectors.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// The system or Hamiltonian was requested after every site was removed.
    #[error("state error: {0}")]
    State(String),

    /// A numeric procedure failed to converge within its budget.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// An operation was applied to a container whose scalar kind it does not support.
    #[error("{operation} does not support scalar type {found}")]
    UnsupportedScalar {
        /// Operation that rejected the container.
        operation: String,
        /// Runtime scalar tag of the container.
        found: ScalarTag,
    },

    /// No compatible GPU adapter was found by wgpu.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// GPU device creation or readback failed (wraps the underlying wgpu message).
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// GPU lacks the `SHADER_F64` feature required for f64 compute.
    #[error("GPU does not support SHADER_F64: cannot run f64 computation")]
    NoShaderF64,
}

impl TbError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn unsupported(operation: &str, found: ScalarTag) -> Self {
        Self::UnsupportedScalar {
            operation: operation.to_string(),
            found,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TbError>;
