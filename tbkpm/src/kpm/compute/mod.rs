// SPDX-License-Identifier: AGPL-3.0-only

//! Pluggable execution of the moment recursion.
//!
//! Every backend runs the same recurrence on an [`OptimizedVariant`]; the
//! choice is made once, when the KPM object is constructed, by asking
//! "who can run this scalar kind?" rather than "send to GPU #0".

mod host;
#[cfg(feature = "gpu")]
mod gpu;

pub use host::HostBackend;
#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::moments::{DiagonalMoments, OffDiagonalMoments};
use super::optimized::OptimizedVariant;
use crate::error::Result;
use crate::scalar::ScalarTag;

/// Preferred backend named in a [`super::Config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Host,
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// One way of running the Chebyshev recursion.
pub trait ComputeBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Whether this backend can run a Hamiltonian of scalar kind `tag`.
    fn supports(&self, tag: ScalarTag) -> bool;

    /// `⟨r|Tₙ(H̃)|r⟩` for the diagonal indices of `oh`.
    ///
    /// # Errors
    ///
    /// Backend-specific failures (device loss, unsupported scalar kind).
    fn diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<DiagonalMoments>;

    /// `⟨r|Tₙ(H̃)|c⟩` for every target column of `oh`.
    ///
    /// # Errors
    ///
    /// Backend-specific failures (device loss, unsupported scalar kind).
    fn off_diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<OffDiagonalMoments>;
}

/// One device shared by several KPM objects.
impl<B: ComputeBackend + ?Sized> ComputeBackend for std::sync::Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn supports(&self, tag: ScalarTag) -> bool {
        (**self).supports(tag)
    }

    fn diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<DiagonalMoments> {
        (**self).diagonal_moments(oh, num_moments)
    }

    fn off_diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<OffDiagonalMoments> {
        (**self).off_diagonal_moments(oh, num_moments)
    }
}

/// Why a particular backend was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The preferred backend is available and capable.
    Preferred,
    /// The preferred backend could not be used; the host runs instead.
    Fallback(String),
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preferred => write!(f, "preferred"),
            Self::Fallback(why) => write!(f, "fallback: {why}"),
        }
    }
}

/// Backend decision for a KPM object.
#[derive(Debug)]
pub struct Selection {
    pub backend: Box<dyn ComputeBackend>,
    pub reason: Reason,
}

/// Route to `preferred` if it is available and runs `tag`, else to the host.
#[must_use]
pub fn select(preferred: BackendKind, tag: ScalarTag) -> Selection {
    match preferred {
        BackendKind::Host => Selection {
            backend: Box::new(HostBackend),
            reason: Reason::Preferred,
        },
        BackendKind::Gpu => match gpu_backend() {
            Ok(backend) if backend.supports(tag) => Selection {
                backend,
                reason: Reason::Preferred,
            },
            Ok(backend) => fallback(format!("{} cannot run {tag}", backend.name())),
            Err(why) => fallback(why),
        },
    }
}

fn fallback(why: String) -> Selection {
    warn!(reason = %why, "KPM backend falls back to host");
    Selection {
        backend: Box::new(HostBackend),
        reason: Reason::Fallback(why),
    }
}

#[cfg(feature = "gpu")]
fn gpu_backend() -> std::result::Result<Box<dyn ComputeBackend>, String> {
    GpuBackend::new()
        .map(|b| Box::new(b) as Box<dyn ComputeBackend>)
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "gpu"))]
fn gpu_backend() -> std::result::Result<Box<dyn ComputeBackend>, String> {
    Err("built without the `gpu` feature".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_always_preferred_when_asked() {
        let selection = select(BackendKind::Host, ScalarTag::Cf32);
        assert_eq!(selection.reason, Reason::Preferred);
        assert_eq!(selection.backend.name(), "host");
    }

    #[test]
    fn complex_single_never_runs_on_the_gpu() {
        // the GPU backend is f64-only; with or without a device this lands on the host
        let selection = select(BackendKind::Gpu, ScalarTag::Cf32);
        assert_eq!(selection.backend.name(), "host");
        assert!(matches!(selection.reason, Reason::Fallback(_)));
    }

    #[test]
    fn backend_kind_serde() {
        assert_eq!(serde_json::to_string(&BackendKind::Gpu).unwrap(), "\"gpu\"");
        let kind: BackendKind = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(kind, BackendKind::Host);
        assert_eq!(BackendKind::default().to_string(), "host");
    }

    #[test]
    fn shared_backend_delegates() {
        let shared = std::sync::Arc::new(HostBackend);
        let boxed: Box<dyn ComputeBackend> = Box::new(std::sync::Arc::clone(&shared));
        assert_eq!(boxed.name(), "host");
        assert!(boxed.supports(ScalarTag::F64));
        assert_eq!(std::sync::Arc::strong_count(&shared), 2);
    }
}
