// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized numerical tolerances and defaults with rationale.
//!
//! Every threshold used by the spectral engine and the validation binaries
//! is defined here. No ad-hoc magic numbers.
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Machine precision | IEEE 754 f64 | 1e-10 for exact arithmetic |
//! | Numerical method | Algorithm convergence | 2e-3 Lanczos bounds |
//! | KPM resolution | Kernel broadening | π·a/δ moments (Jackson) |

// ═══════════════════════════════════════════════════════════════════
// Machine-precision tolerances (IEEE 754 f64)
// ═══════════════════════════════════════════════════════════════════

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// f64 has ~15.9 significant digits; 1e-10 allows 5 digits of accumulated
/// rounding in compositions of exact operations.
pub const EXACT_F64: f64 = 1e-10;

/// Tolerance for f64 results that pass through an iterative procedure.
pub const ITERATIVE_F64: f64 = 1e-8;

/// Tolerance for single-precision Hamiltonians compared against f64.
pub const SINGLE_VS_DOUBLE: f64 = 1e-4;

/// Tolerance for comparing GPU f64 results against CPU f64.
///
/// Same IEEE 754 representation, different instruction ordering.
pub const GPU_VS_CPU_F64: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Lanczos bounds estimation
// ═══════════════════════════════════════════════════════════════════

/// Default relative convergence tolerance of the extremal eigenvalues.
///
/// Iteration stops once both the minimum and maximum Ritz values change by
/// less than this fraction of the spectral radius between two steps.
pub const LANCZOS_PRECISION: f64 = 0.002;

/// Default Lanczos iteration cap.
///
/// Extremal Ritz values of lattice Hamiltonians converge in a few dozen
/// steps; 1000 leaves a wide margin while still bounding the cost. For
/// matrices smaller than the cap the Krylov space is exhausted first and
/// the estimate is exact.
pub const LANCZOS_MAX_ITERATIONS: usize = 1000;

/// Off-diagonal norm below which the Krylov space is invariant.
pub const LANCZOS_BREAKDOWN_THRESHOLD: f64 = 1e-14;

/// Seed of the deterministic Lanczos starting vector.
pub const LANCZOS_SEED: u64 = 42;

/// Pivot guard in the Sturm-sequence LDLᵀ recurrence.
///
/// A zero pivot is replaced by ±guard so the count stays defined when λ
/// hits an eigenvalue of a leading submatrix exactly.
pub const TRIDIAG_STURM_PIVOT_GUARD: f64 = 1e-300;

/// Bisection step cap; 200 halvings exhaust f64 resolution on any interval.
pub const TRIDIAG_BISECTION_STEPS: usize = 200;

// ═══════════════════════════════════════════════════════════════════
// Chebyshev rescaling
// ═══════════════════════════════════════════════════════════════════

/// Safety padding of the rescaled spectrum.
///
/// The spectrum is mapped to `[-(1 - pad), 1 - pad]` so that rounding in
/// the Lanczos estimate never pushes an eigenvalue outside `[-1, 1]`,
/// where Chebyshev polynomials grow exponentially.
pub const SCALING_PADDING: f64 = 0.01;

/// Half-width used when the estimated spectrum collapses to a point.
pub const DEGENERATE_HALF_WIDTH: f64 = 1.0;

// ═══════════════════════════════════════════════════════════════════
// Kernels
// ═══════════════════════════════════════════════════════════════════

/// Default Lorentz kernel decay parameter λ.
///
/// λ ∈ [3, 5] is the usual compromise between resolution and suppression
/// of truncation noise (Weiße et al., Rev. Mod. Phys. 78, 275 (2006)).
pub const LORENTZ_LAMBDA: f64 = 4.0;

/// Smallest broadening accepted when deriving a moment count.
pub const MIN_BROADENING: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Geometry
// ═══════════════════════════════════════════════════════════════════

/// Gram determinant below which primitive vectors are treated as degenerate.
pub const DEGENERATE_VECTORS: f64 = 1e-12;

/// Slack on the ±0.5 lattice-vector offset limit (f32-style rounding).
pub const OFFSET_SLACK: f64 = 1e-6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn tolerance_ordering() {
        assert!(EXACT_F64 < ITERATIVE_F64);
        assert!(ITERATIVE_F64 < GPU_VS_CPU_F64);
        assert!(GPU_VS_CPU_F64 < SINGLE_VS_DOUBLE);
    }

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn padding_keeps_spectrum_inside_unit_interval() {
        assert!(SCALING_PADDING > 0.0 && SCALING_PADDING < 1.0);
    }

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn lanczos_defaults_are_sane() {
        assert!(LANCZOS_PRECISION > 0.0 && LANCZOS_PRECISION < 1.0);
        assert!(LANCZOS_MAX_ITERATIONS >= 100);
        assert!(LANCZOS_BREAKDOWN_THRESHOLD < EXACT_F64);
    }
}
