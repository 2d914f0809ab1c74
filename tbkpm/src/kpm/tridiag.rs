// SPDX-License-Identifier: AGPL-3.0-only

//! Sturm bisection on symmetric tridiagonal matrices.
//!
//! The Lanczos bounds only need the two extremal eigenvalues of the
//! growing tridiagonal, so each is located directly by bisection on the
//! Sturm count instead of solving the whole spectrum.

use crate::tolerances::{TRIDIAG_BISECTION_STEPS, TRIDIAG_STURM_PIVOT_GUARD};

/// Count eigenvalues of a symmetric tridiagonal matrix strictly less than λ.
///
/// Uses the LDLᵀ factorization (Sturm sequence): the number of negative
/// pivots equals the number of eigenvalues below λ.
///
/// - `diagonal`: main diagonal d[0..n]
/// - `off_diag`: sub/super-diagonal e[0..n-1]
#[must_use]
pub fn sturm_count(diagonal: &[f64], off_diag: &[f64], lambda: f64) -> usize {
    let n = diagonal.len();
    if n == 0 {
        return 0;
    }

    let mut count = 0;
    let mut q = diagonal[0] - lambda;
    if q < 0.0 {
        count += 1;
    }

    for i in 1..n {
        let q_safe = if q.abs() < TRIDIAG_STURM_PIVOT_GUARD {
            TRIDIAG_STURM_PIVOT_GUARD.copysign(q)
        } else {
            q
        };
        q = (diagonal[i] - lambda) - off_diag[i - 1] * off_diag[i - 1] / q_safe;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// Gershgorin interval containing every eigenvalue.
fn gershgorin(diagonal: &[f64], off_diag: &[f64]) -> (f64, f64) {
    let n = diagonal.len();
    let mut lo = f64::MAX;
    let mut hi = f64::MIN;
    for i in 0..n {
        let e_left = if i > 0 { off_diag[i - 1].abs() } else { 0.0 };
        let e_right = if i + 1 < n { off_diag[i].abs() } else { 0.0 };
        lo = lo.min(diagonal[i] - e_left - e_right);
        hi = hi.max(diagonal[i] + e_left + e_right);
    }
    (lo - 1.0, hi + 1.0)
}

/// The `k`-th smallest eigenvalue (0-based) via bisection.
#[must_use]
pub fn eigenvalue(diagonal: &[f64], off_diag: &[f64], k: usize) -> f64 {
    let (mut a, mut b) = gershgorin(diagonal, off_diag);
    for _ in 0..TRIDIAG_BISECTION_STEPS {
        let mid = 0.5 * (a + b);
        if (b - a) < 2.0 * f64::EPSILON * mid.abs().max(1.0) {
            break;
        }
        if sturm_count(diagonal, off_diag, mid) <= k {
            a = mid;
        } else {
            b = mid;
        }
    }
    0.5 * (a + b)
}

/// Smallest and largest eigenvalue; `(0, 0)` for an empty matrix.
#[must_use]
pub fn extremal_eigenvalues(diagonal: &[f64], off_diag: &[f64]) -> (f64, f64) {
    match diagonal.len() {
        0 => (0.0, 0.0),
        1 => (diagonal[0], diagonal[0]),
        n => (
            eigenvalue(diagonal, off_diag, 0),
            eigenvalue(diagonal, off_diag, n - 1),
        ),
    }
}
