// SPDX-License-Identifier: AGPL-3.0-only

//! Spectral bounds and the Chebyshev rescaling derived from them.
//!
//! Without user-supplied energy limits, the extremal eigenvalues are
//! estimated by Lanczos iteration (no reorthogonalization: only the
//! extremal Ritz values are needed, and those converge first even when
//! orthogonality is lost). After every step the two extremal eigenvalues
//! of the tridiagonal are found by Sturm bisection; iteration stops once
//! both move by less than `precision` relative to the spectral radius.
//!
//! # Provenance
//! Lanczos (1950), J. Res. Nat. Bur. Standards 45, 255

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tridiag::extremal_eigenvalues;
use crate::constants::{lcg_uniform_f64, DIVISION_GUARD};
use crate::error::{Result, TbError};
use crate::scalar::Scalar;
use crate::sparse::CsrMatrix;
use crate::tolerances::{
    DEGENERATE_HALF_WIDTH, LANCZOS_BREAKDOWN_THRESHOLD, LANCZOS_SEED, SCALING_PADDING,
};

/// Affine map `ε = (E − b) / a` of energies onto the Chebyshev interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub a: f64,
    pub b: f64,
}

impl Scale {
    #[must_use]
    pub fn rescale(&self, energy: f64) -> f64 {
        (energy - self.b) / self.a
    }
}

/// Lower and upper limit of the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    /// Lanczos iterations spent; 0 for user-supplied limits.
    pub iterations: usize,
}

impl Bounds {
    /// Explicit limits.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] unless `min < max` and both are finite.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(TbError::config(format!(
                "invalid energy range [{min}, {max}]"
            )));
        }
        Ok(Self {
            min,
            max,
            iterations: 0,
        })
    }

    /// Estimate the spectral limits of the Hermitian matrix `h`.
    ///
    /// # Errors
    ///
    /// [`TbError::State`] for an empty matrix; [`TbError::Numeric`] if the
    /// extremal Ritz values do not settle within `max_iterations`.
    pub fn estimate<T: Scalar>(
        h: &CsrMatrix<T>,
        precision: f64,
        max_iterations: usize,
    ) -> Result<Self> {
        let n = h.rows;
        if n == 0 {
            return Err(TbError::State("cannot bound the spectrum of an empty matrix".into()));
        }

        let mut seed = LANCZOS_SEED;
        let mut v: Vec<T> = (0..n)
            .map(|_| T::from_real(lcg_uniform_f64(&mut seed) - 0.5))
            .collect();
        let initial_norm = norm(&v).max(DIVISION_GUARD);
        for x in &mut v {
            *x = x.scale(1.0 / initial_norm);
        }

        let mut v_prev = vec![T::zero(); n];
        let mut w = vec![T::zero(); n];
        let mut alpha: Vec<f64> = Vec::new();
        let mut beta: Vec<f64> = Vec::new();
        let (mut min, mut max) = (0.0_f64, 0.0_f64);

        for j in 0..max_iterations {
            h.spmv(&v, &mut w);
            if let Some(&b) = beta.last() {
                for (wi, &p) in w.iter_mut().zip(&v_prev) {
                    *wi -= p.scale(b);
                }
            }
            let a = dot(&v, &w).re;
            alpha.push(a);
            for (wi, &vi) in w.iter_mut().zip(&v) {
                *wi -= vi.scale(a);
            }

            let (new_min, new_max) = extremal_eigenvalues(&alpha, &beta);
            let tolerance = precision * new_min.abs().max(new_max.abs());
            let settled = j > 0
                && (new_min - min).abs() <= tolerance
                && (new_max - max).abs() <= tolerance;
            min = new_min;
            max = new_max;

            let b_next = norm(&w);
            if settled || b_next < LANCZOS_BREAKDOWN_THRESHOLD || j + 1 >= n {
                debug!(min, max, iterations = j + 1, "lanczos bounds");
                return Ok(Self {
                    min,
                    max,
                    iterations: j + 1,
                });
            }

            beta.push(b_next);
            std::mem::swap(&mut v_prev, &mut v);
            for (vi, &wi) in v.iter_mut().zip(&w) {
                *vi = wi.scale(1.0 / b_next);
            }
        }

        Err(TbError::Numeric(format!(
            "Lanczos bounds did not converge in {max_iterations} iterations \
             (precision {precision}, last estimate [{min}, {max}])"
        )))
    }

    /// Rescaling that maps `[min, max]` into `[-(1 - pad), 1 - pad]`.
    #[must_use]
    pub fn scaling(&self) -> Scale {
        let half_width = 0.5 * (self.max - self.min);
        let a = if half_width > 0.0 {
            half_width / (1.0 - SCALING_PADDING)
        } else {
            DEGENERATE_HALF_WIDTH
        };
        Scale {
            a,
            b: 0.5 * (self.max + self.min),
        }
    }
}

fn dot<T: Scalar>(a: &[T], b: &[T]) -> Complex64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.conj().to_complex() * y.to_complex())
        .sum()
}

fn norm<T: Scalar>(a: &[T]) -> f64 {
    a.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt()
}
