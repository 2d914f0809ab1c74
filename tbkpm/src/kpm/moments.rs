// SPDX-License-Identifier: AGPL-3.0-only

//! Chebyshev moment recursion on the host.
//!
//! ```text
//! T₀ = |r⟩,  T₁ = H̃ T₀,  Tₙ₊₁ = 2 H̃ Tₙ − Tₙ₋₁
//! ```
//!
//! The update `y ← 2 H̃ x − y` runs in place over the leading
//! `sizes[n]` rows only; rows beyond that keep their previous value, which
//! is zero outside the support of `Tₙ₋₁`.

use num_complex::Complex64;

use super::optimized::OptimizedHamiltonian;
use crate::scalar::Scalar;

/// Moments of a diagonal element `⟨r|Tₙ(H̃)|r⟩`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalMoments {
    pub moments: Vec<f64>,
    pub operations: u64,
}

/// Moments of `⟨r|Tₙ(H̃)|c⟩` for each target column `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct OffDiagonalMoments {
    /// `moments[k][n]` belongs to target column `k`.
    pub moments: Vec<Vec<Complex64>>,
    pub operations: u64,
}

/// `y[i] ← factor · (H̃ x)[i] − y[i]` for `i < size`; returns the operation count.
pub fn recursion_step<T: Scalar>(
    oh: &OptimizedHamiltonian<T>,
    size: usize,
    factor: f64,
    x: &[T],
    y: &mut [T],
) -> u64 {
    let m = oh.matrix();
    for (i, yi) in y.iter_mut().enumerate().take(size) {
        let mut sum = T::zero();
        for k in m.row_ptr[i]..m.row_ptr[i + 1] {
            sum += m.values[k] * x[m.col_idx[k]];
        }
        *yi = sum.scale(factor) - *yi;
    }
    oh.step_operations(size)
}

fn unit_vector<T: Scalar>(n: usize, i: usize) -> Vec<T> {
    let mut v = vec![T::zero(); n];
    v[i] = T::one();
    v
}

/// `⟨a|b⟩` over the leading `size` entries.
fn inner<T: Scalar>(a: &[T], b: &[T], size: usize) -> Complex64 {
    a[..size]
        .iter()
        .zip(&b[..size])
        .map(|(x, y)| x.conj().to_complex() * y.to_complex())
        .sum()
}

/// Diagonal moments; two per step when the Hamiltonian was optimized for it.
#[must_use]
pub fn diagonal<T: Scalar>(oh: &OptimizedHamiltonian<T>, num_moments: usize) -> DiagonalMoments {
    if oh.uses_doubling() {
        diagonal_doubled(oh, num_moments)
    } else {
        let OffDiagonalMoments {
            moments,
            operations,
        } = off_diagonal(oh, num_moments);
        DiagonalMoments {
            moments: moments
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|mu| mu.re)
                .collect(),
            operations,
        }
    }
}

/// μ₂ₙ = 2⟨Tₙ|Tₙ⟩ − μ₀ and μ₂ₙ₊₁ = 2⟨Tₙ₊₁|Tₙ⟩ − μ₁.
fn diagonal_doubled<T: Scalar>(
    oh: &OptimizedHamiltonian<T>,
    num_moments: usize,
) -> DiagonalMoments {
    let n = oh.matrix().rows;
    let row = oh.indices().row;
    let mut moments = vec![0.0; num_moments];
    if num_moments == 0 {
        return DiagonalMoments {
            moments,
            operations: 0,
        };
    }

    let mut current: Vec<T> = unit_vector(n, row);
    let mut next = vec![T::zero(); n];
    let mut operations = recursion_step(oh, oh.size_for_step(0), 1.0, &current, &mut next);

    let mu0 = 1.0;
    let mu1 = next[row].to_complex().re;
    moments[0] = mu0;
    if num_moments > 1 {
        moments[1] = mu1;
    }

    // current = Tₙ, next = Tₙ₊₁
    let mut step = 0;
    while 2 * step + 2 < num_moments {
        operations += recursion_step(oh, oh.size_for_step(step + 1), 2.0, &next, &mut current);
        std::mem::swap(&mut current, &mut next);
        step += 1;

        let size = oh.size_for_step(step);
        moments[2 * step] = 2.0 * inner(&current, &current, size).re - mu0;
        if 2 * step + 1 < num_moments {
            moments[2 * step + 1] = 2.0 * inner(&next, &current, size).re - mu1;
        }
    }

    DiagonalMoments {
        moments,
        operations,
    }
}

/// Moments for every target column of the optimized indices.
#[must_use]
pub fn off_diagonal<T: Scalar>(
    oh: &OptimizedHamiltonian<T>,
    num_moments: usize,
) -> OffDiagonalMoments {
    let n = oh.matrix().rows;
    let indices = oh.indices();
    let mut moments = vec![vec![Complex64::new(0.0, 0.0); num_moments]; indices.cols.len()];
    let mut operations = 0;

    let record = |moments: &mut [Vec<Complex64>], v: &[T], step: usize| {
        for (k, &c) in indices.cols.iter().enumerate() {
            moments[k][step] = v[c].to_complex().conj();
        }
    };

    let mut previous: Vec<T> = unit_vector(n, indices.row);
    if num_moments > 0 {
        record(&mut moments, &previous, 0);
    }
    if num_moments > 1 {
        let mut current = vec![T::zero(); n];
        operations += recursion_step(oh, oh.size_for_step(0), 1.0, &previous, &mut current);
        record(&mut moments, &current, 1);

        for step in 2..num_moments {
            operations +=
                recursion_step(oh, oh.size_for_step(step - 1), 2.0, &current, &mut previous);
            std::mem::swap(&mut previous, &mut current);
            record(&mut moments, &current, step);
        }
    }

    OffDiagonalMoments {
        moments,
        operations,
    }
}
