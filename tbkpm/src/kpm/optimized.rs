// SPDX-License-Identifier: AGPL-3.0-only

//! Rescaled, reordered Hamiltonian for the Chebyshev recursion.
//!
//! | `opt_level` | ordering | per-step rows | diagonal moments per step |
//! |-------------|----------|---------------|---------------------------|
//! | 0 | identity | all N | 1 |
//! | 1 | breadth-first from the start row | ball of radius n+1 | 1 |
//! | ≥ 2 | breadth-first | ball of radius n+1 | 2 |
//!
//! Breadth-first ordering places the start row first and every site at
//! graph distance d before any site at distance d+1. Since `Tₙ(H̃)|r⟩` is
//! supported on the ball of radius n around r, the n-th recursion step only
//! has to touch a leading block of rows, whose size is precomputed in
//! `sizes`. Sites unreachable from the start row are appended at the end
//! and never touched.

use std::collections::VecDeque;
use std::sync::Arc;

use super::bounds::Scale;
use crate::error::{Result, TbError};
use crate::hamiltonian::{Hamiltonian, HamiltonianVisitor};
use crate::scalar::{Scalar, ScalarTag};
use crate::sparse::CsrMatrix;

/// Start row and target columns of a moment computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indices {
    pub row: usize,
    pub cols: Vec<usize>,
}

impl Indices {
    /// Single diagonal element `(i, i)`.
    #[must_use]
    pub fn diagonal(i: usize) -> Self {
        Self {
            row: i,
            cols: vec![i],
        }
    }

    #[must_use]
    pub fn is_diagonal(&self) -> bool {
        self.cols.len() == 1 && self.cols[0] == self.row
    }
}

#[derive(Debug, Clone)]
pub struct OptimizedHamiltonian<T> {
    matrix: CsrMatrix<T>,
    /// `indices` after reordering.
    indices: Indices,
    /// Original index of each reordered row.
    permutation: Vec<usize>,
    /// Leading rows touched by the step producing `T_{n+1}`.
    sizes: Vec<usize>,
    opt_level: u8,
}

impl<T: Scalar> OptimizedHamiltonian<T> {
    /// Rescale `h` with `scale`, reorder for `indices`, and plan `num_moments` steps.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if any index is out of range or `cols` is empty.
    pub fn new(
        h: &CsrMatrix<T>,
        indices: &Indices,
        scale: Scale,
        num_moments: usize,
        opt_level: u8,
    ) -> Result<Self> {
        let n = h.rows;
        if indices.cols.is_empty() {
            return Err(TbError::config("no target columns given"));
        }
        if let Some(&bad) = std::iter::once(&indices.row)
            .chain(&indices.cols)
            .find(|&&i| i >= n)
        {
            return Err(TbError::config(format!(
                "index {bad} out of range for a {n}×{n} Hamiltonian"
            )));
        }

        let rescaled = rescale(h, scale);
        if opt_level == 0 {
            return Ok(Self {
                matrix: rescaled,
                indices: indices.clone(),
                permutation: (0..n).collect(),
                sizes: vec![n; num_moments],
                opt_level,
            });
        }

        let (order, ball_sizes) = breadth_first(&rescaled, indices.row);
        let mut old_to_new = vec![0; n];
        for (new, &old) in order.iter().enumerate() {
            old_to_new[old] = new;
        }
        let sizes = (0..num_moments)
            .map(|step| ball_sizes[(step + 1).min(ball_sizes.len() - 1)])
            .collect();

        Ok(Self {
            matrix: rescaled.permuted(&order),
            indices: Indices {
                row: old_to_new[indices.row],
                cols: indices.cols.iter().map(|&c| old_to_new[c]).collect(),
            },
            permutation: order,
            sizes,
            opt_level,
        })
    }

    /// The rescaled (and possibly reordered) matrix H̃.
    #[must_use]
    pub const fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Start row and target columns in the reordered numbering.
    #[must_use]
    pub const fn indices(&self) -> &Indices {
        &self.indices
    }

    /// `permutation()[k]` is the original index of reordered row `k`.
    #[must_use]
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    #[must_use]
    pub const fn opt_level(&self) -> u8 {
        self.opt_level
    }

    /// Whether two diagonal moments are produced per recursion step.
    #[must_use]
    pub fn uses_doubling(&self) -> bool {
        self.opt_level >= 2 && self.indices.is_diagonal()
    }

    /// Rows touched by the step that produces `T_{n+1}`.
    #[must_use]
    pub fn size_for_step(&self, n: usize) -> usize {
        self.sizes
            .get(n)
            .or_else(|| self.sizes.last())
            .copied()
            .unwrap_or(self.matrix.rows)
    }

    /// Operation count of one recursion step over `size` rows.
    #[must_use]
    pub fn step_operations(&self, size: usize) -> u64 {
        (self.matrix.row_ptr[size] + size) as u64
    }

    /// Bytes held by the matrix (values, column indices, row pointers).
    #[must_use]
    pub fn matrix_memory(&self) -> usize {
        self.matrix.nnz() * (T::TAG.size_of() + std::mem::size_of::<u32>())
            + (self.matrix.rows + 1) * std::mem::size_of::<u32>()
    }

    /// Bytes held by the two recursion vectors.
    #[must_use]
    pub fn vector_memory(&self) -> usize {
        2 * self.matrix.rows * T::TAG.size_of()
    }
}

/// H̃ = (H − b·I) / a.
fn rescale<T: Scalar>(h: &CsrMatrix<T>, scale: Scale) -> CsrMatrix<T> {
    let inv_a = 1.0 / scale.a;
    let shift = T::from_real(-scale.b * inv_a);
    let mut triplets: Vec<(usize, usize, T)> =
        h.triplets().map(|(r, c, v)| (r, c, v.scale(inv_a))).collect();
    triplets.extend((0..h.rows).map(|i| (i, i, shift)));
    CsrMatrix::from_triplets(h.rows, h.cols, triplets)
}

/// Breadth-first order from `start` and cumulative ball sizes by radius.
///
/// `ball_sizes[d]` is the number of sites within graph distance `d`; the
/// last entry is the size of the connected component.
fn breadth_first<T: Copy>(matrix: &CsrMatrix<T>, start: usize) -> (Vec<usize>, Vec<usize>) {
    let n = matrix.rows;
    let mut distance: Vec<Option<usize>> = vec![None; n];
    let mut order = Vec::with_capacity(n);
    let mut ball_sizes = Vec::new();
    let mut queue = VecDeque::from([start]);
    distance[start] = Some(0);

    while let Some(i) = queue.pop_front() {
        let d = distance[i].unwrap_or(0);
        if d == ball_sizes.len() {
            ball_sizes.push(order.len());
        }
        order.push(i);
        for (j, _) in matrix.row(i) {
            if distance[j].is_none() {
                distance[j] = Some(d + 1);
                queue.push_back(j);
            }
        }
    }
    // ball_sizes[d] currently counts sites closer than d; shift to "within d"
    ball_sizes.remove(0);
    ball_sizes.push(order.len());

    order.extend((0..n).filter(|&i| distance[i].is_none()));
    (order, ball_sizes)
}

/// [`OptimizedHamiltonian`] tagged with its scalar kind.
#[derive(Debug, Clone)]
pub enum OptimizedVariant {
    F32(Arc<OptimizedHamiltonian<f32>>),
    F64(Arc<OptimizedHamiltonian<f64>>),
    Cf32(Arc<OptimizedHamiltonian<num_complex::Complex32>>),
    Cf64(Arc<OptimizedHamiltonian<num_complex::Complex64>>),
}

/// Generic operation over whichever scalar kind an optimized Hamiltonian holds.
pub trait OptimizedVisitor {
    type Output;
    fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> Self::Output;
}

impl OptimizedVariant {
    /// Build from a tagged Hamiltonian.
    ///
    /// # Errors
    ///
    /// See [`OptimizedHamiltonian::new`].
    pub fn new(
        h: &Hamiltonian,
        indices: &Indices,
        scale: Scale,
        num_moments: usize,
        opt_level: u8,
    ) -> Result<Self> {
        struct Make<'a> {
            indices: &'a Indices,
            scale: Scale,
            num_moments: usize,
            opt_level: u8,
        }
        impl HamiltonianVisitor for Make<'_> {
            type Output = Result<OptimizedVariant>;
            fn visit<T: Scalar>(self, matrix: &Arc<CsrMatrix<T>>) -> Self::Output {
                let oh = OptimizedHamiltonian::new(
                    matrix,
                    self.indices,
                    self.scale,
                    self.num_moments,
                    self.opt_level,
                )?;
                wrap(oh)
            }
        }
        h.accept(Make {
            indices,
            scale,
            num_moments,
            opt_level,
        })
    }

    pub fn accept<V: OptimizedVisitor>(&self, visitor: V) -> V::Output {
        match self {
            Self::F32(oh) => visitor.visit(oh.as_ref()),
            Self::F64(oh) => visitor.visit(oh.as_ref()),
            Self::Cf32(oh) => visitor.visit(oh.as_ref()),
            Self::Cf64(oh) => visitor.visit(oh.as_ref()),
        }
    }

    #[must_use]
    pub const fn tag(&self) -> ScalarTag {
        match self {
            Self::F32(_) => ScalarTag::F32,
            Self::F64(_) => ScalarTag::F64,
            Self::Cf32(_) => ScalarTag::Cf32,
            Self::Cf64(_) => ScalarTag::Cf64,
        }
    }

    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        struct Sizes;
        impl OptimizedVisitor for Sizes {
            type Output = Vec<usize>;
            fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> Vec<usize> {
                oh.sizes().to_vec()
            }
        }
        self.accept(Sizes)
    }

    #[must_use]
    pub fn indices(&self) -> Indices {
        struct Idx;
        impl OptimizedVisitor for Idx {
            type Output = Indices;
            fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> Indices {
                oh.indices().clone()
            }
        }
        self.accept(Idx)
    }

    /// `(matrix, vector)` memory in bytes.
    #[must_use]
    pub fn memory(&self) -> (usize, usize) {
        struct Memory;
        impl OptimizedVisitor for Memory {
            type Output = (usize, usize);
            fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> Self::Output {
                (oh.matrix_memory(), oh.vector_memory())
            }
        }
        self.accept(Memory)
    }

    /// Double-precision complex copy of H̃.
    #[must_use]
    pub fn matrix(&self) -> CsrMatrix<num_complex::Complex64> {
        struct Widen;
        impl OptimizedVisitor for Widen {
            type Output = CsrMatrix<num_complex::Complex64>;
            fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> Self::Output {
                oh.matrix().map(Scalar::to_complex)
            }
        }
        self.accept(Widen)
    }

    /// Typed access; fails on a scalar-kind mismatch.
    ///
    /// # Errors
    ///
    /// [`TbError::UnsupportedScalar`] if the variant holds another kind.
    pub fn get<T: Scalar>(&self) -> Result<&OptimizedHamiltonian<T>> {
        let any: &dyn std::any::Any = match self {
            Self::F32(oh) => oh.as_ref(),
            Self::F64(oh) => oh.as_ref(),
            Self::Cf32(oh) => oh.as_ref(),
            Self::Cf64(oh) => oh.as_ref(),
        };
        any.downcast_ref()
            .ok_or_else(|| TbError::unsupported(&format!("{} optimized access", T::TAG), self.tag()))
    }
}

/// Move a typed optimized Hamiltonian into its variant.
fn wrap<T: Scalar>(oh: OptimizedHamiltonian<T>) -> Result<OptimizedVariant> {
    use num_complex::{Complex32, Complex64};
    let any: Box<dyn std::any::Any> = Box::new(oh);
    let wrapped = match T::TAG {
        ScalarTag::F32 => any
            .downcast::<OptimizedHamiltonian<f32>>()
            .map(|b| OptimizedVariant::F32(Arc::from(b))),
        ScalarTag::F64 => any
            .downcast::<OptimizedHamiltonian<f64>>()
            .map(|b| OptimizedVariant::F64(Arc::from(b))),
        ScalarTag::Cf32 => any
            .downcast::<OptimizedHamiltonian<Complex32>>()
            .map(|b| OptimizedVariant::Cf32(Arc::from(b))),
        ScalarTag::Cf64 => any
            .downcast::<OptimizedHamiltonian<Complex64>>()
            .map(|b| OptimizedVariant::Cf64(Arc::from(b))),
    };
    wrapped.map_err(|_| TbError::unsupported("optimized Hamiltonian", T::TAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> CsrMatrix<f64> {
        let mut triplets = Vec::new();
        for i in 0..n - 1 {
            triplets.push((i, i + 1, -1.0));
            triplets.push((i + 1, i, -1.0));
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    const UNIT: Scale = Scale { a: 1.0, b: 0.0 };

    #[test]
    fn level_zero_uses_full_size_from_the_start() {
        let oh = OptimizedHamiltonian::new(&chain(10), &Indices::diagonal(4), UNIT, 6, 0).unwrap();
        assert_eq!(oh.sizes(), &[10; 6]);
        assert_eq!(oh.indices(), &Indices::diagonal(4));
        assert_eq!(oh.matrix(), &chain(10));
    }

    #[test]
    fn breadth_first_sizes_grow_by_ball() {
        // middle of a chain: ball of radius d holds 2d + 1 sites
        let oh = OptimizedHamiltonian::new(&chain(11), &Indices::diagonal(5), UNIT, 8, 1).unwrap();
        assert_eq!(oh.indices().row, 0);
        assert_eq!(oh.sizes(), &[3, 5, 7, 9, 11, 11, 11, 11]);
        assert!(oh.sizes().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(oh.permutation()[0], 5);
    }

    #[test]
    fn unreachable_sites_are_never_touched() {
        // two disconnected dimers
        let h = CsrMatrix::from_triplets(
            4,
            4,
            vec![(0, 1, 1.0), (1, 0, 1.0), (2, 3, 1.0), (3, 2, 1.0)],
        );
        let oh = OptimizedHamiltonian::new(&h, &Indices::diagonal(2), UNIT, 4, 1).unwrap();
        assert_eq!(oh.sizes(), &[2, 2, 2, 2]);
        assert_eq!(&oh.permutation()[..2], &[2, 3]);
    }

    #[test]
    fn rescaling_shifts_the_diagonal() {
        let h = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 3.0), (1, 1, 1.0)]);
        let oh = OptimizedHamiltonian::new(&h, &Indices::diagonal(0), Scale { a: 2.0, b: 1.0 }, 2, 0)
            .unwrap();
        assert_eq!(oh.matrix().get(0, 0), Some(1.0));
        // (1 - 1) / 2 == 0 is not stored
        assert_eq!(oh.matrix().get(1, 1), None);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let result = OptimizedHamiltonian::new(
            &chain(3),
            &Indices {
                row: 0,
                cols: vec![3],
            },
            UNIT,
            2,
            1,
        );
        assert!(matches!(result, Err(TbError::Configuration(_))));
    }

    #[test]
    fn variant_dispatch_keeps_tag() {
        let h = Hamiltonian::F32(Arc::new(chain(4).map(|v| v as f32)));
        let oh = OptimizedVariant::new(&h, &Indices::diagonal(0), UNIT, 3, 1).unwrap();
        assert_eq!(oh.tag(), ScalarTag::F32);
        assert!(oh.get::<f32>().is_ok());
        assert!(oh.get::<f64>().is_err());
        assert_eq!(oh.sizes(), vec![2, 3, 4]);
        assert!(!oh.indices().cols.is_empty());
    }
}
