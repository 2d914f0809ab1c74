// SPDX-License-Identifier: AGPL-3.0-only

//! Host recursion for every scalar kind.

use super::ComputeBackend;
use crate::error::Result;
use crate::kpm::moments::{self, DiagonalMoments, OffDiagonalMoments};
use crate::kpm::optimized::{OptimizedHamiltonian, OptimizedVariant, OptimizedVisitor};
use crate::scalar::{Scalar, ScalarTag};

#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

struct Diagonal(usize);

impl OptimizedVisitor for Diagonal {
    type Output = DiagonalMoments;
    fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> DiagonalMoments {
        moments::diagonal(oh, self.0)
    }
}

struct OffDiagonal(usize);

impl OptimizedVisitor for OffDiagonal {
    type Output = OffDiagonalMoments;
    fn visit<T: Scalar>(self, oh: &OptimizedHamiltonian<T>) -> OffDiagonalMoments {
        moments::off_diagonal(oh, self.0)
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn supports(&self, _tag: ScalarTag) -> bool {
        true
    }

    fn diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<DiagonalMoments> {
        Ok(oh.accept(Diagonal(num_moments)))
    }

    fn off_diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<OffDiagonalMoments> {
        Ok(oh.accept(OffDiagonal(num_moments)))
    }
}
