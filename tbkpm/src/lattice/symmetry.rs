// SPDX-License-Identifier: AGPL-3.0-only

//! Periodic boundary conditions along selected lattice vectors.

use super::Index3D;

/// Translational symmetry of a finite system along chosen lattice directions.
///
/// The period along a periodic direction equals the number of cells of the
/// foundation in that direction: a neighbor that falls off one side of the
/// system re-enters on the opposite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranslationalSymmetry {
    periodic: [bool; 3],
}

impl TranslationalSymmetry {
    #[must_use]
    pub const fn new(a1: bool, a2: bool, a3: bool) -> Self {
        Self {
            periodic: [a1, a2, a3],
        }
    }

    #[must_use]
    pub const fn is_periodic(&self, direction: usize) -> bool {
        direction < 3 && self.periodic[direction]
    }

    /// Map an out-of-range cell index back into `[0, size)`.
    ///
    /// Returns the wrapped index and the number of periods moved along each
    /// direction, or `None` if the index leaves the system along a
    /// non-periodic direction.
    #[must_use]
    pub fn wrap(&self, index: Index3D, size: Index3D) -> Option<(Index3D, Index3D)> {
        let mut wrapped = index;
        let mut periods = [0; 3];
        for n in 0..3 {
            if (0..size[n]).contains(&index[n]) {
                continue;
            }
            if !self.periodic[n] || size[n] <= 0 {
                return None;
            }
            periods[n] = index[n].div_euclid(size[n]);
            wrapped[n] = index[n].rem_euclid(size[n]);
        }
        Some((wrapped, periods))
    }
}
