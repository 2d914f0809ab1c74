// SPDX-License-Identifier: AGPL-3.0-only

//! Sparse tight-binding Hamiltonian in one of four scalar kinds.
//!
//! The matrix holds both triangles (it is Hermitian by construction):
//! every stored bond `(i, j, t)` of the system contributes `t` at `(i, j)`
//! and `t*` at `(j, i)`. Duplicate positions are summed and exact zeros
//! are not stored, so a modifier that zeroes energies shrinks the matrix.

use std::any::Any;
use std::sync::Arc;

use num_complex::Complex64;
use num_traits::One;
use tracing::debug;

use crate::error::{Result, TbError};
use crate::lattice::{Cartesian, HopId, Lattice};
use crate::scalar::{Scalar, ScalarTag};
use crate::sparse::CsrMatrix;
use crate::system::modifiers::ModifierSet;
use crate::system::{HopEntry, System};

/// Hamiltonian matrix tagged with its scalar kind.
#[derive(Debug, Clone)]
pub enum Hamiltonian {
    F32(Arc<CsrMatrix<f32>>),
    F64(Arc<CsrMatrix<f64>>),
    Cf32(Arc<CsrMatrix<num_complex::Complex32>>),
    Cf64(Arc<CsrMatrix<Complex64>>),
}

/// Generic operation over whichever scalar kind a Hamiltonian holds.
pub trait HamiltonianVisitor {
    type Output;
    fn visit<T: Scalar>(self, matrix: &Arc<CsrMatrix<T>>) -> Self::Output;
}

impl Hamiltonian {
    /// Build the Hamiltonian of `system` in the scalar kind `tag`.
    ///
    /// # Errors
    ///
    /// Propagates modifier failures; [`TbError::UnsupportedScalar`] if a
    /// Bloch phase would be applied to a real matrix.
    pub fn build(
        system: &System,
        modifiers: &ModifierSet,
        wave_vector: Cartesian,
        tag: ScalarTag,
    ) -> Result<Self> {
        let h = match tag {
            ScalarTag::F32 => Self::F32(Arc::new(build_matrix(system, modifiers, wave_vector)?)),
            ScalarTag::F64 => Self::F64(Arc::new(build_matrix(system, modifiers, wave_vector)?)),
            ScalarTag::Cf32 => Self::Cf32(Arc::new(build_matrix(system, modifiers, wave_vector)?)),
            ScalarTag::Cf64 => Self::Cf64(Arc::new(build_matrix(system, modifiers, wave_vector)?)),
        };
        debug!(rows = h.rows(), nnz = h.nnz(), scalar = %tag, "hamiltonian built");
        Ok(h)
    }

    pub fn accept<V: HamiltonianVisitor>(&self, visitor: V) -> V::Output {
        match self {
            Self::F32(m) => visitor.visit(m),
            Self::F64(m) => visitor.visit(m),
            Self::Cf32(m) => visitor.visit(m),
            Self::Cf64(m) => visitor.visit(m),
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
    pub const fn is_complex(&self) -> bool {
        self.tag().is_complex()
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::F32(m) => m.rows,
            Self::F64(m) => m.rows,
            Self::Cf32(m) => m.rows,
            Self::Cf64(m) => m.rows,
        }
    }

    /// Number of stored non-zero elements (both triangles).
    #[must_use]
    pub fn nnz(&self) -> usize {
        match self {
            Self::F32(m) => m.nnz(),
            Self::F64(m) => m.nnz(),
            Self::Cf32(m) => m.nnz(),
            Self::Cf64(m) => m.nnz(),
        }
    }

    /// Typed access; fails if the matrix holds another scalar kind.
    ///
    /// # Errors
    ///
    /// [`TbError::UnsupportedScalar`] on a tag mismatch.
    pub fn matrix<T: Scalar>(&self) -> Result<&CsrMatrix<T>> {
        let any: &dyn Any = match self {
            Self::F32(m) => m.as_ref(),
            Self::F64(m) => m.as_ref(),
            Self::Cf32(m) => m.as_ref(),
            Self::Cf64(m) => m.as_ref(),
        };
        any.downcast_ref()
            .ok_or_else(|| TbError::unsupported(&format!("{} matrix access", T::TAG), self.tag()))
    }

    /// Widened copy in double-precision complex.
    #[must_use]
    pub fn to_complex(&self) -> CsrMatrix<Complex64> {
        struct Widen;
        impl HamiltonianVisitor for Widen {
            type Output = CsrMatrix<Complex64>;
            fn visit<T: Scalar>(self, matrix: &Arc<CsrMatrix<T>>) -> Self::Output {
                matrix.map(Scalar::to_complex)
            }
        }
        self.accept(Widen)
    }
}

fn build_matrix<T: Scalar>(
    system: &System,
    modifiers: &ModifierSet,
    wave_vector: Cartesian,
) -> Result<CsrMatrix<T>> {
    let lattice = system.lattice();
    let n = system.num_sites();
    let mut triplets: Vec<(usize, usize, T)> = Vec::with_capacity(n * system.max_elements_per_site);

    if lattice.has_onsite_energy() || modifiers.has_onsite() {
        let mut onsite: Vec<T> = system
            .sublattices
            .iter()
            .map(|&s| T::from_real(lattice.sublattice(s).onsite))
            .collect();
        for modifier in &modifiers.onsite {
            modifier.apply(&mut T::wrap_mut(&mut onsite), &system.positions, &system.sublattices)?;
        }
        triplets.extend(onsite.into_iter().enumerate().map(|(i, v)| (i, i, v)));
    }

    let positions = &system.positions;
    push_hoppings(
        &mut triplets,
        lattice,
        &system.hoppings,
        |i, j| (positions[i], positions[j]),
        Complex64::one(),
        modifiers,
    )?;

    for boundary in &system.boundaries {
        let phase = Complex64::from_polar(1.0, -wave_vector.dot(&boundary.shift));
        if !T::TAG.is_complex() && phase.im != 0.0 {
            return Err(TbError::unsupported("Bloch phase", T::TAG));
        }
        push_hoppings(
            &mut triplets,
            lattice,
            &boundary.hoppings,
            |i, j| boundary.position_pair(positions, i, j),
            phase,
            modifiers,
        )?;
    }

    Ok(CsrMatrix::from_triplets(n, n, triplets))
}

/// Expand stored bonds into both triangles, after the hopping modifiers.
fn push_hoppings<T: Scalar>(
    triplets: &mut Vec<(usize, usize, T)>,
    lattice: &Lattice,
    bonds: &CsrMatrix<HopEntry>,
    position_pair: impl Fn(usize, usize) -> (Cartesian, Cartesian),
    phase: Complex64,
    modifiers: &ModifierSet,
) -> Result<()> {
    let entries: Vec<(usize, usize, HopEntry)> = bonds.triplets().collect();
    if entries.is_empty() {
        return Ok(());
    }

    let mut energy: Vec<T> = entries
        .iter()
        .map(|(_, _, hop)| {
            let e = lattice.hopping_energy(hop.id);
            T::from_complex(if hop.conjugate { e.conj() } else { e })
        })
        .collect();

    if !modifiers.hopping.is_empty() {
        let (pos_from, pos_to): (Vec<Cartesian>, Vec<Cartesian>) =
            entries.iter().map(|&(i, j, _)| position_pair(i, j)).unzip();
        let ids: Vec<HopId> = entries.iter().map(|(_, _, hop)| hop.id).collect();
        for modifier in &modifiers.hopping {
            modifier.apply(&mut T::wrap_mut(&mut energy), &pos_from, &pos_to, &ids)?;
        }
    }

    let unit = phase == Complex64::one();
    for ((i, j, _), value) in entries.into_iter().zip(energy) {
        let value = if unit {
            value
        } else {
            T::from_complex(value.to_complex() * phase)
        };
        triplets.push((i, j, value));
        triplets.push((j, i, value.conj()));
    }
    Ok(())
}
