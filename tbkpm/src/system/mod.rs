// SPDX-License-Identifier: AGPL-3.0-only

//! Built finite system: compact sites, bulk hoppings and periodic boundaries.
//!
//! ## Build stages
//!
//! ```text
//! Foundation ─▶ state modifiers ─▶ prune ─▶ position modifiers
//!     ─▶ HamiltonianIndices ─▶ bulk + boundary hoppings ─▶ generators
//! ```
//!
//! Hoppings are stored once per bond, in the upper triangle of a CSR matrix
//! of [`HopEntry`]; the Hamiltonian builder mirrors them into the lower
//! triangle.

pub mod foundation;
pub mod modifiers;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{Result, TbError};
use crate::lattice::symmetry::TranslationalSymmetry;
use crate::lattice::{Cartesian, HopId, Index3D, Lattice, SubId};
use crate::sparse::CsrMatrix;
use foundation::{Foundation, HamiltonianIndices};
use modifiers::ModifierSet;

/// Stored bond: which registered energy, and whether it is used conjugated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopEntry {
    pub id: HopId,
    pub conjugate: bool,
}

/// Bonds that leave the system and re-enter on the opposite side.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Translation from the actual neighbor position to its periodic image inside the system.
    pub shift: Cartesian,
    /// Cell offset corresponding to `shift`.
    pub cell_shift: Index3D,
    pub hoppings: CsrMatrix<HopEntry>,
    pub max_elements_per_site: usize,
}

impl Boundary {
    /// Positions of the two ends of bond `(i, j)`, `j` taken at its actual (unwrapped) location.
    #[must_use]
    pub fn position_pair(&self, positions: &[Cartesian], i: usize, j: usize) -> (Cartesian, Cartesian) {
        (positions[i], positions[j] - self.shift)
    }
}

/// Finite tight-binding system.
#[derive(Debug, Clone)]
pub struct System {
    lattice: Lattice,
    pub positions: Vec<Cartesian>,
    /// Sublattice identity of every site (alias-resolved).
    pub sublattices: Vec<SubId>,
    pub hoppings: CsrMatrix<HopEntry>,
    pub boundaries: Vec<Boundary>,
    pub max_elements_per_site: usize,
    report: String,
}

impl System {
    /// Assemble a system from a pruned foundation.
    ///
    /// # Errors
    ///
    /// [`TbError::State`] if no valid site remains, [`TbError::Configuration`]
    /// if a hopping generator is unregistered or returns bad indices.
    pub fn build(
        lattice: &Lattice,
        mut foundation: Foundation,
        symmetry: Option<&TranslationalSymmetry>,
        modifiers: &ModifierSet,
    ) -> Result<Self> {
        let timer = Instant::now();

        let alias_ids: Vec<SubId> = foundation
            .sublattices()
            .iter()
            .map(|&s| lattice.sublattice(s).alias)
            .collect();

        for modifier in &modifiers.state {
            let positions = foundation.positions().to_vec();
            modifier.apply(foundation.states_mut(), &positions, &alias_ids);
            foundation.remove_dangling(lattice, modifier.min_neighbors());
        }
        for modifier in &modifiers.position {
            modifier.apply(foundation.positions_mut(), &alias_ids);
        }

        let indices = HamiltonianIndices::new(&foundation);
        let num_sites = indices.num_valid_sites();
        if num_sites == 0 {
            return Err(TbError::State(
                "impossible system: 0 sites remain after construction".into(),
            ));
        }

        let mut positions = Vec::with_capacity(num_sites);
        let mut sublattices = Vec::with_capacity(num_sites);
        for idx in 0..foundation.num_sites() {
            if indices.get(idx).is_some() {
                positions.push(foundation.positions()[idx]);
                sublattices.push(alias_ids[idx]);
            }
        }

        let hoppings = assemble_bulk(lattice, &foundation, &indices);
        let boundaries = match symmetry {
            Some(symmetry) => assemble_boundaries(lattice, &foundation, &indices, symmetry),
            None => Vec::new(),
        };

        let mut system = Self {
            lattice: lattice.clone(),
            positions,
            sublattices,
            hoppings,
            boundaries,
            max_elements_per_site: lattice.max_hoppings() + 1,
            report: String::new(),
        };

        for generator in &modifiers.generators {
            system.apply_generator(generator)?;
        }

        system.report = system.make_report(timer.elapsed().as_secs_f64());
        info!(
            sites = system.num_sites(),
            hoppings = system.hoppings.nnz(),
            boundaries = system.boundaries.len(),
            "system built"
        );
        Ok(system)
    }

    fn apply_generator(&mut self, generator: &modifiers::HoppingGenerator) -> Result<()> {
        let id = self.lattice.hopping_id(generator.name())?;
        let (from, to) = generator.generate(&self.positions, &self.sublattices);
        if from.len() != to.len() {
            return Err(TbError::config(format!(
                "hopping generator '{}' returned {} 'from' and {} 'to' indices",
                generator.name(),
                from.len(),
                to.len()
            )));
        }

        let n = self.num_sites();
        let mut triplets: Vec<(usize, usize, HopEntry)> = self.hoppings.triplets().collect();
        for (&i, &j) in from.iter().zip(&to) {
            if i >= n || j >= n {
                return Err(TbError::config(format!(
                    "hopping generator '{}' index ({i}, {j}) out of range for {n} sites",
                    generator.name()
                )));
            }
            if i == j {
                debug!(site = i, generator = generator.name(), "skipping generated self-bond");
                continue;
            }
            triplets.push((
                i.min(j),
                i.max(j),
                HopEntry {
                    id,
                    conjugate: i > j,
                },
            ));
        }
        // generated bonds replace existing entries at the same position
        self.hoppings = CsrMatrix::from_triplets_with(n, n, triplets, |_, new| new);
        self.max_elements_per_site = self.max_elements_per_site.max(self.hoppings.max_row_len() + 1);
        Ok(())
    }

    #[must_use]
    pub fn num_sites(&self) -> usize {
        self.positions.len()
    }

    /// Lattice the system was built from, including generator energies.
    #[must_use]
    pub const fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    /// Index of the site closest to `position`, optionally restricted to one sublattice.
    #[must_use]
    pub fn find_nearest(&self, position: Cartesian, sublattice: Option<SubId>) -> Option<usize> {
        self.positions
            .iter()
            .zip(&self.sublattices)
            .enumerate()
            .filter(|(_, (_, s))| sublattice.map_or(true, |target| **s == target))
            .map(|(i, (p, _))| (i, (p - position).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Human-readable build diagnostics.
    #[must_use]
    pub fn report(&self) -> &str {
        &self.report
    }

    fn make_report(&self, seconds: f64) -> String {
        let mut s = String::new();
        let boundary_hoppings: usize = self.boundaries.iter().map(|b| b.hoppings.nnz()).sum();
        let _ = write!(
            s,
            "Built system with {} lattice sites, {} hoppings",
            self.num_sites(),
            self.hoppings.nnz()
        );
        if !self.boundaries.is_empty() {
            let _ = write!(
                s,
                ", {} boundaries ({} hoppings)",
                self.boundaries.len(),
                boundary_hoppings
            );
        }
        let _ = write!(s, " in {seconds:.3}s");
        s
    }
}

/// Bulk bonds, each recorded once from its lower compact-index end.
fn assemble_bulk(
    lattice: &Lattice,
    foundation: &Foundation,
    indices: &HamiltonianIndices,
) -> CsrMatrix<HopEntry> {
    let n = indices.num_valid_sites();
    let mut triplets = Vec::new();
    for idx in 0..foundation.num_sites() {
        let Some(row) = indices.get(idx) else {
            continue;
        };
        let sublattice = lattice.sublattice(foundation.sublattices()[idx]);
        for term in &sublattice.hoppings {
            let Some(col) = foundation.neighbor(idx, term).and_then(|j| indices.get(j)) else {
                continue;
            };
            if col > row {
                triplets.push((
                    row,
                    col,
                    HopEntry {
                        id: term.hopping_id,
                        conjugate: term.is_conjugate,
                    },
                ));
            }
        }
    }
    CsrMatrix::from_triplets_with(n, n, triplets, |_, new| new)
}

/// Bonds that wrap around periodic directions, grouped by cell shift.
fn assemble_boundaries(
    lattice: &Lattice,
    foundation: &Foundation,
    indices: &HamiltonianIndices,
    symmetry: &TranslationalSymmetry,
) -> Vec<Boundary> {
    let n = indices.num_valid_sites();
    let size = foundation.size();
    let mut groups: BTreeMap<Index3D, Vec<(usize, usize, HopEntry)>> = BTreeMap::new();

    for idx in 0..foundation.num_sites() {
        let Some(row) = indices.get(idx) else {
            continue;
        };
        let sublattice = lattice.sublattice(foundation.sublattices()[idx]);
        for term in sublattice.hoppings.iter().filter(|t| !t.is_conjugate) {
            let cell = foundation.target_cell(idx, term);
            if foundation.in_bounds(cell) {
                continue;
            }
            let Some((wrapped, _)) = symmetry.wrap(cell, size) else {
                continue;
            };
            let j = foundation.site_index(wrapped, term.to_sublattice);
            let Some(col) = indices.get(j) else {
                continue;
            };
            let cell_shift: Index3D = std::array::from_fn(|k| wrapped[k] - cell[k]);
            groups.entry(cell_shift).or_default().push((
                row,
                col,
                HopEntry {
                    id: term.hopping_id,
                    conjugate: false,
                },
            ));
        }
    }

    groups
        .into_iter()
        .map(|(cell_shift, triplets)| {
            let hoppings = CsrMatrix::from_triplets_with(n, n, triplets, |_, new| new);
            let mut shift = Cartesian::zeros();
            for (k, v) in lattice.vectors().iter().enumerate() {
                shift += v * f64::from(cell_shift[k]);
            }
            Boundary {
                shift,
                cell_shift,
                max_elements_per_site: hoppings.max_row_len(),
                hoppings,
            }
        })
        .collect()
}
