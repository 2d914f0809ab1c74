// SPDX-License-Identifier: AGPL-3.0-only

//! Candidate sites of a finite system and their compact numbering.
//!
//! The foundation is a dense box of unit cells covering the shape. Every
//! (sublattice, cell) pair is a site with a fixed raster index:
//!
//! ```text
//! idx = ((sub · size_c + c) · size_b + b) · size_a + a
//! ```
//!
//! so the index order is deterministic and pruning results are reproducible.

use tracing::debug;

use crate::error::{Result, TbError};
use crate::lattice::shape::{Primitive, Shape};
use crate::lattice::{Cartesian, HoppingTerm, Index3D, Lattice, SubId};

/// Dense site box with positions, sublattice ids and validity flags.
#[derive(Debug, Clone)]
pub struct Foundation {
    bounds: (Index3D, Index3D),
    size: Index3D,
    num_sublattices: usize,
    positions: Vec<Cartesian>,
    sublattices: Vec<SubId>,
    is_valid: Vec<bool>,
}

impl Foundation {
    /// Sites of `lattice` inside `shape`, with dangling sites pruned.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if the shape's mask does not have one
    /// entry per candidate site.
    pub fn new(lattice: &Lattice, shape: &dyn Shape) -> Result<Self> {
        let bounds = find_bounds(shape, lattice);
        let mut foundation = Self::generate(lattice, bounds);
        let mask = shape.contains(&foundation.positions);
        if mask.len() != foundation.positions.len() {
            return Err(TbError::config(format!(
                "shape returned {} flags for {} candidate sites",
                mask.len(),
                foundation.positions.len()
            )));
        }
        foundation.is_valid = mask;
        foundation.remove_dangling(lattice, lattice.min_neighbors());
        debug!(
            sites = foundation.num_sites(),
            valid = foundation.num_valid(),
            size = ?foundation.size,
            "foundation from shape"
        );
        Ok(foundation)
    }

    /// Every site of a `primitive` block of cells; no pruning.
    pub fn from_primitive(lattice: &Lattice, primitive: Primitive) -> Self {
        let mut lower = [0i32; 3];
        let mut upper = [0i32; 3];
        for n in 0..lattice.ndim() {
            let size = primitive.size[n] as i32;
            lower[n] = -size / 2;
            upper[n] = lower[n] + size - 1;
        }
        let foundation = Self::generate(lattice, (lower, upper));
        debug!(sites = foundation.num_sites(), size = ?foundation.size, "foundation from primitive");
        foundation
    }

    fn generate(lattice: &Lattice, bounds: (Index3D, Index3D)) -> Self {
        let (lower, upper) = bounds;
        let size: Index3D = std::array::from_fn(|n| (upper[n] - lower[n] + 1).max(0));
        let num_sublattices = lattice.num_sublattices();
        let num_sites = cell_count(size) * num_sublattices;

        let vector = |n: usize| lattice.vectors().get(n).copied().unwrap_or_else(Cartesian::zeros);
        let mut origin = lattice.offset();
        for n in 0..lattice.ndim() {
            origin += vector(n) * f64::from(lower[n]);
        }

        // partial sums are reused across the nested loops
        let mut positions = Vec::with_capacity(num_sites);
        let mut sublattices = Vec::with_capacity(num_sites);
        for (s, sublattice) in lattice.sublattices().iter().enumerate() {
            let ps = origin + sublattice.position;
            for c in 0..size[2] {
                let pc = ps + vector(2) * f64::from(c);
                for b in 0..size[1] {
                    let pb = pc + vector(1) * f64::from(b);
                    for a in 0..size[0] {
                        positions.push(pb + vector(0) * f64::from(a));
                        sublattices.push(s as SubId);
                    }
                }
            }
        }

        Self {
            bounds,
            size,
            num_sublattices,
            positions,
            sublattices,
            is_valid: vec![true; num_sites],
        }
    }

    #[must_use]
    pub fn num_sites(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn num_valid(&self) -> usize {
        self.is_valid.iter().filter(|&&v| v).count()
    }

    /// Inclusive lower and upper cell indices of the box.
    #[must_use]
    pub const fn bounds(&self) -> (Index3D, Index3D) {
        self.bounds
    }

    /// Number of cells along each lattice vector.
    #[must_use]
    pub const fn size(&self) -> Index3D {
        self.size
    }

    #[must_use]
    pub fn positions(&self) -> &[Cartesian] {
        &self.positions
    }

    /// Own (non-aliased) sublattice id of every site.
    #[must_use]
    pub fn sublattices(&self) -> &[SubId] {
        &self.sublattices
    }

    #[must_use]
    pub fn is_valid(&self) -> &[bool] {
        &self.is_valid
    }

    pub(crate) fn positions_mut(&mut self) -> &mut [Cartesian] {
        &mut self.positions
    }

    pub(crate) fn states_mut(&mut self) -> &mut [bool] {
        &mut self.is_valid
    }

    /// Raster index of `sub` in the box cell `cell` (0-based).
    #[must_use]
    pub fn site_index(&self, cell: Index3D, sub: SubId) -> usize {
        let [sa, sb, sc] = self.size.map(|s| s as usize);
        let [a, b, c] = cell.map(|x| x as usize);
        ((usize::from(sub) * sc + c) * sb + b) * sa + a
    }

    /// Box cell (0-based) of a raster index.
    #[must_use]
    pub fn cell_index(&self, idx: usize) -> Index3D {
        let [sa, sb, sc] = self.size.map(|s| s as usize);
        [
            (idx % sa) as i32,
            ((idx / sa) % sb) as i32,
            ((idx / (sa * sb)) % sc) as i32,
        ]
    }

    /// Cell reached from site `idx` by a hopping term, whether in range or not.
    #[must_use]
    pub fn target_cell(&self, idx: usize, term: &HoppingTerm) -> Index3D {
        let cell = self.cell_index(idx);
        std::array::from_fn(|n| cell[n] + term.relative_index[n])
    }

    #[must_use]
    pub fn in_bounds(&self, cell: Index3D) -> bool {
        (0..3).all(|n| (0..self.size[n]).contains(&cell[n]))
    }

    /// Raster index of the neighbor of `idx` along `term`, if inside the box.
    #[must_use]
    pub fn neighbor(&self, idx: usize, term: &HoppingTerm) -> Option<usize> {
        let cell = self.target_cell(idx, term);
        self.in_bounds(cell)
            .then(|| self.site_index(cell, term.to_sublattice))
    }

    /// Count of in-box neighbors of every site, ignoring validity.
    fn count_neighbors(&self, lattice: &Lattice) -> Vec<usize> {
        (0..self.num_sites())
            .map(|idx| {
                let sub = lattice.sublattice(self.sublattices[idx]);
                sub.hoppings
                    .iter()
                    .filter(|term| self.neighbor(idx, term).is_some())
                    .count()
            })
            .collect()
    }

    /// Invalidate sites with fewer than `min_neighbors` valid neighbors until none remain.
    ///
    /// Worklist propagation: each invalidated site is queued once and, when
    /// processed, withdraws itself from its still-valid neighbors' counts.
    pub fn remove_dangling(&mut self, lattice: &Lattice, min_neighbors: usize) {
        if self.num_sublattices == 0 {
            return;
        }
        let mut count = self.count_neighbors(lattice);

        let mut worklist: Vec<usize> = Vec::new();
        for idx in 0..self.num_sites() {
            if !self.is_valid[idx] {
                worklist.push(idx);
            } else if count[idx] < min_neighbors {
                self.is_valid[idx] = false;
                worklist.push(idx);
            }
        }

        let before = self.num_valid();
        while let Some(idx) = worklist.pop() {
            if count[idx] == 0 {
                continue;
            }
            let sub = lattice.sublattice(self.sublattices[idx]);
            for term in &sub.hoppings {
                let Some(neighbor) = self.neighbor(idx, term) else {
                    continue;
                };
                if !self.is_valid[neighbor] {
                    continue;
                }
                count[neighbor] -= 1;
                if count[neighbor] < min_neighbors {
                    self.is_valid[neighbor] = false;
                    worklist.push(neighbor);
                }
            }
            count[idx] = 0;
        }
        debug!(
            removed = before - self.num_valid(),
            min_neighbors, "dangling sites removed"
        );
    }

    /// Number of valid neighbors of a site (for postcondition checks).
    #[must_use]
    pub fn valid_neighbors(&self, lattice: &Lattice, idx: usize) -> usize {
        lattice
            .sublattice(self.sublattices[idx])
            .hoppings
            .iter()
            .filter_map(|term| self.neighbor(idx, term))
            .filter(|&n| self.is_valid[n])
            .count()
    }
}

fn cell_count(size: Index3D) -> usize {
    size.iter().map(|&s| s as usize).product()
}

/// Cell box covering the shape vertices, padded by one cell along each lattice direction.
fn find_bounds(shape: &dyn Shape, lattice: &Lattice) -> (Index3D, Index3D) {
    let mut lower = [i32::MAX; 3];
    let mut upper = [i32::MIN; 3];
    for vertex in shape.vertices() {
        let v = lattice.translate_coordinates(*vertex);
        for n in 0..3 {
            // truncation toward zero, compensated by the padding below
            let x = v[n] as i32;
            lower[n] = lower[n].min(x);
            upper[n] = upper[n].max(x);
        }
    }
    if shape.vertices().is_empty() {
        lower = [0; 3];
        upper = [0; 3];
    }

    for n in 0..lattice.ndim() {
        lower[n] -= 1;
        upper[n] += 1;
    }
    (lower, upper)
}

/// Compact 0-based numbering of the valid foundation sites, in raster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HamiltonianIndices {
    indices: Vec<Option<usize>>,
    num_valid_sites: usize,
}

impl HamiltonianIndices {
    #[must_use]
    pub fn new(foundation: &Foundation) -> Self {
        let mut num_valid_sites = 0;
        let indices = foundation
            .is_valid()
            .iter()
            .map(|&valid| {
                valid.then(|| {
                    num_valid_sites += 1;
                    num_valid_sites - 1
                })
            })
            .collect();
        Self {
            indices,
            num_valid_sites,
        }
    }

    /// Compact index of a foundation site, `None` if the site is invalid.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<usize> {
        self.indices[idx]
    }

    #[must_use]
    pub const fn num_valid_sites(&self) -> usize {
        self.num_valid_sites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::shape::{Circle, FreeformShape, Rectangle};

    fn chain() -> Lattice {
        let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).unwrap();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.add_hopping([1, 0, 0], "A", "A", -1.0).unwrap();
        lattice
    }

    fn square() -> Lattice {
        let mut lattice =
            Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)]).unwrap();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.add_hopping([1, 0, 0], "A", "A", -1.0).unwrap();
        lattice.add_hopping([0, 1, 0], "A", "A", -1.0).unwrap();
        lattice
    }

    #[test]
    fn primitive_bounds_are_centered() {
        let f = Foundation::from_primitive(&square(), Primitive::new(3, 2, 7));
        // third size is ignored for a 2D lattice
        assert_eq!(f.size(), [3, 2, 1]);
        assert_eq!(f.bounds(), ([-1, -1, 0], [1, 0, 0]));
        assert_eq!(f.num_sites(), 6);
        assert!(f.is_valid().iter().all(|&v| v));
    }

    #[test]
    fn raster_index_round_trip() {
        let mut lattice = square();
        lattice.add_sublattice("B", Cartesian::new(0.5, 0.5, 0.0), 0.0, None).unwrap();
        let f = Foundation::from_primitive(&lattice, Primitive::new(3, 2, 1));
        let idx = f.site_index([2, 1, 0], 1);
        // ((sub · 1 + c) · 2 + b) · 3 + a
        assert_eq!(idx, 11);
        assert_eq!(f.cell_index(idx), [2, 1, 0]);
        assert_eq!(f.sublattices()[idx], 1);
        let expected = lattice.calc_position([1, 0, 0], 1);
        assert!((f.positions()[idx] - expected).norm() < 1e-12);
    }

    #[test]
    fn shape_bounds_cover_vertices_with_padding() {
        let f = Foundation::new(&square(), &Rectangle::new(2.0, 2.0)).unwrap();
        assert_eq!(f.bounds(), ([-2, -2, 0], [2, 2, 0]));
        assert_eq!(f.num_valid(), 9);
    }

    #[test]
    fn chain_prunes_nothing_with_one_neighbor() {
        // a line of 5 sites: the ends have one neighbor each
        let lattice = chain();
        let shape = crate::lattice::shape::Line::new(
            Cartesian::new(-2.0, 0.0, 0.0),
            Cartesian::new(2.0, 0.0, 0.0),
        );
        let f = Foundation::new(&lattice, &shape).unwrap();
        assert_eq!(f.num_valid(), 5);
    }

    #[test]
    fn chain_collapses_with_two_neighbors() {
        // every site has at most two neighbors and the ends have one,
        // so the invalidation propagates through the whole chain
        let lattice = chain().with_min_neighbors(2);
        let shape = crate::lattice::shape::Line::new(
            Cartesian::new(-500.0, 0.0, 0.0),
            Cartesian::new(500.0, 0.0, 0.0),
        );
        let f = Foundation::new(&lattice, &shape).unwrap();
        assert_eq!(f.num_valid(), 0);
    }

    #[test]
    fn pruned_sites_satisfy_min_neighbors() {
        // 13 sites: a 3×3 block and four tips with one neighbor each
        let lattice = square().with_min_neighbors(2);
        let f = Foundation::new(&lattice, &Circle::new(2.05, Cartesian::zeros())).unwrap();
        assert_eq!(f.num_valid(), 9);
        for idx in 0..f.num_sites() {
            if f.is_valid()[idx] {
                assert!(f.valid_neighbors(&lattice, idx) >= 2, "site {idx}");
            }
        }
    }

    #[test]
    fn mask_length_must_match_the_sites() {
        let shape = FreeformShape::with_box(
            |_| vec![true],
            Cartesian::new(3.0, 3.0, 0.0),
            Cartesian::zeros(),
        );
        let err = Foundation::new(&square(), &shape).unwrap_err();
        assert!(matches!(err, TbError::Configuration(_)), "{err}");
    }

    #[test]
    fn indices_are_compact_and_ordered() {
        let mut f = Foundation::from_primitive(&square(), Primitive::new(2, 2, 1));
        f.states_mut()[1] = false;
        let indices = HamiltonianIndices::new(&f);
        assert_eq!(indices.num_valid_sites(), 3);
        assert_eq!(indices.get(0), Some(0));
        assert_eq!(indices.get(1), None);
        assert_eq!(indices.get(2), Some(1));
        assert_eq!(indices.get(3), Some(2));
    }
}
