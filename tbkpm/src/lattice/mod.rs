// SPDX-License-Identifier: AGPL-3.0-only

//! Periodic crystal description.
//!
//! A [`Lattice`] holds up to three primitive vectors, an ordered list of
//! sublattices (sites of the unit cell) and the hopping terms between them.
//! Hopping energies are registered by name and referenced by a compact
//! [`HopId`]; every hopping term is stored twice, once on each endpoint,
//! with the second copy flagged as the Hermitian conjugate.
//!
//! ```text
//! Lattice
//!   ├─ vectors:     a1, a2, a3            (Cartesian)
//!   ├─ sublattices: A, B, ...             (SubId = u8)
//!   │     └─ hoppings: [(offset, to, HopId, conjugate)]
//!   └─ energies:    t1, t2, __anonymous_0 (HopId = u8)
//! ```

pub mod shape;
pub mod symmetry;

use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;
use tracing::debug;

use crate::error::{Result, TbError};
use crate::tolerances::{DEGENERATE_VECTORS, OFFSET_SLACK};

/// Cartesian position or displacement.
pub type Cartesian = Vector3<f64>;

/// Integer lattice-vector coordinates of a unit cell.
pub type Index3D = [i32; 3];

/// Sublattice identifier.
pub type SubId = u8;

/// Registered hopping energy identifier.
pub type HopId = u8;

const MAX_SUBLATTICES: usize = SubId::MAX as usize + 1;
const MAX_HOPPINGS: usize = HopId::MAX as usize + 1;
const ANONYMOUS_PREFIX: &str = "__anonymous_";

/// One directed hopping from the owning sublattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoppingTerm {
    /// Cell offset of the target site.
    pub relative_index: Index3D,
    pub to_sublattice: SubId,
    pub hopping_id: HopId,
    /// Set on the copy registered at the `to` end.
    pub is_conjugate: bool,
}

/// A site of the unit cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Sublattice {
    pub name: String,
    /// Position relative to the cell origin.
    pub position: Cartesian,
    pub onsite: f64,
    /// Identity shared with another sublattice; equals the own id if not aliased.
    pub alias: SubId,
    pub hoppings: Vec<HoppingTerm>,
}

#[derive(Debug, Clone, PartialEq)]
struct HoppingEnergy {
    name: String,
    energy: Complex64,
    anonymous: bool,
}

/// Periodic crystal: primitive vectors, sublattices, hopping energies and terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    vectors: Vec<Cartesian>,
    sublattices: Vec<Sublattice>,
    energies: Vec<HoppingEnergy>,
    offset: Cartesian,
    min_neighbors: usize,
}

impl Lattice {
    /// Create a lattice from 1 to 3 linearly independent primitive vectors.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an empty or oversized vector list,
    /// [`TbError::Geometry`] for zero or collinear vectors.
    pub fn new(vectors: &[Cartesian]) -> Result<Self> {
        if vectors.is_empty() || vectors.len() > 3 {
            return Err(TbError::config(format!(
                "a lattice needs 1 to 3 primitive vectors, got {}",
                vectors.len()
            )));
        }

        let gram = gram_matrix(vectors);
        let norms: f64 = vectors.iter().map(|v| v.norm_squared()).product();
        if norms == 0.0 || gram.determinant() / norms < DEGENERATE_VECTORS {
            return Err(TbError::Geometry(
                "primitive vectors must be non-zero and linearly independent".into(),
            ));
        }

        Ok(Self {
            vectors: vectors.to_vec(),
            sublattices: Vec::new(),
            energies: Vec::new(),
            offset: Cartesian::zeros(),
            min_neighbors: 1,
        })
    }

    #[must_use]
    pub fn vectors(&self) -> &[Cartesian] {
        &self.vectors
    }

    /// Number of primitive vectors.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn sublattices(&self) -> &[Sublattice] {
        &self.sublattices
    }

    #[must_use]
    pub fn sublattice(&self, id: SubId) -> &Sublattice {
        &self.sublattices[usize::from(id)]
    }

    #[must_use]
    pub fn num_sublattices(&self) -> usize {
        self.sublattices.len()
    }

    /// Look up a sublattice id by name.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if no sublattice has that name.
    pub fn sublattice_id(&self, name: &str) -> Result<SubId> {
        self.sublattices
            .iter()
            .position(|s| s.name == name)
            .map(|i| i as SubId)
            .ok_or_else(|| TbError::config(format!("unknown sublattice '{name}'")))
    }

    /// Add a site to the unit cell.
    ///
    /// An aliased sublattice shares the identity and onsite energy of its
    /// alias target; only the position and hoppings are its own.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an empty or duplicate name, an unknown
    /// alias, or more than 256 sublattices.
    pub fn add_sublattice(
        &mut self,
        name: &str,
        position: Cartesian,
        onsite: f64,
        alias: Option<&str>,
    ) -> Result<SubId> {
        if name.is_empty() {
            return Err(TbError::config("sublattice name can't be blank"));
        }
        if self.sublattices.iter().any(|s| s.name == name) {
            return Err(TbError::config(format!("sublattice '{name}' already exists")));
        }
        if self.sublattices.len() >= MAX_SUBLATTICES {
            return Err(TbError::config(format!(
                "exceeded maximum number of unique sublattices: {MAX_SUBLATTICES}"
            )));
        }

        let id = self.sublattices.len() as SubId;
        let (alias, onsite) = match alias {
            Some(target) => {
                let target_id = self.sublattice_id(target)?;
                (target_id, self.sublattice(target_id).onsite)
            }
            None => (id, onsite),
        };

        self.sublattices.push(Sublattice {
            name: name.to_string(),
            position,
            onsite,
            alias,
            hoppings: Vec::new(),
        });
        Ok(id)
    }

    /// Whether any sublattice carries a non-zero onsite energy.
    #[must_use]
    pub fn has_onsite_energy(&self) -> bool {
        self.sublattices.iter().any(|s| s.onsite != 0.0)
    }

    /// Register a named hopping energy.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an empty or duplicate name or more than
    /// 256 registered energies.
    pub fn register_hopping_energy(
        &mut self,
        name: &str,
        energy: impl Into<Complex64>,
    ) -> Result<HopId> {
        if name.is_empty() {
            return Err(TbError::config("hopping name can't be blank"));
        }
        if self.energies.iter().any(|e| e.name == name) {
            return Err(TbError::config(format!("hopping '{name}' already exists")));
        }
        self.push_energy(name.to_string(), energy.into(), false)
    }

    fn push_energy(&mut self, name: String, energy: Complex64, anonymous: bool) -> Result<HopId> {
        if self.energies.len() >= MAX_HOPPINGS {
            return Err(TbError::config(format!(
                "exceeded maximum number of unique hoppings energies: {MAX_HOPPINGS}"
            )));
        }
        let id = self.energies.len() as HopId;
        self.energies.push(HoppingEnergy {
            name,
            energy,
            anonymous,
        });
        Ok(id)
    }

    /// Look up a hopping id by name.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if no hopping energy has that name.
    pub fn hopping_id(&self, name: &str) -> Result<HopId> {
        self.energies
            .iter()
            .position(|e| e.name == name)
            .map(|i| i as HopId)
            .ok_or_else(|| TbError::config(format!("unknown hopping '{name}'")))
    }

    #[must_use]
    pub fn hopping_name(&self, id: HopId) -> &str {
        &self.energies[usize::from(id)].name
    }

    #[must_use]
    pub fn hopping_energy(&self, id: HopId) -> Complex64 {
        self.energies[usize::from(id)].energy
    }

    /// Registered energies indexed by [`HopId`].
    pub fn hopping_energies(&self) -> impl Iterator<Item = (&str, Complex64)> + '_ {
        self.energies.iter().map(|e| (e.name.as_str(), e.energy))
    }

    #[must_use]
    pub fn num_hopping_energies(&self) -> usize {
        self.energies.len()
    }

    #[must_use]
    pub fn has_complex_hoppings(&self) -> bool {
        self.energies.iter().any(|e| e.energy.im != 0.0)
    }

    /// Connect `from` in the home cell to `to` in the cell at `offset`.
    ///
    /// The conjugate term is registered on `to` with the negated offset.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for unknown names, a zero-offset hopping of
    /// a sublattice onto itself, or a term that already exists.
    pub fn add_registered_hopping(
        &mut self,
        offset: Index3D,
        from: &str,
        to: &str,
        name: &str,
    ) -> Result<()> {
        let hopping_id = self.hopping_id(name)?;
        let (from_id, to_id) = self.check_new_term(offset, from, to)?;

        self.sublattices[usize::from(from_id)].hoppings.push(HoppingTerm {
            relative_index: offset,
            to_sublattice: to_id,
            hopping_id,
            is_conjugate: false,
        });
        self.sublattices[usize::from(to_id)].hoppings.push(HoppingTerm {
            relative_index: offset.map(|x| -x),
            to_sublattice: from_id,
            hopping_id,
            is_conjugate: true,
        });
        debug!(from, to, ?offset, hopping = name, "registered hopping term");
        Ok(())
    }

    /// Sublattice ids of a term that may still be added.
    fn check_new_term(&self, offset: Index3D, from: &str, to: &str) -> Result<(SubId, SubId)> {
        let from_id = self.sublattice_id(from)?;
        let to_id = self.sublattice_id(to)?;
        if from_id == to_id && offset == [0, 0, 0] {
            return Err(TbError::config(format!(
                "hoppings from/to the same sublattice '{from}' must have a non-zero offset; \
                 use onsite energy instead"
            )));
        }
        let exists = self
            .sublattice(from_id)
            .hoppings
            .iter()
            .any(|h| h.relative_index == offset && h.to_sublattice == to_id);
        if exists {
            return Err(TbError::config(format!(
                "hopping {from} -> {to} at {offset:?} already exists"
            )));
        }
        Ok((from_id, to_id))
    }

    /// Connect two sublattices with an unnamed energy.
    ///
    /// Equal anonymous energies share a single registration.
    ///
    /// # Errors
    ///
    /// Same as [`Lattice::add_registered_hopping`], plus hopping-id overflow.
    pub fn add_hopping(
        &mut self,
        offset: Index3D,
        from: &str,
        to: &str,
        energy: impl Into<Complex64>,
    ) -> Result<()> {
        let energy = energy.into();
        self.check_new_term(offset, from, to)?;
        let name = match self
            .energies
            .iter()
            .find(|e| e.anonymous && e.energy == energy)
        {
            Some(existing) => existing.name.clone(),
            None => {
                let name = format!("{ANONYMOUS_PREFIX}{}", self.energies.len());
                self.push_energy(name.clone(), energy, true)?;
                name
            }
        };
        self.add_registered_hopping(offset, from, to, &name)
    }

    /// Largest number of hopping terms on any sublattice.
    #[must_use]
    pub fn max_hoppings(&self) -> usize {
        self.sublattices
            .iter()
            .map(|s| s.hoppings.len())
            .max()
            .unwrap_or(0)
    }

    /// Cartesian position of `sublattice` in the cell at `index`.
    #[must_use]
    pub fn calc_position(&self, index: Index3D, sublattice: SubId) -> Cartesian {
        let mut position = self.offset + self.sublattice(sublattice).position;
        for (n, v) in self.vectors.iter().enumerate() {
            position += v * f64::from(index[n]);
        }
        position
    }

    /// Express a Cartesian vector in lattice-vector coordinates.
    ///
    /// The component outside the span of the primitive vectors is discarded.
    #[must_use]
    pub fn translate_coordinates(&self, position: Cartesian) -> Cartesian {
        let ndim = self.ndim();
        let projections = Vector3::from_fn(|i, _| {
            self.vectors.get(i).map_or(0.0, |v| v.dot(&position))
        });
        let solved = gram_matrix(&self.vectors)
            .lu()
            .solve(&projections)
            .unwrap_or_else(Cartesian::zeros);
        Cartesian::from_fn(|i, _| if i < ndim { solved[i] } else { 0.0 })
    }

    #[must_use]
    pub const fn offset(&self) -> Cartesian {
        self.offset
    }

    /// Shift every site by `offset`.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if the offset exceeds half a lattice vector
    /// along any direction.
    pub fn set_offset(&mut self, offset: Cartesian) -> Result<()> {
        let coordinates = self.translate_coordinates(offset);
        if coordinates.iter().any(|c| c.abs() > 0.5 + OFFSET_SLACK) {
            return Err(TbError::config(format!(
                "lattice offset {:?} exceeds half a lattice vector",
                offset.as_slice()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    /// Builder form of [`Lattice::set_offset`].
    ///
    /// # Errors
    ///
    /// See [`Lattice::set_offset`].
    pub fn with_offset(mut self, offset: Cartesian) -> Result<Self> {
        self.set_offset(offset)?;
        Ok(self)
    }

    #[must_use]
    pub const fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }

    /// Sites with fewer valid neighbors than `k` are pruned from shaped systems.
    #[must_use]
    pub const fn with_min_neighbors(mut self, k: usize) -> Self {
        self.min_neighbors = k;
        self
    }
}

/// `G_ij = v_i · v_j`, padded with identity beyond the lattice dimension.
fn gram_matrix(vectors: &[Cartesian]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| match (vectors.get(i), vectors.get(j)) {
        (Some(a), Some(b)) => a.dot(b),
        _ if i == j => 1.0,
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerances::EXACT_F64;

    fn square() -> Lattice {
        Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)]).unwrap()
    }

    #[test]
    fn collinear_vectors_are_rejected() {
        let err = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(2.0, 0.0, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TbError::Geometry(_)));
        assert!(Lattice::new(&[Cartesian::zeros()]).is_err());
        assert!(matches!(Lattice::new(&[]), Err(TbError::Configuration(_))));
    }

    #[test]
    fn sublattice_names_are_checked() {
        let mut lattice = square();
        assert_eq!(lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap(), 0);
        assert!(matches!(
            lattice.add_sublattice("", Cartesian::zeros(), 0.0, None),
            Err(TbError::Configuration(_))
        ));
        assert!(matches!(
            lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None),
            Err(TbError::Configuration(_))
        ));
        assert!(lattice.add_sublattice("B", Cartesian::zeros(), 0.0, Some("C")).is_err());
    }

    #[test]
    fn sublattice_capacity_is_256() {
        let mut lattice = square();
        for i in 0..256 {
            lattice
                .add_sublattice(&format!("s{i}"), Cartesian::zeros(), 0.0, None)
                .unwrap();
        }
        assert!(lattice.add_sublattice("overflow", Cartesian::zeros(), 0.0, None).is_err());
    }

    #[test]
    fn hopping_capacity_is_256() {
        let mut lattice = square();
        for i in 0..256 {
            lattice.register_hopping_energy(&format!("t{i}"), 1.0).unwrap();
        }
        assert!(lattice.register_hopping_energy("overflow", 1.0).is_err());
    }

    #[test]
    fn alias_shares_identity_and_onsite() {
        let mut lattice = square();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.5, None).unwrap();
        let id = lattice
            .add_sublattice("A2", Cartesian::new(0.5, 0.0, 0.0), 3.0, Some("A"))
            .unwrap();
        assert_eq!(lattice.sublattice(id).alias, 0);
        assert_eq!(lattice.sublattice(id).onsite, 0.5);
        assert!(lattice.has_onsite_energy());
    }

    #[test]
    fn hopping_registration_rules() {
        let mut lattice = square();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.add_sublattice("B", Cartesian::new(0.5, 0.5, 0.0), 0.0, None).unwrap();
        lattice.register_hopping_energy("t1", 1.0).unwrap();
        assert!(lattice.register_hopping_energy("t1", 2.0).is_err());
        assert!(lattice.register_hopping_energy("", 2.0).is_err());

        lattice.add_registered_hopping([0, 0, 0], "A", "B", "t1").unwrap();
        // the conjugate copy makes the reverse direction a duplicate
        assert!(lattice.add_registered_hopping([0, 0, 0], "B", "A", "t1").is_err());
        assert!(lattice.add_registered_hopping([0, 0, 0], "A", "A", "t1").is_err());
        assert!(lattice.add_registered_hopping([1, 0, 0], "A", "X", "t1").is_err());
        assert!(lattice.add_registered_hopping([1, 0, 0], "A", "B", "t9").is_err());

        let b = lattice.sublattice(1);
        assert_eq!(b.hoppings.len(), 1);
        assert!(b.hoppings[0].is_conjugate);
        assert_eq!(b.hoppings[0].to_sublattice, 0);
    }

    #[test]
    fn rejected_anonymous_hopping_registers_no_energy() {
        let mut lattice = square();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.add_hopping([1, 0, 0], "A", "A", -1.0).unwrap();
        assert_eq!(lattice.hopping_energies().count(), 1);

        // duplicate term, self-term at zero offset, unknown sublattice
        assert!(lattice.add_hopping([1, 0, 0], "A", "A", -2.0).is_err());
        assert!(lattice.add_hopping([0, 0, 0], "A", "A", -3.0).is_err());
        assert!(lattice.add_hopping([0, 1, 0], "A", "X", -4.0).is_err());
        assert_eq!(lattice.hopping_energies().count(), 1);

        // an accepted term with a new value still registers it
        lattice.add_hopping([0, 1, 0], "A", "A", -2.0).unwrap();
        assert_eq!(lattice.hopping_energies().count(), 2);
    }

    #[test]
    fn max_hoppings_counts_both_ends() {
        let mut lattice = square();
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.add_sublattice("B", Cartesian::zeros(), 0.0, None).unwrap();
        lattice.register_hopping_energy("t1", 1.0).unwrap();
        assert_eq!(lattice.max_hoppings(), 0);

        lattice.add_registered_hopping([1, 0, 0], "A", "A", "t1").unwrap();
        assert!(lattice.add_registered_hopping([1, 0, 0], "A", "A", "t1").is_err());
        assert_eq!(lattice.max_hoppings(), 2);
        lattice.add_registered_hopping([1, 0, 0], "A", "B", "t1").unwrap();
        assert_eq!(lattice.max_hoppings(), 3);
        lattice.add_registered_hopping([1, 0, 0], "B", "B", "t1").unwrap();
        assert_eq!(lattice.max_hoppings(), 3);

        // equal anonymous energies share one id
        lattice.add_hopping([1, 1, 0], "A", "A", 2.0).unwrap();
        assert_eq!(lattice.num_hopping_energies(), 2);
        lattice.add_hopping([1, 1, 0], "A", "B", 2.0).unwrap();
        assert_eq!(lattice.num_hopping_energies(), 2);
    }

    #[test]
    fn complex_hopping_is_detected() {
        let mut lattice = square();
        lattice.register_hopping_energy("t", 1.0).unwrap();
        assert!(!lattice.has_complex_hoppings());
        lattice
            .register_hopping_energy("t_so", Complex64::new(0.0, 0.1))
            .unwrap();
        assert!(lattice.has_complex_hoppings());
    }

    #[test]
    fn translate_coordinates_oblique() {
        let lattice =
            Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(1.0, 1.0, 0.0)]).unwrap();
        let c = lattice.translate_coordinates(Cartesian::new(1.5, 0.5, 0.0));
        assert!((c.x - 1.0).abs() < EXACT_F64);
        assert!((c.y - 0.5).abs() < EXACT_F64);
        assert!(c.z.abs() < EXACT_F64);

        let out_of_plane = lattice.translate_coordinates(Cartesian::new(0.0, 0.0, 1.0));
        assert!(out_of_plane.norm() < EXACT_F64);
    }

    #[test]
    fn calc_position_adds_cells_and_offset() {
        let mut lattice = square();
        lattice.add_sublattice("A", Cartesian::new(0.25, 0.0, 0.0), 0.0, None).unwrap();
        lattice.set_offset(Cartesian::new(0.0, 0.5, 0.0)).unwrap();
        let p = lattice.calc_position([2, -1, 0], 0);
        assert!((p - Cartesian::new(2.25, -0.5, 0.0)).norm() < EXACT_F64);
    }

    #[test]
    fn offset_is_limited_to_half_a_vector() {
        let lattice = square();
        assert!(lattice.clone().with_offset(Cartesian::new(0.5, -0.5, 0.0)).is_ok());
        let err = lattice.with_offset(Cartesian::new(0.6, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, TbError::Configuration(_)));
    }

    #[test]
    fn min_neighbors_defaults_to_one() {
        assert_eq!(square().min_neighbors(), 1);
        assert_eq!(square().with_min_neighbors(3).min_neighbors(), 3);
    }
}
