// SPDX-License-Identifier: AGPL-3.0-only

//! User callables that alter a model while it is being built.
//!
//! | Kind | Runs on | Sees |
//! |------|---------|------|
//! | [`SiteStateModifier`] | foundation | validity mask, positions, sublattices |
//! | [`PositionModifier`] | foundation | positions, sublattices |
//! | [`OnsiteModifier`] | Hamiltonian | diagonal energies, positions, sublattices |
//! | [`HoppingModifier`] | Hamiltonian | bond energies, endpoint positions, hopping ids |
//! | [`HoppingGenerator`] | system | positions, sublattices → extra bonds |
//!
//! Within each kind, modifiers run in registration order.

use std::fmt;

use num_complex::Complex64;

use crate::error::Result;
use crate::lattice::{Cartesian, HopId, SubId};
use crate::scalar::ArrayRefMut;

type StateFn = dyn Fn(&mut [bool], &[Cartesian], &[SubId]) + Send + Sync;
type PositionFn = dyn Fn(&mut [Cartesian], &[SubId]) + Send + Sync;
type OnsiteFn = dyn Fn(&mut ArrayRefMut<'_>, &[Cartesian], &[SubId]) -> Result<()> + Send + Sync;
type HoppingFn =
    dyn Fn(&mut ArrayRefMut<'_>, &[Cartesian], &[Cartesian], &[HopId]) -> Result<()> + Send + Sync;
type GeneratorFn = dyn Fn(&[Cartesian], &[SubId]) -> (Vec<usize>, Vec<usize>) + Send + Sync;

/// Invalidates sites of the foundation.
///
/// Sites can only be switched off: a site that is already invalid stays
/// invalid whatever the modifier writes. After the modifier runs, sites left
/// with fewer than `min_neighbors` valid neighbors are pruned as well.
pub struct SiteStateModifier {
    apply: Box<StateFn>,
    min_neighbors: usize,
}

impl SiteStateModifier {
    pub fn new(apply: impl Fn(&mut [bool], &[Cartesian], &[SubId]) + Send + Sync + 'static) -> Self {
        Self {
            apply: Box::new(apply),
            min_neighbors: 0,
        }
    }

    #[must_use]
    pub fn with_min_neighbors(mut self, k: usize) -> Self {
        self.min_neighbors = k;
        self
    }

    #[must_use]
    pub const fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }

    pub(crate) fn apply(&self, state: &mut [bool], positions: &[Cartesian], sublattices: &[SubId]) {
        let before = state.to_vec();
        (self.apply)(state, positions, sublattices);
        for (s, was_valid) in state.iter_mut().zip(before) {
            *s &= was_valid;
        }
    }
}

/// Moves sites in place.
pub struct PositionModifier {
    apply: Box<PositionFn>,
}

impl PositionModifier {
    pub fn new(apply: impl Fn(&mut [Cartesian], &[SubId]) + Send + Sync + 'static) -> Self {
        Self {
            apply: Box::new(apply),
        }
    }

    pub(crate) fn apply(&self, positions: &mut [Cartesian], sublattices: &[SubId]) {
        (self.apply)(positions, sublattices);
    }
}

/// Rewrites the diagonal energies of the Hamiltonian.
pub struct OnsiteModifier {
    apply: Box<OnsiteFn>,
    is_complex: bool,
    is_double: bool,
}

impl OnsiteModifier {
    pub fn new(
        apply: impl Fn(&mut ArrayRefMut<'_>, &[Cartesian], &[SubId]) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            apply: Box::new(apply),
            is_complex: false,
            is_double: false,
        }
    }

    /// The modifier writes complex energies; the model is built complex.
    #[must_use]
    pub const fn complex(mut self) -> Self {
        self.is_complex = true;
        self
    }

    /// The modifier needs double precision regardless of the model setting.
    #[must_use]
    pub const fn double(mut self) -> Self {
        self.is_double = true;
        self
    }

    pub(crate) fn apply(
        &self,
        energy: &mut ArrayRefMut<'_>,
        positions: &[Cartesian],
        sublattices: &[SubId],
    ) -> Result<()> {
        (self.apply)(energy, positions, sublattices)
    }
}

/// Rewrites off-diagonal (bond) energies of the Hamiltonian.
pub struct HoppingModifier {
    apply: Box<HoppingFn>,
    is_complex: bool,
    is_double: bool,
}

impl HoppingModifier {
    pub fn new(
        apply: impl Fn(&mut ArrayRefMut<'_>, &[Cartesian], &[Cartesian], &[HopId]) -> Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            apply: Box::new(apply),
            is_complex: false,
            is_double: false,
        }
    }

    #[must_use]
    pub const fn complex(mut self) -> Self {
        self.is_complex = true;
        self
    }

    #[must_use]
    pub const fn double(mut self) -> Self {
        self.is_double = true;
        self
    }

    pub(crate) fn apply(
        &self,
        energy: &mut ArrayRefMut<'_>,
        pos_from: &[Cartesian],
        pos_to: &[Cartesian],
        hopping_ids: &[HopId],
    ) -> Result<()> {
        (self.apply)(energy, pos_from, pos_to, hopping_ids)
    }
}

/// Adds bonds that the lattice does not describe, with a newly registered energy.
pub struct HoppingGenerator {
    name: String,
    energy: Complex64,
    make: Box<GeneratorFn>,
}

impl HoppingGenerator {
    /// `make` returns `(from, to)` index arrays into the built system.
    pub fn new(
        name: &str,
        energy: impl Into<Complex64>,
        make: impl Fn(&[Cartesian], &[SubId]) -> (Vec<usize>, Vec<usize>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            energy: energy.into(),
            make: Box::new(make),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn energy(&self) -> Complex64 {
        self.energy
    }

    pub(crate) fn generate(
        &self,
        positions: &[Cartesian],
        sublattices: &[SubId],
    ) -> (Vec<usize>, Vec<usize>) {
        (self.make)(positions, sublattices)
    }
}

macro_rules! opaque_debug {
    ($($t:ty),*) => {
        $(impl fmt::Debug for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($t)).finish_non_exhaustive()
            }
        })*
    };
}

opaque_debug!(SiteStateModifier, PositionModifier, OnsiteModifier, HoppingModifier, HoppingGenerator);

/// Any modifier accepted by [`crate::model::Model::add`].
#[derive(Debug)]
pub enum Modifier {
    SiteState(SiteStateModifier),
    Position(PositionModifier),
    Onsite(OnsiteModifier),
    Hopping(HoppingModifier),
    Generator(HoppingGenerator),
}

macro_rules! impl_from_modifier {
    ($($t:ident => $v:ident),*) => {
        $(impl From<$t> for Modifier {
            fn from(m: $t) -> Self {
                Self::$v(m)
            }
        })*
    };
}

impl_from_modifier!(
    SiteStateModifier => SiteState,
    PositionModifier => Position,
    OnsiteModifier => Onsite,
    HoppingModifier => Hopping,
    HoppingGenerator => Generator
);

/// Registered modifiers, grouped by kind, each group in registration order.
#[derive(Debug, Default)]
pub struct ModifierSet {
    pub(crate) state: Vec<SiteStateModifier>,
    pub(crate) position: Vec<PositionModifier>,
    pub(crate) onsite: Vec<OnsiteModifier>,
    pub(crate) hopping: Vec<HoppingModifier>,
    pub(crate) generators: Vec<HoppingGenerator>,
}

impl ModifierSet {
    pub(crate) fn push(&mut self, modifier: Modifier) {
        match modifier {
            Modifier::SiteState(m) => self.state.push(m),
            Modifier::Position(m) => self.position.push(m),
            Modifier::Onsite(m) => self.onsite.push(m),
            Modifier::Hopping(m) => self.hopping.push(m),
            Modifier::Generator(m) => self.generators.push(m),
        }
    }

    /// Whether any energy modifier writes complex values.
    #[must_use]
    pub fn any_complex(&self) -> bool {
        self.onsite.iter().any(|m| m.is_complex) || self.hopping.iter().any(|m| m.is_complex)
    }

    /// Whether any energy modifier requires double precision.
    #[must_use]
    pub fn any_double(&self) -> bool {
        self.onsite.iter().any(|m| m.is_double) || self.hopping.iter().any(|m| m.is_double)
    }

    #[must_use]
    pub fn has_onsite(&self) -> bool {
        !self.onsite.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
            + self.position.len()
            + self.onsite.len()
            + self.hopping.len()
            + self.generators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
