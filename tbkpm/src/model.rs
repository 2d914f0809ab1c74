// SPDX-License-Identifier: AGPL-3.0-only

//! Tight-binding model: lattice + structure + symmetry + modifiers.
//!
//! The [`System`] and [`Hamiltonian`] are built lazily on first access and
//! cached; any mutation of the model drops both caches. Build failures are
//! cached too, so repeated access reports the same error without rebuilding.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::hamiltonian::Hamiltonian;
use crate::lattice::shape::{Primitive, Shape};
use crate::lattice::symmetry::TranslationalSymmetry;
use crate::lattice::{Cartesian, Lattice};
use crate::scalar::ScalarTag;
use crate::system::foundation::Foundation;
use crate::system::modifiers::{Modifier, ModifierSet};
use crate::system::System;

/// Region of the lattice that the finite system occupies.
#[derive(Clone)]
pub enum Structure {
    Shape(Arc<dyn Shape>),
    Primitive(Primitive),
}

impl Default for Structure {
    fn default() -> Self {
        Self::Primitive(Primitive::default())
    }
}

impl fmt::Debug for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(shape) => f
                .debug_tuple("Shape")
                .field(&format_args!("{} vertices", shape.vertices().len()))
                .finish(),
            Self::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
        }
    }
}

/// Floating-point width of the Hamiltonian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Single,
    #[default]
    Double,
}

#[derive(Debug)]
pub struct Model {
    lattice: Lattice,
    structure: Structure,
    symmetry: Option<TranslationalSymmetry>,
    modifiers: ModifierSet,
    precision: Precision,
    wave_vector: Cartesian,
    system: OnceLock<Result<Arc<System>>>,
    hamiltonian: OnceLock<Result<Hamiltonian>>,
}

impl Model {
    /// A single primitive cell of `lattice`, no symmetry, no modifiers.
    #[must_use]
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            structure: Structure::default(),
            symmetry: None,
            modifiers: ModifierSet::default(),
            precision: Precision::default(),
            wave_vector: Cartesian::zeros(),
            system: OnceLock::new(),
            hamiltonian: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: impl Shape + 'static) -> Self {
        self.set_shape(shape);
        self
    }

    #[must_use]
    pub fn with_primitive(mut self, primitive: Primitive) -> Self {
        self.set_primitive(primitive);
        self
    }

    #[must_use]
    pub fn with_symmetry(mut self, symmetry: TranslationalSymmetry) -> Self {
        self.set_symmetry(Some(symmetry));
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.set_precision(precision);
        self
    }

    pub fn set_shape(&mut self, shape: impl Shape + 'static) {
        self.structure = Structure::Shape(Arc::new(shape));
        self.invalidate();
    }

    pub fn set_primitive(&mut self, primitive: Primitive) {
        self.structure = Structure::Primitive(primitive);
        self.invalidate();
    }

    pub fn set_symmetry(&mut self, symmetry: Option<TranslationalSymmetry>) {
        self.symmetry = symmetry;
        self.invalidate();
    }

    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
        self.hamiltonian = OnceLock::new();
    }

    /// Bloch wave vector applied to boundary hoppings.
    pub fn set_wave_vector(&mut self, k: Cartesian) {
        self.wave_vector = k;
        self.hamiltonian = OnceLock::new();
    }

    /// Register a modifier; hopping generators also register their energy.
    ///
    /// # Errors
    ///
    /// [`crate::TbError::Configuration`] if a generator's hopping name is
    /// blank or already registered.
    pub fn add(&mut self, modifier: impl Into<Modifier>) -> Result<()> {
        let modifier = modifier.into();
        if let Modifier::Generator(generator) = &modifier {
            self.lattice
                .register_hopping_energy(generator.name(), generator.energy())?;
        }
        self.modifiers.push(modifier);
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.system = OnceLock::new();
        self.hamiltonian = OnceLock::new();
    }

    /// Lattice including energies registered by hopping generators.
    #[must_use]
    pub const fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[must_use]
    pub const fn structure(&self) -> &Structure {
        &self.structure
    }

    #[must_use]
    pub const fn symmetry(&self) -> Option<&TranslationalSymmetry> {
        self.symmetry.as_ref()
    }

    #[must_use]
    pub const fn modifiers(&self) -> &ModifierSet {
        &self.modifiers
    }

    #[must_use]
    pub const fn wave_vector(&self) -> Cartesian {
        self.wave_vector
    }

    #[must_use]
    pub fn is_complex(&self) -> bool {
        let bloch = self.symmetry.is_some() && self.wave_vector != Cartesian::zeros();
        self.lattice.has_complex_hoppings() || self.modifiers.any_complex() || bloch
    }

    #[must_use]
    pub fn is_double(&self) -> bool {
        self.precision == Precision::Double || self.modifiers.any_double()
    }

    #[must_use]
    pub fn scalar_tag(&self) -> ScalarTag {
        ScalarTag::select(self.is_double(), self.is_complex())
    }

    /// Built system, cached.
    ///
    /// # Errors
    ///
    /// [`crate::TbError::State`] if no site survives construction, or any
    /// generator failure.
    pub fn system(&self) -> Result<Arc<System>> {
        self.system
            .get_or_init(|| {
                let foundation = match &self.structure {
                    Structure::Shape(shape) => Foundation::new(&self.lattice, shape.as_ref())?,
                    Structure::Primitive(primitive) => {
                        Foundation::from_primitive(&self.lattice, *primitive)
                    }
                };
                debug!(
                    sites = foundation.num_sites(),
                    valid = foundation.num_valid(),
                    "foundation ready"
                );
                System::build(
                    &self.lattice,
                    foundation,
                    self.symmetry.as_ref(),
                    &self.modifiers,
                )
                .map(Arc::new)
            })
            .clone()
    }

    /// Hamiltonian in [`Self::scalar_tag`], cached.
    ///
    /// # Errors
    ///
    /// Any [`Self::system`] failure, or a modifier failure.
    pub fn hamiltonian(&self) -> Result<Hamiltonian> {
        self.hamiltonian
            .get_or_init(|| {
                let system = self.system()?;
                Hamiltonian::build(&system, &self.modifiers, self.wave_vector, self.scalar_tag())
            })
            .clone()
    }

    /// System build diagnostics, or the build error text.
    #[must_use]
    pub fn report(&self) -> String {
        match self.system() {
            Ok(system) => system.report().to_string(),
            Err(e) => e.to_string(),
        }
    }
}
