// SPDX-License-Identifier: AGPL-3.0-only

//! tbkpm — tight-binding lattice models and a Kernel Polynomial Method engine.
//!
//! A [`Lattice`] describes a periodic crystal; a [`Model`] cuts a finite
//! piece out of it (shape or block of primitive cells), applies periodic
//! boundaries and user modifiers, and assembles the sparse [`Hamiltonian`].
//! [`Kpm`] expands Green's functions and local densities of states of that
//! Hamiltonian in Chebyshev polynomials.
//!
//! ```text
//! Lattice ─► Foundation ─► System ─► Hamiltonian ─► Kpm ─► G(E), LDOS(E)
//!              (shape,       (compact     (f32 | f64 |   (bounds, moments,
//!              pruning)      sites,       c32 | c64)     kernel)
//!                            boundaries)
//! ```
//!
//! ## Modules
//!   - `lattice` — primitive vectors, sublattices, hoppings, shapes, symmetry
//!   - `system` — foundation grid, site pruning, modifiers, compact system
//!   - `hamiltonian` — Hermitian CSR matrix in one of four scalar kinds
//!   - `model` — lazily built and cached system + Hamiltonian
//!   - `kpm` — Lanczos bounds, optimized recursion, kernels, reconstruction
//!   - `gpu` — wgpu f64 device for the recursion (feature `gpu`)
//!
//! ## Validation binaries
//!   - `validate_lattice` — system construction against counted sites/bonds
//!   - `validate_kpm` — moments and densities against closed forms
//!   - `validate_gpu_kpm` — GPU recursion against the host recursion

pub mod constants;
pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod hamiltonian;
pub mod kpm;
pub mod lattice;
pub mod model;
pub mod scalar;
pub mod sparse;
pub mod system;
pub mod tolerances;
pub mod validation;

pub use error::{Result, TbError};
pub use hamiltonian::Hamiltonian;
pub use kpm::{Config, Kernel, Kpm, Stats};
pub use lattice::shape::{Circle, FreeformShape, Line, Polygon, Primitive, Rectangle, Shape};
pub use lattice::symmetry::TranslationalSymmetry;
pub use lattice::{Cartesian, Lattice};
pub use model::{Model, Precision};
pub use scalar::ScalarTag;
pub use system::modifiers::{
    HoppingGenerator, HoppingModifier, Modifier, OnsiteModifier, PositionModifier,
    SiteStateModifier,
};
pub use system::System;
