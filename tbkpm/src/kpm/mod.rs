// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel Polynomial Method: Green's functions and local densities of states.
//!
//! ```text
//! Model ──hamiltonian──► Bounds (Lanczos or user range) ──► Scale (a, b)
//!   │                                                        │
//!   └── indices (row, cols) ──► OptimizedHamiltonian ◄───────┘
//!                                   │  sizes[n], H̃ = (H − b)/a
//!                                   ▼
//!                     ComputeBackend (host | gpu) ──► moments μₙ
//!                                   │  Kernel gₙ μₙ
//!                                   ▼
//!                         reconstruct::{greens, ldos}
//! ```
//!
//! The number of moments follows from the requested broadening δ and the
//! spectral half-width a (see [`Kernel::required_num_moments`]).
//! Computations for distinct start indices are independent; batches run
//! them on the rayon pool with private recursion vectors.

pub mod bounds;
pub mod compute;
pub mod config;
pub mod deferred;
pub mod kernel;
pub mod moments;
pub mod optimized;
pub mod reconstruct;
pub mod stats;
mod tridiag;

pub use bounds::{Bounds, Scale};
pub use compute::{BackendKind, ComputeBackend, HostBackend, Reason};
pub use config::Config;
pub use deferred::Deferred;
pub use kernel::Kernel;
pub use optimized::{Indices, OptimizedHamiltonian, OptimizedVariant};
pub use stats::Stats;

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use num_complex::Complex64;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, TbError};
use crate::hamiltonian::HamiltonianVisitor;
use crate::lattice::Cartesian;
use crate::model::Model;
use crate::scalar::Scalar;
use crate::sparse::CsrMatrix;
use crate::system::System;

static HOST: HostBackend = HostBackend;

/// KPM evaluator bound to a model.
#[derive(Debug)]
pub struct Kpm {
    model: Arc<Model>,
    config: Config,
    backend: Box<dyn ComputeBackend>,
    reason: Reason,
    bounds: Mutex<Option<Bounds>>,
    stats: Mutex<Stats>,
}

/// Lanczos bounds of whichever scalar kind the Hamiltonian holds.
struct EstimateBounds {
    precision: f64,
    max_iterations: usize,
}

impl HamiltonianVisitor for EstimateBounds {
    type Output = Result<Bounds>;
    fn visit<T: Scalar>(self, matrix: &Arc<CsrMatrix<T>>) -> Result<Bounds> {
        Bounds::estimate(matrix, self.precision, self.max_iterations)
    }
}

impl Kpm {
    /// Validate `config` and route to its preferred backend.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an invalid config.
    pub fn new(model: Arc<Model>, config: Config) -> Result<Self> {
        config.validate()?;
        let selection = compute::select(config.backend, model.scalar_tag());
        info!(
            backend = selection.backend.name(),
            reason = %selection.reason,
            "KPM backend selected"
        );
        Ok(Self::assemble(model, config, selection.backend, selection.reason))
    }

    /// Use a caller-supplied backend.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an invalid config.
    pub fn with_backend(
        model: Arc<Model>,
        config: Config,
        backend: Box<dyn ComputeBackend>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(model, config, backend, Reason::Preferred))
    }

    fn assemble(
        model: Arc<Model>,
        config: Config,
        backend: Box<dyn ComputeBackend>,
        reason: Reason,
    ) -> Self {
        Self {
            model,
            config,
            backend,
            reason,
            bounds: Mutex::new(None),
            stats: Mutex::new(Stats::default()),
        }
    }

    #[must_use]
    pub const fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Swap the model; cached bounds and stats are dropped.
    pub fn set_model(&mut self, model: Arc<Model>) {
        self.model = model;
        *self.bounds.get_mut() = None;
        *self.stats.get_mut() = Stats::default();
    }

    /// Built system of the current model.
    ///
    /// # Errors
    ///
    /// See [`Model::system`].
    pub fn system(&self) -> Result<Arc<System>> {
        self.model.system()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub const fn backend_reason(&self) -> &Reason {
        &self.reason
    }

    /// Spectral bounds: the configured range, else a cached Lanczos estimate.
    ///
    /// # Errors
    ///
    /// Hamiltonian build failures or [`TbError::Numeric`] from Lanczos.
    pub fn bounds(&self) -> Result<Bounds> {
        if let Some(bounds) = self.config.energy_bounds()? {
            return Ok(bounds);
        }
        let mut cached = self.bounds.lock();
        if let Some(bounds) = *cached {
            return Ok(bounds);
        }
        let bounds = self.model.hamiltonian()?.accept(EstimateBounds {
            precision: self.config.lanczos_precision,
            max_iterations: self.config.lanczos_max_iterations,
        })?;
        debug!(
            min = bounds.min,
            max = bounds.max,
            iterations = bounds.iterations,
            "spectral bounds estimated"
        );
        *cached = Some(bounds);
        Ok(bounds)
    }

    /// Chebyshev rescaling of the current bounds.
    ///
    /// # Errors
    ///
    /// See [`Self::bounds`].
    pub fn scale(&self) -> Result<Scale> {
        self.bounds().map(|b| b.scaling())
    }

    /// Stats of the last computation (summed over a batch).
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats.lock().clone()
    }

    /// Green's function element `G_{row,col}(E)`.
    ///
    /// # Errors
    ///
    /// Model build failures, out-of-range indices, or a too-small broadening.
    pub fn calc_greens(
        &self,
        row: usize,
        col: usize,
        energy: &[f64],
        broadening: f64,
    ) -> Result<Vec<Complex64>> {
        let mut all = self.calc_greens_vector(row, &[col], energy, broadening)?;
        all.pop()
            .ok_or_else(|| TbError::State("no Green's function produced".into()))
    }

    /// `G_{row,c}(E)` for every `c` in `cols`, from one recursion.
    ///
    /// # Errors
    ///
    /// As [`Self::calc_greens`].
    pub fn calc_greens_vector(
        &self,
        row: usize,
        cols: &[usize],
        energy: &[f64],
        broadening: f64,
    ) -> Result<Vec<Vec<Complex64>>> {
        let indices = Indices {
            row,
            cols: cols.to_vec(),
        };
        let (greens, stats) = self.greens_for(&indices, energy, broadening)?;
        info!(
            row,
            cols = cols.len(),
            moments = stats.num_moments,
            elapsed = stats.elapsed,
            "Green's function computed"
        );
        *self.stats.lock() = stats;
        Ok(greens)
    }

    /// Local density of states at the site nearest to `position`.
    ///
    /// `sublattice` restricts the search to one sublattice (by name; aliases
    /// resolve to their target).
    ///
    /// # Errors
    ///
    /// Unknown sublattice, no matching site, or any computation failure.
    pub fn calc_ldos(
        &self,
        energy: &[f64],
        broadening: f64,
        position: Cartesian,
        sublattice: Option<&str>,
    ) -> Result<Vec<f64>> {
        let index = self.resolve_site(position, sublattice)?;
        let (ldos, stats) = self.ldos_for(index, energy, broadening)?;
        info!(
            site = index,
            moments = stats.num_moments,
            elapsed = stats.elapsed,
            "LDOS computed"
        );
        *self.stats.lock() = stats;
        Ok(ldos)
    }

    /// LDOS at many positions, computed in parallel; stats are summed.
    ///
    /// # Errors
    ///
    /// The first failure of any position.
    pub fn calc_ldos_batch(
        &self,
        energy: &[f64],
        broadening: f64,
        positions: &[Cartesian],
        sublattice: Option<&str>,
    ) -> Result<Vec<Vec<f64>>> {
        let sites = positions
            .iter()
            .map(|&p| self.resolve_site(p, sublattice))
            .collect::<Result<Vec<_>>>()?;
        // shared state first so the workers only read it
        self.bounds()?;
        self.model.hamiltonian()?;

        let results = sites
            .par_iter()
            .map(|&site| self.ldos_for(site, energy, broadening))
            .collect::<Result<Vec<_>>>()?;

        let mut total = Stats::default();
        let ldos = results
            .into_iter()
            .map(|(ldos, stats)| {
                total.merge(&stats);
                ldos
            })
            .collect();
        info!(
            sites = sites.len(),
            operations = total.num_operations,
            "LDOS batch computed"
        );
        *self.stats.lock() = total;
        Ok(ldos)
    }

    /// [`Self::calc_ldos`] as a handle evaluated on demand.
    #[must_use]
    pub fn deferred_ldos(
        self: &Arc<Self>,
        energy: Vec<f64>,
        broadening: f64,
        position: Cartesian,
        sublattice: Option<String>,
    ) -> Deferred<Vec<f64>> {
        Deferred::new(Arc::clone(self), move |kpm| {
            kpm.calc_ldos(&energy, broadening, position, sublattice.as_deref())
        })
    }

    /// Bounds, backend and last-run stats.
    #[must_use]
    pub fn report(&self, shortform: bool) -> String {
        let stats = self.stats();
        if shortform {
            return stats.report(true);
        }
        let mut s = String::new();
        let bounds = *self.bounds.lock();
        match self.config.energy_bounds() {
            Ok(Some(b)) => {
                let _ = writeln!(s, "Spectrum bounds: [{:.4}, {:.4}] (given)", b.min, b.max);
            }
            _ => match bounds {
                Some(b) => {
                    let _ = writeln!(
                        s,
                        "Spectrum bounds: [{:.4}, {:.4}] ({} Lanczos iterations)",
                        b.min, b.max, b.iterations
                    );
                }
                None => {
                    let _ = writeln!(s, "Spectrum bounds: not yet estimated");
                }
            },
        }
        let _ = writeln!(s, "Backend: {} ({})", self.backend.name(), self.reason);
        s.push_str(&stats.report(false));
        s
    }

    fn resolve_site(&self, position: Cartesian, sublattice: Option<&str>) -> Result<usize> {
        let system = self.model.system()?;
        let sub = match sublattice {
            Some(name) => {
                let lattice = system.lattice();
                Some(lattice.sublattice(lattice.sublattice_id(name)?).alias)
            }
            None => None,
        };
        system.find_nearest(position, sub).ok_or_else(|| {
            TbError::config(format!(
                "no site of sublattice '{}' in the system",
                sublattice.unwrap_or_default()
            ))
        })
    }

    /// Optimized Hamiltonian, scale, moment count and the backend able to run it.
    fn prepare(
        &self,
        indices: &Indices,
        broadening: f64,
    ) -> Result<(OptimizedVariant, Scale, usize, &dyn ComputeBackend)> {
        let h = self.model.hamiltonian()?;
        let scale = self.scale()?;
        let num_moments = self.config.kernel.required_num_moments(scale.a, broadening)?;
        let oh = OptimizedVariant::new(&h, indices, scale, num_moments, self.config.opt_level)?;
        let backend: &dyn ComputeBackend = if self.backend.supports(oh.tag()) {
            self.backend.as_ref()
        } else {
            debug!(
                backend = self.backend.name(),
                scalar = %oh.tag(),
                "scalar kind not supported, running on host"
            );
            &HOST
        };
        Ok((oh, scale, num_moments, backend))
    }

    fn make_stats(
        oh: &OptimizedVariant,
        backend: &dyn ComputeBackend,
        num_moments: usize,
        operations: u64,
        started: Instant,
    ) -> Stats {
        let (matrix_memory, vector_memory) = oh.memory();
        Stats {
            num_moments,
            num_operations: operations,
            matrix_memory,
            vector_memory,
            elapsed: started.elapsed().as_secs_f64(),
            backend: backend.name().to_string(),
        }
    }

    fn ldos_for(&self, site: usize, energy: &[f64], broadening: f64) -> Result<(Vec<f64>, Stats)> {
        let (oh, scale, num_moments, backend) = self.prepare(&Indices::diagonal(site), broadening)?;
        let started = Instant::now();
        let mut result = backend.diagonal_moments(&oh, num_moments)?;
        let stats = Self::make_stats(&oh, backend, num_moments, result.operations, started);
        self.config.kernel.apply(&mut result.moments);
        Ok((reconstruct::ldos(&result.moments, energy, scale), stats))
    }

    fn greens_for(
        &self,
        indices: &Indices,
        energy: &[f64],
        broadening: f64,
    ) -> Result<(Vec<Vec<Complex64>>, Stats)> {
        let (oh, scale, num_moments, backend) = self.prepare(indices, broadening)?;
        let started = Instant::now();
        let (columns, operations) = if indices.is_diagonal() {
            let result = backend.diagonal_moments(&oh, num_moments)?;
            let column = result
                .moments
                .iter()
                .map(|&mu| Complex64::new(mu, 0.0))
                .collect();
            (vec![column], result.operations)
        } else {
            let result = backend.off_diagonal_moments(&oh, num_moments)?;
            (result.moments, result.operations)
        };
        let stats = Self::make_stats(&oh, backend, num_moments, operations, started);
        let greens = columns
            .into_iter()
            .map(|mut moments| {
                self.config.kernel.apply(&mut moments);
                reconstruct::greens(&moments, energy, scale)
            })
            .collect();
        Ok((greens, stats))
    }
}
