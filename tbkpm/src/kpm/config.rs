// SPDX-License-Identifier: AGPL-3.0-only

//! KPM run configuration.

use serde::{Deserialize, Serialize};

use super::bounds::Bounds;
use super::compute::BackendKind;
use super::kernel::Kernel;
use crate::error::{Result, TbError};
use crate::tolerances::{LANCZOS_MAX_ITERATIONS, LANCZOS_PRECISION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lower spectral limit; set together with `max_energy` or not at all.
    pub min_energy: Option<f64>,
    /// Upper spectral limit; Lanczos estimate when both limits are unset.
    pub max_energy: Option<f64>,
    pub kernel: Kernel,
    /// 0 identity ordering, 1 breadth-first reordering, ≥ 2 also moment doubling.
    pub opt_level: u8,
    pub lanczos_precision: f64,
    pub lanczos_max_iterations: usize,
    /// Preferred compute backend; falls back to the host when unavailable.
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_energy: None,
            max_energy: None,
            kernel: Kernel::default(),
            opt_level: 3,
            lanczos_precision: LANCZOS_PRECISION,
            lanczos_max_iterations: LANCZOS_MAX_ITERATIONS,
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    /// Explicit energy range.
    #[must_use]
    pub const fn with_energy_range(mut self, min: f64, max: f64) -> Self {
        self.min_energy = Some(min);
        self.max_energy = Some(max);
        self
    }

    #[must_use]
    pub const fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    #[must_use]
    pub const fn with_opt_level(mut self, opt_level: u8) -> Self {
        self.opt_level = opt_level;
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// User-supplied bounds, `None` when the spectrum must be estimated.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for an empty or non-finite range, or when
    /// only one of the two limits is set.
    pub fn energy_bounds(&self) -> Result<Option<Bounds>> {
        match (self.min_energy, self.max_energy) {
            (Some(min), Some(max)) => Bounds::new(min, max).map(Some),
            (None, None) => Ok(None),
            (min, max) => Err(TbError::config(format!(
                "energy range needs both limits, got min {min:?} and max {max:?}"
            ))),
        }
    }

    /// Reject settings no computation could run with.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        self.energy_bounds()?;
        if !(self.lanczos_precision.is_finite() && self.lanczos_precision > 0.0) {
            return Err(TbError::config(format!(
                "lanczos_precision must be positive, got {}",
                self.lanczos_precision
            )));
        }
        if self.lanczos_max_iterations == 0 {
            return Err(TbError::config("lanczos_max_iterations must be at least 1"));
        }
        Ok(())
    }
}
