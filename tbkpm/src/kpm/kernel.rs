// SPDX-License-Identifier: AGPL-3.0-only

//! Damping kernels that suppress Gibbs oscillations of truncated moment series.
//!
//! Weiße et al., Rev. Mod. Phys. 78, 275 (2006), §II.C.

use std::f64::consts::PI;
use std::ops::MulAssign;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TbError};
use crate::tolerances::{LORENTZ_LAMBDA, MIN_BROADENING};

/// Closed choice of damping kernel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    /// Optimal for densities of states; resolution ≈ π·a/M.
    #[default]
    Jackson,
    /// Preserves the analytic structure of Green's functions; decay set by λ.
    Lorentz { lambda: f64 },
}

impl Kernel {
    #[must_use]
    pub const fn jackson() -> Self {
        Self::Jackson
    }

    /// Lorentz kernel; `lambda = None` takes the default of 4.
    #[must_use]
    pub fn lorentz(lambda: Option<f64>) -> Self {
        Self::Lorentz {
            lambda: lambda.unwrap_or(LORENTZ_LAMBDA),
        }
    }

    /// Reject kernel parameters that make the damping meaningless.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] for a non-positive or non-finite λ.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Jackson => Ok(()),
            Self::Lorentz { lambda } if lambda.is_finite() && lambda > 0.0 => Ok(()),
            Self::Lorentz { lambda } => Err(TbError::config(format!(
                "Lorentz kernel lambda must be positive, got {lambda}"
            ))),
        }
    }

    /// Damping coefficients g₀..g_{M-1}.
    #[must_use]
    pub fn damping_coefficients(&self, num_moments: usize) -> Vec<f64> {
        let m = num_moments as f64;
        match *self {
            Self::Jackson => {
                let phi = PI / (m + 1.0);
                let cot = phi.cos() / phi.sin();
                (0..num_moments)
                    .map(|n| {
                        let n = n as f64;
                        ((m - n + 1.0) * (phi * n).cos() + (phi * n).sin() * cot) / (m + 1.0)
                    })
                    .collect()
            }
            Self::Lorentz { lambda } => (0..num_moments)
                .map(|n| (lambda * (1.0 - n as f64 / m)).sinh() / lambda.sinh())
                .collect(),
        }
    }

    /// Multiply `moments` in place by the damping coefficients.
    pub fn apply<M: MulAssign<f64>>(&self, moments: &mut [M]) {
        let len = moments.len();
        for (mu, g) in moments.iter_mut().zip(self.damping_coefficients(len)) {
            *mu *= g;
        }
    }

    /// Moments needed for an energy resolution `broadening` at scale factor `a`.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if `broadening` is not a positive number.
    pub fn required_num_moments(&self, scale_a: f64, broadening: f64) -> Result<usize> {
        if !broadening.is_finite() || broadening < MIN_BROADENING {
            return Err(TbError::config(format!(
                "broadening must be positive, got {broadening}"
            )));
        }
        let factor = match *self {
            Self::Jackson => PI,
            Self::Lorentz { lambda } => lambda,
        };
        let m = (factor * scale_a / broadening).ceil();
        Ok((m as usize).max(2))
    }
}
