// SPDX-License-Identifier: AGPL-3.0-only

//! Energy-resolved functions from damped Chebyshev moments.
//!
//! With ε = (E − b)/a and θ = arccos ε:
//!
//! ```text
//! G(E)    = −2i / (a √(1−ε²)) · Σₙ μₙ e^{−inθ} / (1 + δₙ₀)
//! LDOS(E) = (μ₀ + 2 Σₙ₌₁ μₙ Tₙ(ε)) / (π a √(1−ε²))
//! ```
//!
//! Both vanish outside the open interval |ε| < 1.

use std::f64::consts::PI;

use num_complex::Complex64;

use super::bounds::Scale;

/// Green's function at each energy from damped moments.
#[must_use]
pub fn greens(moments: &[Complex64], energy: &[f64], scale: Scale) -> Vec<Complex64> {
    energy
        .iter()
        .map(|&e| {
            let eps = scale.rescale(e);
            if eps.abs() >= 1.0 {
                return Complex64::new(0.0, 0.0);
            }
            let theta = eps.acos();
            let sum: Complex64 = moments
                .iter()
                .enumerate()
                .map(|(n, &mu)| {
                    let weight = if n == 0 { 0.5 } else { 1.0 };
                    mu * Complex64::from_polar(weight, -(n as f64) * theta)
                })
                .sum();
            Complex64::new(0.0, -2.0) * sum / (scale.a * (1.0 - eps * eps).sqrt())
        })
        .collect()
}

/// Local density of states at each energy from damped real moments.
#[must_use]
pub fn ldos(moments: &[f64], energy: &[f64], scale: Scale) -> Vec<f64> {
    energy
        .iter()
        .map(|&e| {
            let eps = scale.rescale(e);
            if eps.abs() >= 1.0 || moments.is_empty() {
                return 0.0;
            }
            // Tₙ(ε) by the real three-term recursion
            let mut t_prev = 1.0;
            let mut t = eps;
            let mut sum = moments[0];
            for &mu in &moments[1..] {
                sum += 2.0 * mu * t;
                let t_next = 2.0 * eps * t - t_prev;
                t_prev = t;
                t = t_next;
            }
            sum / (PI * scale.a * (1.0 - eps * eps).sqrt())
        })
        .collect()
}
