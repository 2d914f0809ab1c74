// SPDX-License-Identifier: AGPL-3.0-only

//! LCG PRNG parameters and shared numerical guards.
//!
//! The Lanczos starting vector must be reproducible across runs and
//! platforms, so it is drawn from a fixed-seed LCG rather than an entropy
//! source.

/// LCG multiplier (Knuth MMIX).
pub const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

/// LCG increment (Knuth MMIX).
pub const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// `(seed >> 11) as f64 / 2^53` gives 53 bits of precision in [0, 1).
pub const LCG_53_DIVISOR: f64 = (1u64 << 53) as f64;

/// Division guard for vector norms.
pub const DIVISION_GUARD: f64 = 1e-30;

/// Advance the LCG state by one step.
#[inline]
pub fn lcg_step(seed: &mut u64) {
    *seed = seed
        .wrapping_mul(LCG_MULTIPLIER)
        .wrapping_add(LCG_INCREMENT);
}

/// Generate a uniform f64 in [0, 1) from 53 bits of LCG state.
#[inline]
pub fn lcg_uniform_f64(seed: &mut u64) -> f64 {
    lcg_step(seed);
    (*seed >> 11) as f64 / LCG_53_DIVISOR
}
