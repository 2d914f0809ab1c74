// SPDX-License-Identifier: AGPL-3.0-only

//! KPM Validation — Chebyshev moments against closed forms
//!
//! **Spectral bounds**:
//! - Lanczos extremes of an open 20×20 square block stay inside
//!   `±4 cos(π/21)` and land within the requested precision
//!
//! **Densities**:
//! - LDOS sum rule: `∫ ρ(E) dE = 1` for both kernels
//! - Infinite-chain DOS at the band center: `ρ(0) = 1 / (2π|t|)`
//! - `ρ = −Im G / π` on the diagonal
//!
//! **Recursion**:
//! - Breadth-first reordering and moment doubling reproduce the plain
//!   recursion with fewer operations
//! - A parallel LDOS batch matches the one-by-one computation
//!
//! # Provenance
//!
//! Weiße, Wellein, Alvermann, Fehske (2006) Rev. Mod. Phys. 78, 275

use std::f64::consts::PI;
use std::sync::Arc;

use tbkpm::validation::ValidationHarness;
use tbkpm::{Cartesian, Config, Kernel, Kpm, Lattice, Model, Primitive, Rectangle};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  KPM Validation — Chebyshev moments vs closed forms         ║");
    println!("║  bounds, sum rules, band-center DOS, optimized recursion    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("kpm");

    check_lanczos_bounds(&mut harness);
    check_sum_rule(&mut harness);
    check_band_center(&mut harness);
    check_greens_ldos(&mut harness);
    check_optimization_levels(&mut harness);
    check_batch(&mut harness);

    println!();
    harness.finish();
}

fn chain(t: f64, cells: usize) -> Arc<Model> {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice");
    lattice.add_hopping([1, 0, 0], "A", "A", t).expect("bond");
    Arc::new(Model::new(lattice).with_primitive(Primitive::new(cells, 1, 1)))
}

fn square_block(width: f64) -> Arc<Model> {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)])
        .expect("square vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice");
    lattice.add_hopping([1, 0, 0], "A", "A", -1.0).expect("x bond");
    lattice.add_hopping([0, 1, 0], "A", "A", -1.0).expect("y bond");
    Arc::new(Model::new(lattice).with_shape(Rectangle::new(width, width)))
}

fn grid(min: f64, max: f64, n: usize) -> Vec<f64> {
    let step = (max - min) / (n - 1) as f64;
    (0..n).map(|i| min + step * i as f64).collect()
}

/// Trapezoid rule on a uniform grid.
fn integrate(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (xs[1] - xs[0]) * (ys[0] + ys[1]))
        .sum()
}

fn kpm(model: Arc<Model>, config: Config) -> Option<Kpm> {
    match Kpm::new(model, config) {
        Ok(kpm) => Some(kpm),
        Err(e) => {
            println!("  KPM setup failed: {e}");
            None
        }
    }
}

/// \[1\] Lanczos bounds of the open 20×20 block.
fn check_lanczos_bounds(harness: &mut ValidationHarness) {
    println!("[1] Lanczos Bounds — open 20×20 square block");
    let Some(kpm) = kpm(square_block(19.2), Config::default()) else {
        harness.check_bool("KPM setup", false);
        return;
    };
    let edge = 4.0 * (PI / 21.0).cos();
    match kpm.bounds() {
        Ok(bounds) => {
            println!(
                "  [{:.6}, {:.6}] after {} iterations (exact ±{edge:.6})",
                bounds.min, bounds.max, bounds.iterations
            );
            harness.check_upper("Lanczos max ≤ exact edge", bounds.max, edge + 1e-9);
            harness.check_lower("Lanczos min ≥ −exact edge", bounds.min, -edge - 1e-9);
            harness.check_abs("Lanczos max near edge", bounds.max, edge, 0.1);
            harness.check_abs("Lanczos min near edge", bounds.min, -edge, 0.1);
        }
        Err(e) => {
            println!("  Lanczos failed: {e}");
            harness.check_bool("Lanczos converges", false);
        }
    }
    println!();
}

/// \[2\] ∫ρ = 1 for Jackson and Lorentz damping.
fn check_sum_rule(harness: &mut ValidationHarness) {
    println!("[2] Sum Rule — ∫ LDOS dE = 1");
    for kernel in [Kernel::jackson(), Kernel::lorentz(None)] {
        let config = Config::default()
            .with_energy_range(-2.0, 2.0)
            .with_kernel(kernel);
        let Some(kpm) = kpm(chain(-1.0, 80), config) else {
            harness.check_bool("KPM setup", false);
            continue;
        };
        let Ok(scale) = kpm.scale() else {
            harness.check_bool("scaling", false);
            continue;
        };
        // the whole Chebyshev interval, minus the integrable edge singularities
        let e = grid(scale.b - 0.999 * scale.a, scale.b + 0.999 * scale.a, 4001);
        match kpm.calc_ldos(&e, 0.05, Cartesian::zeros(), None) {
            Ok(rho) => {
                let total = integrate(&e, &rho);
                println!("  {kernel:?}: ∫ρ = {total:.5}");
                harness.check_abs(&format!("sum rule ({kernel:?})"), total, 1.0, 0.02);
            }
            Err(e) => {
                println!("  LDOS failed: {e}");
                harness.check_bool("sum rule LDOS", false);
            }
        }
    }
    println!();
}

/// \[3\] Band center of a long chain against `1/(2π|t|)`.
fn check_band_center(harness: &mut ValidationHarness) {
    println!("[3] Band Center — infinite-chain DOS");
    let t: f64 = -1.0;
    let Some(kpm) = kpm(chain(t, 400), Config::default().with_energy_range(-2.1, 2.1)) else {
        harness.check_bool("KPM setup", false);
        return;
    };
    let expected = 1.0 / (2.0 * PI * t.abs());
    match kpm.calc_ldos(&[0.0], 0.05, Cartesian::zeros(), None) {
        Ok(rho) => {
            println!("  ρ(0) = {:.6} (exact {expected:.6})", rho[0]);
            println!("  {}", kpm.report(true));
            harness.check_rel("chain DOS at E = 0", rho[0], expected, 0.05);
        }
        Err(e) => {
            println!("  LDOS failed: {e}");
            harness.check_bool("band-center LDOS", false);
        }
    }
    println!();
}

/// \[4\] Diagonal Green's function against the LDOS.
fn check_greens_ldos(harness: &mut ValidationHarness) {
    println!("[4] Green's Function — ρ = −Im G / π");
    let Some(kpm) = kpm(square_block(8.2), Config::default().with_energy_range(-4.1, 4.1)) else {
        harness.check_bool("KPM setup", false);
        return;
    };
    let e = grid(-3.5, 3.5, 71);
    let site = kpm
        .system()
        .ok()
        .and_then(|s| s.find_nearest(Cartesian::zeros(), None));
    let (Some(site), Ok(rho)) = (site, kpm.calc_ldos(&e, 0.1, Cartesian::zeros(), None)) else {
        harness.check_bool("LDOS at the center site", false);
        return;
    };
    match kpm.calc_greens(site, site, &e, 0.1) {
        Ok(g) => {
            let worst = rho
                .iter()
                .zip(&g)
                .map(|(r, z)| (r + z.im / PI).abs())
                .fold(0.0, f64::max);
            println!("  max |ρ + Im G/π| = {worst:.2e}");
            harness.check_upper("ρ = −Im G/π", worst, 1e-10);
        }
        Err(e) => {
            println!("  Green's function failed: {e}");
            harness.check_bool("Green's function", false);
        }
    }
    println!();
}

/// \[5\] All optimization levels agree; higher levels do less work.
fn check_optimization_levels(harness: &mut ValidationHarness) {
    println!("[5] Optimized Recursion — reordering and moment doubling");
    let model = square_block(30.2);
    let e = grid(-3.0, 3.0, 31);
    let mut reference: Option<(Vec<f64>, u64)> = None;
    for opt in 0..=3u8 {
        let config = Config::default()
            .with_energy_range(-4.1, 4.1)
            .with_opt_level(opt);
        let Some(kpm) = kpm(Arc::clone(&model), config) else {
            harness.check_bool("KPM setup", false);
            return;
        };
        let Ok(rho) = kpm.calc_ldos(&e, 0.1, Cartesian::zeros(), None) else {
            harness.check_bool(&format!("LDOS at opt level {opt}"), false);
            return;
        };
        let stats = kpm.stats();
        println!("  opt {opt}: {}", stats.report(true));
        match &reference {
            None => reference = Some((rho, stats.num_operations)),
            Some((base, base_ops)) => {
                let worst = rho
                    .iter()
                    .zip(base)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                harness.check_upper(&format!("opt {opt} LDOS vs opt 0"), worst, 1e-9);
                harness.check_bool(
                    &format!("opt {opt} uses fewer operations"),
                    stats.num_operations < *base_ops,
                );
            }
        }
    }
    println!();
}

/// \[6\] Batch LDOS equals the one-by-one results.
fn check_batch(harness: &mut ValidationHarness) {
    println!("[6] Parallel Batch — LDOS at many positions");
    let Some(kpm) = kpm(chain(-1.0, 120), Config::default().with_energy_range(-2.1, 2.1)) else {
        harness.check_bool("KPM setup", false);
        return;
    };
    let e = grid(-1.8, 1.8, 19);
    let positions: Vec<Cartesian> = (-3..=3)
        .map(|i| Cartesian::new(10.0 * f64::from(i), 0.0, 0.0))
        .collect();
    let Ok(batch) = kpm.calc_ldos_batch(&e, 0.05, &positions, None) else {
        harness.check_bool("batch LDOS", false);
        return;
    };
    let batch_ops = kpm.stats().num_operations;
    let mut worst: f64 = 0.0;
    let mut single_ops = 0;
    for (&p, rho_batch) in positions.iter().zip(&batch) {
        let Ok(rho) = kpm.calc_ldos(&e, 0.05, p, None) else {
            harness.check_bool("single LDOS", false);
            return;
        };
        single_ops += kpm.stats().num_operations;
        for (a, b) in rho.iter().zip(rho_batch) {
            worst = worst.max((a - b).abs());
        }
    }
    println!("  {} positions, max deviation {worst:.2e}", positions.len());
    println!("  {}", kpm.report(false).replace('\n', "\n  "));
    harness.check_upper("batch vs single LDOS", worst, 1e-14);
    harness.check_abs("batch operations = Σ single", batch_ops as f64, single_ops as f64, 0.5);
    println!();
}
