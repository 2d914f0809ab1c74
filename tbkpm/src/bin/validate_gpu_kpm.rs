// SPDX-License-Identifier: AGPL-3.0-only

//! GPU KPM Validation — WGSL f64 recursion vs host recursion
//!
//! Runs the same LDOS and off-diagonal Green's functions through the host
//! backend and the GPU backend and compares them point by point.
//!
//! - Square block LDOS at every optimization level
//! - Off-diagonal `G_ij(E)` on a chain (one recursion, several targets)
//! - A complex model is routed back to the host
//!
//! Adapter selection: `TBKPM_GPU_ADAPTER=auto|<index>|<name>`,
//! backend override: `TBKPM_WGPU_BACKEND=vulkan|metal|dx12|gl`.

use std::sync::Arc;

use num_complex::Complex64;
use tbkpm::gpu::GpuF64;
use tbkpm::kpm::compute::GpuBackend;
use tbkpm::kpm::{BackendKind, HostBackend, Reason};
use tbkpm::tolerances::GPU_VS_CPU_F64;
use tbkpm::validation::ValidationHarness;
use tbkpm::{Cartesian, Config, Kpm, Lattice, Model, Primitive, Rectangle};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  GPU KPM Validation — Chebyshev recursion on WGSL f64       ║");
    println!("║  GPU backend vs host backend, LDOS and Green's functions    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("gpu_kpm");

    GpuF64::print_available_adapters();
    let gpu = match GpuF64::new_blocking() {
        Ok(g) => g,
        Err(e) => {
            println!("  GPU not available: {e}");
            println!("  (GPU validation requires SHADER_F64 — skipping)");
            harness.check_bool("GPU available", false);
            harness.finish();
        }
    };
    gpu.print_info();
    println!();

    let backend = match GpuBackend::from_device(gpu) {
        Ok(b) => b,
        Err(e) => {
            println!("  GPU backend unavailable: {e}");
            harness.check_bool("GPU backend", false);
            harness.finish();
        }
    };
    println!("  Backend adapter: {}", backend.adapter_name());
    println!();

    let backend = Arc::new(backend);
    check_ldos_parity(&mut harness, &backend);
    check_greens_parity(&mut harness, &backend);
    check_complex_fallback(&mut harness);

    println!();
    harness.finish();
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

fn chain(t: impl Into<Complex64>, cells: usize) -> Arc<Model> {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice");
    lattice.add_hopping([1, 0, 0], "A", "A", t).expect("bond");
    Arc::new(Model::new(lattice).with_primitive(Primitive::new(cells, 1, 1)))
}

fn grid(min: f64, max: f64, n: usize) -> Vec<f64> {
    let step = (max - min) / (n - 1) as f64;
    (0..n).map(|i| min + step * i as f64).collect()
}

/// Relative deviation, normalized by the largest reference magnitude.
fn max_deviation(a: &[f64], b: &[f64]) -> f64 {
    let scale = b.iter().map(|x| x.abs()).fold(f64::MIN_POSITIVE, f64::max);
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / scale)
        .fold(0.0, f64::max)
}

/// Host and GPU KPM objects over the same model and config; one device serves every check.
fn pair(model: &Arc<Model>, config: &Config, backend: &Arc<GpuBackend>) -> Option<(Kpm, Kpm)> {
    let host = Kpm::with_backend(Arc::clone(model), config.clone(), Box::new(HostBackend)).ok()?;
    let gpu = Kpm::with_backend(Arc::clone(model), config.clone(), Box::new(Arc::clone(backend)))
        .ok()?;
    Some((host, gpu))
}

/// \[1\] LDOS of a 31×31 block at every optimization level.
fn check_ldos_parity(harness: &mut ValidationHarness, backend: &Arc<GpuBackend>) {
    println!("[1] LDOS Parity — 31×31 square block");
    let model = square_block(30.2);
    let e = grid(-3.8, 3.8, 77);
    for opt in 0..=3u8 {
        let config = Config::default()
            .with_energy_range(-4.1, 4.1)
            .with_opt_level(opt);
        let Some((host, gpu)) = pair(&model, &config, backend) else {
            harness.check_bool("KPM setup", false);
            return;
        };
        let host_rho = host.calc_ldos(&e, 0.05, Cartesian::zeros(), None);
        let gpu_rho = gpu.calc_ldos(&e, 0.05, Cartesian::zeros(), None);
        match (host_rho, gpu_rho) {
            (Ok(h), Ok(g)) => {
                let deviation = max_deviation(&g, &h);
                println!(
                    "  opt {opt}: deviation {deviation:.2e}; host {} | gpu {}",
                    host.stats().report(true),
                    gpu.stats().report(true)
                );
                harness.check_upper(&format!("LDOS opt {opt} GPU vs host"), deviation, GPU_VS_CPU_F64);
                harness.check_bool(
                    &format!("opt {opt} ran on {}", gpu.backend_name()),
                    gpu.stats().backend == gpu.backend_name(),
                );
            }
            (Err(e), _) | (_, Err(e)) => {
                println!("  opt {opt}: computation failed: {e}");
                harness.check_bool(&format!("LDOS opt {opt}"), false);
            }
        }
    }
    println!();
}

/// \[2\] Off-diagonal Green's functions from one recursion.
fn check_greens_parity(harness: &mut ValidationHarness, backend: &Arc<GpuBackend>) {
    println!("[2] Green's Function Parity — chain, several targets");
    let model = chain(-1.0, 200);
    let config = Config::default().with_energy_range(-2.1, 2.1);
    let Some((host, gpu)) = pair(&model, &config, backend) else {
        harness.check_bool("KPM setup", false);
        return;
    };
    let e = grid(-1.9, 1.9, 39);
    let cols = [100, 101, 105, 130];
    match (
        host.calc_greens_vector(100, &cols, &e, 0.05),
        gpu.calc_greens_vector(100, &cols, &e, 0.05),
    ) {
        (Ok(h), Ok(g)) => {
            for ((c, gh), gg) in cols.iter().zip(&h).zip(&g) {
                let re_h: Vec<f64> = gh.iter().map(|z| z.re).collect();
                let re_g: Vec<f64> = gg.iter().map(|z| z.re).collect();
                let im_h: Vec<f64> = gh.iter().map(|z| z.im).collect();
                let im_g: Vec<f64> = gg.iter().map(|z| z.im).collect();
                let deviation = max_deviation(&re_g, &re_h).max(max_deviation(&im_g, &im_h));
                println!("  G(100, {c}): deviation {deviation:.2e}");
                harness.check_upper(&format!("G(100, {c}) GPU vs host"), deviation, GPU_VS_CPU_F64);
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            println!("  computation failed: {e}");
            harness.check_bool("Green's function vector", false);
        }
    }
    println!();
}

/// \[3\] Complex Hamiltonians are not run on the f64 shader.
fn check_complex_fallback(harness: &mut ValidationHarness) {
    println!("[3] Complex Model — routed to host");
    let model = chain(Complex64::new(0.0, -1.0), 50);
    let config = Config::default()
        .with_energy_range(-2.1, 2.1)
        .with_backend(BackendKind::Gpu);
    match Kpm::new(model, config) {
        Ok(kpm) => {
            println!("  backend: {} ({})", kpm.backend_name(), kpm.backend_reason());
            harness.check_bool(
                "complex model falls back to host",
                matches!(kpm.backend_reason(), Reason::Fallback(_)) && kpm.backend_name() == "host",
            );
            harness.check_bool(
                "fallback still computes",
                kpm.calc_ldos(&[0.0], 0.1, Cartesian::zeros(), None).is_ok(),
            );
        }
        Err(e) => {
            println!("  KPM setup failed: {e}");
            harness.check_bool("complex model KPM", false);
        }
    }
    println!();
}
