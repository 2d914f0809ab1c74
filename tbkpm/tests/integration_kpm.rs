// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: KPM densities and Green's functions on built models.
//!
//! Closed forms used: the dimer spectrum ±|t|, the particle–hole symmetry of
//! bipartite lattices, and `G_ij = G_ji` for real symmetric Hamiltonians.

use std::sync::Arc;

use num_complex::Complex64;
use tbkpm::kpm::{
    moments, BackendKind, Deferred, HostBackend, Indices, OptimizedHamiltonian, Reason, Scale,
};
use tbkpm::{
    Cartesian, Config, Kernel, Kpm, Lattice, Model, Primitive, Rectangle, TranslationalSymmetry,
};

fn chain_lattice(t: impl Into<Complex64>) -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice A");
    lattice.add_hopping([1, 0, 0], "A", "A", t).expect("bond");
    lattice
}

fn square_lattice(t: f64) -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)])
        .expect("square vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice A");
    lattice.add_hopping([1, 0, 0], "A", "A", t).expect("x bond");
    lattice.add_hopping([0, 1, 0], "A", "A", t).expect("y bond");
    lattice
}

fn energies(min: f64, max: f64, n: usize) -> Vec<f64> {
    let step = (max - min) / (n - 1) as f64;
    (0..n).map(|i| min + step * i as f64).collect()
}

#[test]
fn unit_hamiltonian_has_unit_moments() {
    let h = tbkpm::sparse::CsrMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]);
    let unit = Scale { a: 1.0, b: 0.0 };
    for opt in 0..=3 {
        let oh = OptimizedHamiltonian::new(&h, &Indices::diagonal(0), unit, 16, opt)
            .expect("optimized");
        let mu = moments::diagonal(&oh, 16).moments;
        assert_eq!(mu.len(), 16);
        assert!(
            mu.iter().all(|&m| (m - 1.0).abs() < 1e-14),
            "opt {opt}: Tₙ(1) = 1 for every n, got {mu:?}"
        );
    }
}

#[test]
fn jackson_damping_starts_at_one_and_never_grows() {
    let g = Kernel::Jackson.damping_coefficients(200);
    assert!((g[0] - 1.0).abs() < 1e-12, "g₀ = {}", g[0]);
    assert!(g.windows(2).all(|w| w[1] <= w[0] + 1e-15));
    assert!(g[199] < 0.01, "last coefficient {}", g[199]);
}

#[test]
fn breadth_first_sizes_never_shrink() {
    let model = Model::new(square_lattice(-1.0)).with_shape(Rectangle::new(10.2, 10.2));
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    let h = hamiltonian.matrix::<f64>().expect("f64");
    let scale = Scale { a: 4.5, b: 0.0 };
    let center = model
        .system()
        .expect("system")
        .find_nearest(Cartesian::zeros(), None)
        .expect("center site");

    let full = OptimizedHamiltonian::new(h, &Indices::diagonal(center), scale, 30, 0)
        .expect("identity ordering");
    assert!(full.sizes().iter().all(|&s| s == h.rows));

    let bfs = OptimizedHamiltonian::new(h, &Indices::diagonal(center), scale, 30, 1)
        .expect("breadth-first ordering");
    let sizes = bfs.sizes();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "{sizes:?}");
    assert!(sizes[0] < h.rows);
    assert_eq!(*sizes.last().unwrap_or(&0), h.rows);
}

#[test]
fn dimer_ldos_peaks_at_plus_minus_t() {
    let model = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(2, 1, 1)));
    let kpm = Kpm::new(model, Config::default().with_energy_range(-1.5, 1.5)).expect("kpm");
    let e = energies(-1.4, 1.4, 281);
    let ldos = kpm
        .calc_ldos(&e, 0.05, Cartesian::zeros(), None)
        .expect("ldos");

    let peak = |range: std::ops::Range<usize>| {
        range
            .max_by(|&i, &j| ldos[i].total_cmp(&ldos[j]))
            .map(|i| e[i])
            .unwrap_or(f64::NAN)
    };
    let upper = peak(141..281);
    let lower = peak(0..140);
    assert!((upper - 1.0).abs() < 0.05, "upper peak at {upper}");
    assert!((lower + 1.0).abs() < 0.05, "lower peak at {lower}");
    assert!(ldos[140] < 0.1 * ldos.iter().copied().fold(0.0, f64::max));
}

#[test]
fn bipartite_torus_ldos_is_particle_hole_symmetric() {
    let model = Arc::new(
        Model::new(square_lattice(-1.0))
            .with_primitive(Primitive::new(4, 4, 1))
            .with_symmetry(TranslationalSymmetry::new(true, true, false)),
    );
    let e = energies(-3.8, 3.8, 77);
    let mirrored: Vec<f64> = e.iter().rev().copied().collect();
    for kernel in [Kernel::jackson(), Kernel::lorentz(None)] {
        let config = Config::default()
            .with_energy_range(-4.2, 4.2)
            .with_kernel(kernel);
        let kpm = Kpm::new(Arc::clone(&model), config).expect("kpm");
        let rho = kpm.calc_ldos(&e, 0.1, Cartesian::zeros(), None).expect("ldos");
        let rho_mirror = kpm
            .calc_ldos(&mirrored, 0.1, Cartesian::zeros(), None)
            .expect("mirrored ldos");
        for (a, b) in rho.iter().zip(&rho_mirror) {
            assert!((a - b).abs() < 1e-10, "{kernel:?}: {a} vs {b}");
        }
    }
}

#[test]
fn optimization_levels_give_the_same_ldos_for_less_work() {
    let model = Arc::new(Model::new(square_lattice(-1.0)).with_shape(Rectangle::new(16.2, 16.2)));
    let e = energies(-3.5, 3.5, 15);
    let run = |opt| {
        let config = Config::default().with_energy_range(-4.1, 4.1).with_opt_level(opt);
        let kpm = Kpm::new(Arc::clone(&model), config).expect("kpm");
        let ldos = kpm
            .calc_ldos(&e, 0.2, Cartesian::zeros(), None)
            .expect("ldos");
        (ldos, kpm.stats())
    };
    let (reference, base) = run(0);
    for opt in [1, 2, 3] {
        let (ldos, stats) = run(opt);
        for (a, b) in ldos.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-9, "opt {opt}: {a} vs {b}");
        }
        assert_eq!(stats.num_moments, base.num_moments);
        assert!(
            stats.num_operations < base.num_operations,
            "opt {opt}: {} ops vs {}",
            stats.num_operations,
            base.num_operations
        );
    }
}

#[test]
fn greens_function_is_symmetric_for_real_hamiltonians() {
    let model = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(12, 1, 1)));
    let kpm = Kpm::new(model, Config::default().with_energy_range(-2.1, 2.1)).expect("kpm");
    let e = energies(-1.5, 1.5, 13);
    let g_ij = kpm.calc_greens(2, 7, &e, 0.1).expect("G_27");
    let g_ji = kpm.calc_greens(7, 2, &e, 0.1).expect("G_72");
    for (a, b) in g_ij.iter().zip(&g_ji) {
        assert!((a - b).norm() < 1e-10, "{a} vs {b}");
    }
}

#[test]
fn deferred_ldos_runs_on_demand() {
    let model = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(30, 1, 1)));
    let kpm = Arc::new(
        Kpm::new(model, Config::default().with_energy_range(-2.1, 2.1)).expect("kpm"),
    );
    let e = energies(-1.0, 1.0, 11);
    let handles: Vec<Deferred<Vec<f64>>> = [-5.0, 0.0, 5.0]
        .iter()
        .map(|&x| kpm.deferred_ldos(e.clone(), 0.1, Cartesian::new(x, 0.0, 0.0), None))
        .collect();
    assert!(handles.iter().all(|d| !d.is_computed()));

    Deferred::compute_all(&handles);
    assert!(handles.iter().all(Deferred::is_computed));

    let direct = kpm
        .calc_ldos(&e, 0.1, Cartesian::new(5.0, 0.0, 0.0), None)
        .expect("direct ldos");
    let deferred = handles[2].compute().expect("cached result");
    assert_eq!(direct, deferred);
    assert!(Arc::ptr_eq(handles[0].kpm(), &kpm));
}

#[test]
fn stats_describe_the_last_run() {
    let model = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(40, 1, 1)));
    let kpm = Kpm::new(model, Config::default()).expect("kpm");
    assert_eq!(kpm.stats().num_moments, 0);
    kpm.calc_ldos(&[0.0], 0.05, Cartesian::zeros(), None)
        .expect("ldos");

    let stats = kpm.stats();
    assert!(stats.num_moments > 0);
    assert!(stats.num_operations > 0);
    assert!(stats.matrix_memory > 0 && stats.vector_memory > 0);
    assert_eq!(stats.backend, "host");
    let json = stats.to_json().expect("json");
    assert!(json.contains("\"num_moments\""), "{json}");

    let report = kpm.report(false);
    assert!(report.contains("Lanczos iterations"), "{report}");
    assert!(report.contains("Backend: host"), "{report}");
}

#[test]
fn gpu_preference_falls_back_for_complex_models() {
    let model = Arc::new(
        Model::new(chain_lattice(Complex64::new(0.0, -1.0))).with_primitive(Primitive::new(8, 1, 1)),
    );
    assert!(model.is_complex());
    let config = Config::default()
        .with_energy_range(-2.1, 2.1)
        .with_backend(BackendKind::Gpu);
    let kpm = Kpm::new(model, config).expect("kpm");
    assert_eq!(kpm.backend_name(), "host");
    assert!(matches!(kpm.backend_reason(), Reason::Fallback(_)));
    let ldos = kpm
        .calc_ldos(&energies(-2.0, 2.0, 41), 0.1, Cartesian::zeros(), None)
        .expect("host run");
    assert!(ldos.iter().all(|x| x.is_finite()));
    assert!(ldos.iter().any(|&x| x > 0.01));
}

#[test]
fn explicit_host_backend_and_model_swap() {
    let narrow = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(60, 1, 1)));
    let wide = Arc::new(Model::new(chain_lattice(-2.0)).with_primitive(Primitive::new(60, 1, 1)));
    let mut kpm =
        Kpm::with_backend(narrow, Config::default(), Box::new(HostBackend)).expect("kpm");
    let before = kpm.bounds().expect("narrow bounds");
    kpm.set_model(wide);
    let after = kpm.bounds().expect("wide bounds");
    assert!(after.max > 1.5 * before.max, "{after:?} vs {before:?}");
    assert!(after.min < 1.5 * before.min, "{after:?} vs {before:?}");
}

#[test]
fn one_sided_energy_range_is_a_configuration_error() {
    let model = Arc::new(Model::new(chain_lattice(-1.0)).with_primitive(Primitive::new(10, 1, 1)));
    let config = Config {
        max_energy: Some(2.0),
        ..Config::default()
    };
    let err = Kpm::new(model, config).err().expect("rejected");
    assert!(matches!(err, tbkpm::TbError::Configuration(_)), "{err}");
}
