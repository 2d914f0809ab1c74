// SPDX-License-Identifier: AGPL-3.0-only

//! Lattice → System Validation
//!
//! Checks system construction against hand-counted geometry:
//!
//! **Shapes**:
//! - 3×3 block cut from the square lattice: 9 sites, 12 bonds
//! - Honeycomb disc with `min_neighbors = 2`: no site below two bonds,
//!   none above three
//!
//! **Periodic boundaries**:
//! - Honeycomb torus: every site has exactly three neighbors
//! - Single-site ring: `H₀₀(k) = 2t cos(k)` (Bloch phase per boundary)
//!
//! **Modifiers**:
//! - Next-nearest-neighbor generator on the square block adds 8 bonds
//! - Hopping modifier strain: energies scale with bond length
//!
//! Set `RUST_LOG=tbkpm=debug` for build diagnostics.

use std::f64::consts::PI;

use num_complex::Complex64;
use tbkpm::validation::ValidationHarness;
use tbkpm::{
    Cartesian, Circle, HoppingGenerator, HoppingModifier, Lattice, Model, PositionModifier,
    Primitive, Rectangle, TranslationalSymmetry,
};
use tracing_subscriber::EnvFilter;

const T: f64 = -1.0;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Lattice → System Validation                                ║");
    println!("║  shapes, pruning, periodic boundaries, modifiers            ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut harness = ValidationHarness::new("lattice_system");

    check_square_block(&mut harness);
    check_honeycomb_disc(&mut harness);
    check_honeycomb_torus(&mut harness);
    check_bloch_ring(&mut harness);
    check_generator(&mut harness);
    check_strain(&mut harness);

    println!();
    harness.finish();
}

fn square() -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)])
        .expect("square vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice");
    lattice.add_hopping([1, 0, 0], "A", "A", T).expect("x bond");
    lattice.add_hopping([0, 1, 0], "A", "A", T).expect("y bond");
    lattice
}

/// Honeycomb with unit lattice constant; B sits at the triangle centroid.
fn honeycomb() -> Lattice {
    let mut lattice = Lattice::new(&[
        Cartesian::new(1.0, 0.0, 0.0),
        Cartesian::new(0.5, 0.75f64.sqrt(), 0.0),
    ])
    .expect("honeycomb vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("A");
    lattice
        .add_sublattice("B", Cartesian::new(0.5, 0.5 / 3f64.sqrt(), 0.0), 0.0, None)
        .expect("B");
    for offset in [[0, 0, 0], [-1, 0, 0], [0, -1, 0]] {
        lattice.add_hopping(offset, "A", "B", T).expect("A-B bond");
    }
    lattice
}

/// Number of bulk bonds at every site.
fn degrees(model: &Model) -> Vec<usize> {
    let Ok(system) = model.system() else {
        return Vec::new();
    };
    let mut degree = vec![0; system.num_sites()];
    for (i, j, _) in system.hoppings.triplets() {
        degree[i] += 1;
        degree[j] += 1;
    }
    degree
}

/// \[1\] 3×3 square block: 9 sites, 6 + 6 bonds.
fn check_square_block(harness: &mut ValidationHarness) {
    println!("[1] Square block — counted sites and bonds");
    let model = Model::new(square()).with_shape(Rectangle::new(2.2, 2.2));
    match model.system() {
        Ok(system) => {
            println!("  {}", system.report());
            harness.check_abs("square block sites", system.num_sites() as f64, 9.0, 0.5);
            harness.check_abs("square block bonds", system.hoppings.nnz() as f64, 12.0, 0.5);
            harness.check_bool("bulk stored upper-triangular", system.hoppings.is_upper_triangular());
        }
        Err(e) => {
            println!("  build failed: {e}");
            harness.check_bool("square block builds", false);
        }
    }
    println!();
}

/// \[2\] Honeycomb disc: pruning leaves 2 ≤ degree ≤ 3.
fn check_honeycomb_disc(harness: &mut ValidationHarness) {
    println!("[2] Honeycomb disc — dangling-site pruning");
    let disc = || Circle::new(4.0, Cartesian::zeros());
    let raw = Model::new(honeycomb()).with_shape(disc());
    let pruned = Model::new(honeycomb().with_min_neighbors(2)).with_shape(disc());

    let raw_degree = degrees(&raw);
    let degree = degrees(&pruned);
    let min = degree.iter().copied().min().unwrap_or(0);
    let max = degree.iter().copied().max().unwrap_or(0);
    println!(
        "  sites: {} unpruned, {} pruned; degree range [{min}, {max}]",
        raw_degree.len(),
        degree.len()
    );
    harness.check_bool("pruned disc is not empty", !degree.is_empty());
    harness.check_lower("minimum degree after pruning", min as f64, 1.5);
    harness.check_upper("maximum degree", max as f64, 3.5);
    harness.check_bool("pruning never adds sites", degree.len() <= raw_degree.len());
    println!();
}

/// \[3\] Honeycomb torus: exactly three neighbors everywhere.
fn check_honeycomb_torus(harness: &mut ValidationHarness) {
    println!("[3] Honeycomb torus — periodic boundaries");
    let model = Model::new(honeycomb())
        .with_primitive(Primitive::new(6, 6, 1))
        .with_symmetry(TranslationalSymmetry::new(true, true, false));
    let hamiltonian = match model.hamiltonian() {
        Ok(h) => h,
        Err(e) => {
            println!("  build failed: {e}");
            harness.check_bool("honeycomb torus builds", false);
            println!();
            return;
        }
    };
    let h = hamiltonian.to_complex();
    let worst = (0..h.rows)
        .map(|i| {
            let weight: f64 = h.row(i).map(|(_, v)| v.norm()).sum();
            (weight - 3.0 * T.abs()).abs()
        })
        .fold(0.0, f64::max);
    println!("  {} sites, {} nonzeros", h.rows, h.nnz());
    harness.check_abs("torus sites", h.rows as f64, 72.0, 0.5);
    harness.check_abs("torus nonzeros (3 per site)", h.nnz() as f64, 216.0, 0.5);
    harness.check_upper("row weight − 3|t|", worst, 1e-12);
    harness.check_bool("Hermitian", h.is_hermitian(1e-14));
    println!();
}

/// \[4\] One-site ring: the Bloch phases of both boundary bonds sum to 2t cos k.
fn check_bloch_ring(harness: &mut ValidationHarness) {
    println!("[4] Bloch ring — wave-vector phase");
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("A");
    lattice.add_hopping([1, 0, 0], "A", "A", T).expect("bond");

    let mut model = Model::new(lattice)
        .with_primitive(Primitive::new(1, 1, 1))
        .with_symmetry(TranslationalSymmetry::new(true, false, false));
    let mut worst: f64 = 0.0;
    for step in 0..=8 {
        let k = PI * f64::from(step) / 8.0;
        model.set_wave_vector(Cartesian::new(k, 0.0, 0.0));
        let value = match model.hamiltonian() {
            Ok(h) => h.to_complex().get(0, 0).unwrap_or_default(),
            Err(_) => Complex64::new(f64::INFINITY, 0.0),
        };
        let expected = 2.0 * T * k.cos();
        worst = worst.max((value - expected).norm());
    }
    println!("  max |H₀₀(k) − 2t cos k| = {worst:.2e}");
    harness.check_upper("Bloch band of a one-site ring", worst, 1e-12);
    println!();
}

/// \[5\] Diagonal next-nearest bonds from a generator.
fn check_generator(harness: &mut ValidationHarness) {
    println!("[5] Hopping generator — next-nearest neighbors");
    let mut model = Model::new(square()).with_shape(Rectangle::new(2.2, 2.2));
    let generator = HoppingGenerator::new("t_nnn", 0.1, |positions, _| {
        let mut from = Vec::new();
        let mut to = Vec::new();
        for (i, a) in positions.iter().enumerate() {
            for (j, b) in positions.iter().enumerate().skip(i + 1) {
                if ((a - b).norm() - 2f64.sqrt()).abs() < 1e-6 {
                    from.push(i);
                    to.push(j);
                }
            }
        }
        (from, to)
    });
    if let Err(e) = model.add(generator) {
        println!("  register failed: {e}");
        harness.check_bool("generator registers", false);
        return;
    }
    let bonds = model.system().map(|s| s.hoppings.nnz()).unwrap_or(0);
    println!("  bonds with diagonals: {bonds}");
    harness.check_abs("12 nearest + 8 diagonal bonds", bonds as f64, 20.0, 0.5);
    println!();
}

/// \[6\] Strain modifier: `t → t · |r_ij|` with positions stretched along x.
fn check_strain(harness: &mut ValidationHarness) {
    println!("[6] Hopping modifier — bond-length scaling");
    let stretch = 1.1;
    let hamiltonian = match strained_block(stretch).and_then(|model| model.hamiltonian()) {
        Ok(h) => h,
        Err(e) => {
            println!("  build failed: {e}");
            harness.check_bool("strained model builds", false);
            println!();
            return;
        }
    };
    let h = hamiltonian.to_complex();
    let mut x_bonds = 0u32;
    let mut y_bonds = 0u32;
    for (_, _, v) in h.triplets() {
        if (v.re - T * stretch).abs() < 1e-12 {
            x_bonds += 1;
        } else if (v.re - T).abs() < 1e-12 {
            y_bonds += 1;
        }
    }
    println!("  stretched bonds: {x_bonds}, unchanged bonds: {y_bonds}");
    harness.check_abs("stretched x bonds (both triangles)", f64::from(x_bonds), 12.0, 0.5);
    harness.check_abs("unchanged y bonds (both triangles)", f64::from(y_bonds), 12.0, 0.5);
    println!();
}

fn strained_block(stretch: f64) -> tbkpm::Result<Model> {
    let mut model = Model::new(square()).with_shape(Rectangle::new(2.2, 2.2));
    model.add(PositionModifier::new(move |positions, _| {
        for p in positions.iter_mut() {
            p.x *= stretch;
        }
    }))?;
    model.add(HoppingModifier::new(|energy, from, to, _| {
        energy.apply(|i, e| e * (to[i] - from[i]).norm())
    }))?;
    Ok(model)
}
