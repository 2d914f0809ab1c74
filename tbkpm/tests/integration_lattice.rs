// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: lattice description through to the built system.
//!
//! Sites and bonds are counted by hand for small shapes, and the neighbor
//! pruning postcondition is rechecked from the assembled hopping matrix.

use tbkpm::{
    Cartesian, Circle, FreeformShape, Lattice, Line, Model, Polygon, Primitive, Rectangle,
    TbError, TranslationalSymmetry,
};

fn square(t: f64) -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)])
        .expect("square vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice A");
    lattice.add_hopping([1, 0, 0], "A", "A", t).expect("x bond");
    lattice.add_hopping([0, 1, 0], "A", "A", t).expect("y bond");
    lattice
}

fn chain() -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice A");
    lattice.add_hopping([1, 0, 0], "A", "A", -1.0).expect("bond");
    lattice
}

/// Bond count of every site, from the upper-triangular bulk matrix.
fn degrees(model: &Model) -> Vec<usize> {
    let system = model.system().expect("system");
    let mut degree = vec![0; system.num_sites()];
    for (i, j, _) in system.hoppings.triplets() {
        degree[i] += 1;
        degree[j] += 1;
    }
    degree
}

#[test]
fn rectangle_on_square_lattice_counts_sites_and_bonds() {
    let model = Model::new(square(-1.0)).with_shape(Rectangle::new(2.2, 2.2));
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 9, "3x3 block expected");
    assert_eq!(system.hoppings.nnz(), 12, "6 horizontal + 6 vertical bonds");
    assert!(system.hoppings.is_upper_triangular());
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.rows(), 9);
    assert_eq!(hamiltonian.nnz(), 24, "both triangles stored, empty diagonal dropped");
}

#[test]
fn line_cuts_a_chain_segment() {
    let model = Model::new(chain())
        .with_shape(Line::new(Cartesian::new(-2.5, 0.0, 0.0), Cartesian::new(2.5, 0.0, 0.0)));
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 5);
    assert_eq!(system.hoppings.nnz(), 4);
}

#[test]
fn polygon_matches_equivalent_rectangle() {
    let polygon = Polygon::new(vec![
        Cartesian::new(-1.1, -1.1, 0.0),
        Cartesian::new(1.1, -1.1, 0.0),
        Cartesian::new(1.1, 1.1, 0.0),
        Cartesian::new(-1.1, 1.1, 0.0),
    ]);
    let from_polygon = Model::new(square(-1.0)).with_shape(polygon);
    let from_rectangle = Model::new(square(-1.0)).with_shape(Rectangle::new(2.2, 2.2));
    let a = from_polygon.system().expect("polygon system");
    let b = from_rectangle.system().expect("rectangle system");
    assert_eq!(a.num_sites(), b.num_sites());
    assert_eq!(a.hoppings.nnz(), b.hoppings.nnz());
}

/// Radius 2.05 on the unit square lattice: a 3×3 block plus four one-bond tips.
fn small_disc() -> Circle {
    Circle::new(2.05, Cartesian::zeros())
}

#[test]
fn disc_pruning_removes_the_tips() {
    let unpruned = Model::new(square(-1.0)).with_shape(small_disc());
    let pruned = Model::new(square(-1.0).with_min_neighbors(2)).with_shape(small_disc());

    let raw = unpruned.system().expect("unpruned system");
    assert_eq!(raw.num_sites(), 13);
    assert_eq!(raw.hoppings.nnz(), 16);

    let system = pruned.system().expect("pruned system");
    assert_eq!(system.num_sites(), 9, "only the 3×3 block survives");
    assert_eq!(system.hoppings.nnz(), 12);

    let degree = degrees(&pruned);
    let weakest = degree.iter().copied().min().unwrap_or(0);
    assert!(weakest >= 2, "site with only {weakest} neighbors survived pruning");
}

#[test]
fn pruning_above_the_corner_degree_empties_the_disc() {
    // corners of any finite square-lattice region have at most two bonds
    let model = Model::new(square(-1.0).with_min_neighbors(3)).with_shape(small_disc());
    assert!(matches!(model.system(), Err(TbError::State(_))));
}

#[test]
fn freeform_mask_of_wrong_length_is_rejected() {
    let shape = FreeformShape::with_box(
        |_| vec![true],
        Cartesian::new(3.0, 3.0, 0.0),
        Cartesian::zeros(),
    );
    let model = Model::new(square(-1.0)).with_shape(shape);
    assert!(matches!(model.system(), Err(TbError::Configuration(_))));
}

#[test]
fn freeform_mask_selects_sites() {
    let shape = FreeformShape::with_box(
        |positions| positions.iter().map(|p| p.x.abs() < 1.5 && p.y.abs() < 0.5).collect(),
        Cartesian::new(3.0, 1.0, 0.0),
        Cartesian::zeros(),
    );
    let model = Model::new(square(-1.0)).with_shape(shape);
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 3);
    assert_eq!(system.hoppings.nnz(), 2);
}

#[test]
fn primitive_block_is_centered_on_the_origin() {
    let model = Model::new(square(-1.0)).with_primitive(Primitive::new(4, 3, 1));
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 12);
    assert_eq!(system.hoppings.nnz(), 3 * 3 + 4 * 2);
    let nearest = system
        .find_nearest(Cartesian::zeros(), None)
        .expect("some site");
    assert!(system.positions[nearest].norm() < 1e-12, "a site sits at the origin");
}

#[test]
fn periodic_square_wraps_along_both_directions() {
    let model = Model::new(square(-1.0))
        .with_primitive(Primitive::new(4, 4, 1))
        .with_symmetry(TranslationalSymmetry::new(true, true, false));
    let system = model.system().expect("system");
    assert_eq!(system.hoppings.nnz(), 24);
    assert_eq!(system.boundaries.len(), 2, "one boundary per periodic direction");
    let wrapped: usize = system.boundaries.iter().map(|b| b.hoppings.nnz()).sum();
    assert_eq!(wrapped, 8);

    // every site of the torus has exactly four neighbors
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.nnz(), 64);
    let h = hamiltonian.to_complex();
    for i in 0..h.rows {
        let weight: f64 = h.row(i).map(|(_, v)| v.norm()).sum();
        assert!((weight - 4.0).abs() < 1e-12, "row {i} weight {weight}");
    }
}

#[test]
fn open_direction_of_a_slab_has_no_boundary() {
    let model = Model::new(square(-1.0))
        .with_primitive(Primitive::new(4, 4, 1))
        .with_symmetry(TranslationalSymmetry::new(true, false, false));
    let system = model.system().expect("system");
    assert_eq!(system.boundaries.len(), 1);
    assert_eq!(system.boundaries[0].hoppings.nnz(), 4);
}

#[test]
fn naming_rules_are_configuration_errors() {
    let mut lattice = square(-1.0);
    assert!(matches!(
        lattice.add_sublattice("A", Cartesian::zeros(), 0.0, None),
        Err(TbError::Configuration(_))
    ));
    assert!(matches!(
        lattice.add_sublattice("", Cartesian::zeros(), 0.0, None),
        Err(TbError::Configuration(_))
    ));
    assert!(matches!(
        lattice.add_hopping([1, 0, 0], "A", "missing", -1.0),
        Err(TbError::Configuration(_))
    ));
    assert!(matches!(
        lattice.add_hopping([0, 0, 0], "A", "A", -1.0),
        Err(TbError::Configuration(_))
    ));
    assert!(matches!(
        lattice.add_hopping([1, 0, 0], "A", "A", -1.0),
        Err(TbError::Configuration(_))
    ));
}

#[test]
fn at_most_256_sublattices() {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0)]).expect("chain vector");
    for i in 0..256 {
        let x = f64::from(i) / 512.0;
        lattice
            .add_sublattice(&format!("s{i}"), Cartesian::new(x, 0.0, 0.0), 0.0, None)
            .expect("within capacity");
    }
    assert!(lattice
        .add_sublattice("overflow", Cartesian::zeros(), 0.0, None)
        .is_err());
}

#[test]
fn alias_sites_report_the_target_sublattice() {
    let mut lattice = chain();
    lattice
        .add_sublattice("A2", Cartesian::new(0.5, 0.0, 0.0), 0.0, Some("A"))
        .expect("alias");
    let a = lattice.sublattice_id("A").expect("A");
    let model = Model::new(lattice).with_primitive(Primitive::new(3, 1, 1));
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 6);
    assert!(system.sublattices.iter().all(|&s| s == a));
}

#[test]
fn empty_shape_is_a_state_error() {
    let model = Model::new(square(-1.0)).with_shape(Circle::new(0.2, Cartesian::new(0.5, 0.5, 0.0)));
    assert!(matches!(model.system(), Err(TbError::State(_))));
    assert!(model.report().contains("0 sites"));
}
