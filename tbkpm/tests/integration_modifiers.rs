// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: modifiers applied while a model is built.
//!
//! All cases start from a single cell of a two-atom square lattice, small
//! enough that every Hamiltonian element can be predicted by hand.

use num_complex::Complex64;
use tbkpm::system::HopEntry;
use tbkpm::{
    Cartesian, HoppingGenerator, HoppingModifier, Lattice, Model, OnsiteModifier,
    PositionModifier, Primitive, ScalarTag, SiteStateModifier, TbError, TranslationalSymmetry,
};

const T1: f64 = -1.0;

/// Square lattice, A at the corner and B at the center, four A–B bonds per cell.
fn square_2atom() -> Lattice {
    let mut lattice = Lattice::new(&[Cartesian::new(1.0, 0.0, 0.0), Cartesian::new(0.0, 1.0, 0.0)])
        .expect("square vectors");
    lattice
        .add_sublattice("A", Cartesian::zeros(), 0.0, None)
        .expect("sublattice A");
    lattice
        .add_sublattice("B", Cartesian::new(0.5, 0.5, 0.0), 0.0, None)
        .expect("sublattice B");
    lattice.register_hopping_energy("t1", T1).expect("t1");
    for offset in [[0, 0, 0], [-1, 0, 0], [0, -1, 0], [-1, -1, 0]] {
        lattice
            .add_registered_hopping(offset, "A", "B", "t1")
            .expect("A-B bond");
    }
    lattice
}

fn one_cell() -> Model {
    Model::new(square_2atom()).with_primitive(Primitive::new(1, 1, 1))
}

#[test]
fn single_cell_keeps_one_internal_bond() {
    let model = one_cell();
    let system = model.system().expect("system");
    assert_eq!(system.num_sites(), 2);
    assert_eq!(system.hoppings.nnz(), 1, "only the [0, 0] bond stays inside the cell");
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.tag(), ScalarTag::F64);
    assert_eq!(hamiltonian.nnz(), 2);
}

#[test]
fn onsite_modifier_fills_the_diagonal() {
    let mut model = one_cell();
    model
        .add(OnsiteModifier::new(|energy, _, _| {
            energy.fill_real(1.0);
            Ok(())
        }))
        .expect("register");
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.nnz(), 4);
    let h = hamiltonian.matrix::<f64>().expect("f64 matrix");
    assert_eq!(h.get(0, 0), Some(1.0));
    assert_eq!(h.get(1, 1), Some(1.0));
    assert_eq!(h.get(0, 1), Some(T1));
}

#[test]
fn hopping_modifier_can_remove_every_bond() {
    let mut model = one_cell();
    model
        .add(HoppingModifier::new(|energy, _, _, _| {
            energy.set_zero();
            Ok(())
        }))
        .expect("register");
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.nnz(), 0, "zeroed bonds are dropped from the matrix");
    assert_eq!(hamiltonian.rows(), 2);
}

#[test]
fn hopping_modifier_sees_endpoint_positions_and_ids() {
    let mut model = one_cell();
    let t1 = model.lattice().hopping_id("t1").expect("t1 id");
    model
        .add(HoppingModifier::new(move |energy, from, to, ids| {
            assert_eq!(from.len(), energy.len());
            assert!(ids.iter().all(|&id| id == t1));
            // scale by the bond length: √2 / 2 for every A-B bond
            energy.apply(|i, e| e * (to[i] - from[i]).norm())
        }))
        .expect("register");
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    let h = hamiltonian.matrix::<f64>().expect("f64 matrix");
    let value = h.get(0, 1).expect("bond kept");
    assert!((value - T1 * 0.5f64.sqrt()).abs() < 1e-12, "got {value}");
}

#[test]
fn state_modifiers_remove_sites_in_order() {
    let mut model = one_cell();
    let a = model.lattice().sublattice_id("A").expect("A");
    model
        .add(SiteStateModifier::new(move |state, _, sub| {
            for (valid, &s) in state.iter_mut().zip(sub) {
                if s == a {
                    *valid = false;
                }
            }
        }))
        .expect("register");
    let system = model.system().expect("one site remains");
    assert_eq!(system.num_sites(), 1);
    assert_eq!(system.hoppings.nnz(), 0);

    model
        .add(SiteStateModifier::new(|state, _, _| state.fill(false)))
        .expect("register");
    assert!(matches!(model.system(), Err(TbError::State(_))));
}

#[test]
fn state_modifier_pruning_takes_the_orphaned_neighbor() {
    let mut model = one_cell();
    let a = model.lattice().sublattice_id("A").expect("A");
    model
        .add(
            SiteStateModifier::new(move |state, _, sub| {
                for (valid, &s) in state.iter_mut().zip(sub) {
                    *valid &= s != a;
                }
            })
            .with_min_neighbors(1),
        )
        .expect("register");
    assert!(matches!(model.system(), Err(TbError::State(_))));
}

#[test]
fn position_modifier_moves_sites() {
    let mut model = one_cell();
    model
        .add(PositionModifier::new(|positions, _| {
            for p in positions.iter_mut() {
                p.z += 2.0;
            }
        }))
        .expect("register");
    let system = model.system().expect("system");
    assert!(system.positions.iter().all(|p| (p.z - 2.0).abs() < 1e-12));
}

#[test]
fn generated_bond_is_stored_upper_and_conjugated() {
    let mut model = one_cell();
    model
        .add(HoppingGenerator::new("t2", 0.3, |_, _| (vec![1], vec![0])))
        .expect("register");
    let system = model.system().expect("system");
    let t2 = system.lattice().hopping_id("t2").expect("t2 registered");
    assert_eq!(
        system.hoppings.get(0, 1),
        Some(HopEntry {
            id: t2,
            conjugate: true
        }),
        "generated bond replaces the lattice bond at the same position"
    );
    assert!(system.hoppings.is_upper_triangular());
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.matrix::<f64>().expect("f64").get(1, 0), Some(0.3));
}

#[test]
fn generated_pair_in_both_directions_is_stored_once() {
    let mut model = one_cell();
    model
        .add(HoppingGenerator::new("t2", 0.3, |_, _| (vec![0, 1], vec![1, 0])))
        .expect("register");
    let system = model.system().expect("system");
    let t2 = system.lattice().hopping_id("t2").expect("t2 registered");
    assert_eq!(system.hoppings.nnz(), 1);
    assert!(system.hoppings.is_upper_triangular());
    // the later (1, 0) bond wins
    assert_eq!(
        system.hoppings.get(0, 1),
        Some(HopEntry {
            id: t2,
            conjugate: true
        })
    );

    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.nnz(), 2);
    let h = hamiltonian.matrix::<f64>().expect("f64");
    assert_eq!(h.get(0, 1), Some(0.3));
    assert_eq!(h.get(1, 0), Some(0.3));
}

#[test]
fn generated_self_pair_is_skipped() {
    let mut model = one_cell();
    model
        .add(HoppingGenerator::new("t2", 0.3, |_, _| (vec![0, 0], vec![0, 1])))
        .expect("register");
    let system = model.system().expect("system");
    let t2 = system.lattice().hopping_id("t2").expect("t2 registered");
    assert_eq!(system.hoppings.nnz(), 1);
    assert_eq!(system.hoppings.get(0, 0), None);
    assert_eq!(
        system.hoppings.get(0, 1),
        Some(HopEntry {
            id: t2,
            conjugate: false
        })
    );
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    let h = hamiltonian.matrix::<f64>().expect("f64");
    assert_eq!(h.get(0, 0), None, "no diagonal element from a self-pair");
    assert_eq!(h.get(0, 1), Some(0.3));
}

#[test]
fn complex_generator_makes_the_model_complex() {
    let mut model = one_cell();
    let energy = Complex64::new(0.0, 0.5);
    model
        .add(HoppingGenerator::new("t2", energy, |_, _| (vec![1], vec![0])))
        .expect("register");
    assert!(model.is_complex());
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.tag(), ScalarTag::Cf64);
    let h = hamiltonian.matrix::<Complex64>().expect("c64 matrix");
    // H[from][to] carries the energy, its transpose the conjugate
    assert_eq!(h.get(1, 0), Some(energy));
    assert_eq!(h.get(0, 1), Some(energy.conj()));
    assert!(h.is_hermitian(1e-14));
}

#[test]
fn duplicate_generator_name_is_rejected() {
    let mut model = one_cell();
    let err = model
        .add(HoppingGenerator::new("t1", 0.3, |_, _| (vec![], vec![])))
        .expect_err("t1 already registered");
    assert!(matches!(err, TbError::Configuration(_)));
}

#[test]
fn generator_index_out_of_range_is_rejected() {
    let mut model = one_cell();
    model
        .add(HoppingGenerator::new("t2", 0.3, |_, _| (vec![0], vec![7])))
        .expect("register");
    assert!(matches!(model.system(), Err(TbError::Configuration(_))));
}

#[test]
fn real_model_rejects_complex_onsite_values() {
    let mut model = one_cell();
    model
        .add(OnsiteModifier::new(|energy, _, _| {
            energy.apply(|_, _| Complex64::new(0.0, 1.0))
        }))
        .expect("register");
    assert!(model.hamiltonian().is_err());

    let mut declared = one_cell();
    declared
        .add(
            OnsiteModifier::new(|energy, _, _| energy.apply(|_, _| Complex64::new(0.0, 1.0)))
                .complex(),
        )
        .expect("register");
    assert_eq!(declared.hamiltonian().expect("complex build").tag(), ScalarTag::Cf64);
}

#[test]
fn periodic_cell_sums_the_wrapped_bonds() {
    let model = one_cell().with_symmetry(TranslationalSymmetry::new(true, true, false));
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.nnz(), 2, "all four bonds land on the same A-B pair");
    let h = hamiltonian.matrix::<f64>().expect("f64 matrix");
    let total = h.get(0, 1).expect("A-B element");
    assert!((total - 4.0 * T1).abs() < 1e-12, "got {total}");
}

#[test]
fn single_precision_model_builds_f32() {
    let model = one_cell().with_precision(tbkpm::Precision::Single);
    assert_eq!(model.scalar_tag(), ScalarTag::F32);
    let hamiltonian = model.hamiltonian().expect("hamiltonian");
    assert_eq!(hamiltonian.matrix::<f32>().expect("f32").get(1, 0), Some(-1.0f32));
}
