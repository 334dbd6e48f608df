//! Results must not depend on the number of worker threads or ranks, up to
//! floating-point summation order.

mod util;

use std::collections::{BTreeMap, BTreeSet};

use mesh_afc::algs::communicator::CommTag;
use mesh_afc::prelude::*;
use util::{assert_close, assert_nested_close, assert_rows_close, random_field, run_ranks};

const TOL: f64 = 1e-11;
const VELOCITY: [f64; 3] = [1.0, 0.3, 0.0];

struct NodeResult {
    flux: f64,
    du: SparseRow,
    dk: Vec<Vec<f64>>,
}

fn snapshot(calc: &AdvectiveFluxCalculator, nodes: &BTreeSet<u64>) -> BTreeMap<u64, NodeResult> {
    nodes
        .iter()
        .map(|&n| {
            let result = NodeResult {
                flux: calc.flux_out(n).unwrap(),
                du: calc.dflux_out_du(n).unwrap().clone(),
                dk: calc.dflux_out_dkjk(n).unwrap().to_vec(),
            };
            (n, result)
        })
        .collect()
}

fn assert_same(got: &BTreeMap<u64, NodeResult>, want: &BTreeMap<u64, NodeResult>) {
    for (n, g) in got {
        let w = &want[n];
        assert_close(g.flux, w.flux, TOL, &format!("flux_out({n})"));
        assert_rows_close(&g.du, &w.du, TOL, &format!("dflux_out_du({n})"));
        assert_nested_close(&g.dk, &w.dk, TOL, &format!("dflux_out_dkjk({n})"));
    }
}

fn serial_reference(mesh: &GlobalMesh, field: &BTreeMap<u64, f64>) -> AdvectiveFluxCalculator {
    let local = mesh.serial();
    let provider = ConstantVelocity::new(VELOCITY, field.clone());
    let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_threads(1)).unwrap();
    calc.setup(&local, &NoComm).unwrap();
    calc.compute(&local, &provider, &NoComm).unwrap();
    calc
}

#[test]
fn thread_count_does_not_change_results() {
    let mesh = quad_mesh(8, 6, 1.0, 1.0).unwrap();
    let field = random_field(&mesh, 42);
    let nodes = mesh.node_ids();
    let reference = snapshot(&serial_reference(&mesh, &field), &nodes);

    for threads in [2, 4, 7] {
        let local = mesh.serial();
        let provider = ConstantVelocity::new(VELOCITY, field.clone());
        let mut calc =
            AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_threads(threads)).unwrap();
        calc.setup(&local, &NoComm).unwrap();
        calc.compute(&local, &provider, &NoComm).unwrap();
        assert_same(&snapshot(&calc, &nodes), &reference);
    }
}

/// Nodes of owned cells see a complete stencil when two ghost layers are present.
fn owned_nodes(mesh: &LocalMesh) -> BTreeSet<u64> {
    mesh.owned_cells(None)
        .flat_map(|c| c.nodes.iter().copied())
        .collect()
}

fn check_rank_count(n_ranks: usize) {
    let mesh = quad_mesh(6, 6, 1.0, 1.0).unwrap();
    let field = random_field(&mesh, 7);
    let reference_calc = serial_reference(&mesh, &field);
    let reference = snapshot(&reference_calc, &mesh.node_ids());
    let parts = mesh.partition(n_ranks, 2).unwrap();

    let per_rank = run_ranks(n_ranks, |comm| {
        let local = &parts[comm.rank()];
        let provider = ConstantVelocity::new(VELOCITY, field.clone());
        let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default().with_threads(2)).unwrap();
        calc.setup(local, comm).unwrap();
        calc.compute(local, &provider, comm).unwrap();
        let nodes = owned_nodes(local);
        let valences: Vec<((u64, u64), u32)> = local
            .owned_cells(None)
            .flat_map(|c| {
                c.nodes
                    .iter()
                    .flat_map(|&a| c.nodes.iter().map(move |&b| (a, b)))
                    .collect::<Vec<_>>()
            })
            .map(|(a, b)| ((a, b), calc.valence(a, b).unwrap()))
            .collect();
        let kij: Vec<((u64, u64), f64)> = valences
            .iter()
            .map(|&((a, b), _)| ((a, b), calc.kij(a, b).unwrap()))
            .collect();
        (snapshot(&calc, &nodes), valences, kij)
    });

    let mut covered = BTreeSet::new();
    for (results, valences, kij) in &per_rank {
        assert_same(results, &reference);
        covered.extend(results.keys().copied());
        for &((a, b), v) in valences {
            assert_eq!(v, reference_calc.valence(a, b).unwrap(), "valence({a}, {b})");
        }
        for &((a, b), k) in kij {
            assert_close(k, reference_calc.kij(a, b).unwrap(), TOL, &format!("K[{a}][{b}]"));
        }
    }
    assert_eq!(covered, mesh.node_ids());
}

#[test]
fn two_ranks_match_serial() {
    check_rank_count(2);
}

#[test]
fn three_ranks_match_serial() {
    check_rank_count(3);
}

#[test]
fn one_local_rank_matches_serial() {
    check_rank_count(1);
}

#[test]
fn calculators_with_separate_tags_share_ranks() {
    let mesh = quad_mesh(5, 4, 1.0, 1.0).unwrap();
    let fields = [random_field(&mesh, 21), random_field(&mesh, 22)];
    let references: Vec<_> = fields
        .iter()
        .map(|f| snapshot(&serial_reference(&mesh, f), &mesh.node_ids()))
        .collect();
    let parts = mesh.partition(2, 2).unwrap();

    let per_rank = run_ranks(2, |comm| {
        let local = &parts[comm.rank()];
        let mut calcs: Vec<AdvectiveFluxCalculator> = [0x1000u16, 0x2000]
            .into_iter()
            .map(|base| {
                AdvectiveFluxCalculator::new(FluxCalculatorConfig::default())
                    .unwrap()
                    .with_tags(GhostCommTags::from_base(CommTag::new(base)))
            })
            .collect();
        for calc in &mut calcs {
            calc.setup(local, comm).unwrap();
        }
        for (calc, field) in calcs.iter_mut().zip(&fields) {
            let provider = ConstantVelocity::new(VELOCITY, field.clone());
            calc.compute(local, &provider, comm).unwrap();
        }
        let nodes = owned_nodes(local);
        calcs.iter().map(|c| snapshot(c, &nodes)).collect::<Vec<_>>()
    });

    for results in &per_rank {
        for (got, want) in results.iter().zip(&references) {
            assert_same(got, want);
        }
    }
}
