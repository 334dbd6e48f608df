#![allow(dead_code)]
use std::collections::BTreeMap;

use mesh_afc::algs::communicator::LocalComm;
use mesh_afc::algs::meshgen::GlobalMesh;
use mesh_afc::flux::SparseRow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Run `f` once per rank of an in-process world, each on its own thread.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalComm) -> T + Sync,
{
    let world = LocalComm::world(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Seeded random value in `[0, 1)` for every node of `mesh`.
pub fn random_field(mesh: &GlobalMesh, seed: u64) -> BTreeMap<u64, f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    mesh.node_ids()
        .into_iter()
        .map(|n| (n, rng.gen_range(0.0..1.0)))
        .collect()
}

pub fn assert_close(got: f64, want: f64, tol: f64, what: &str) {
    assert!(
        (got - want).abs() <= tol * (1.0 + want.abs()),
        "{what}: got {got}, want {want}"
    );
}

/// Same support, entries equal within `tol`.
pub fn assert_rows_close(got: &SparseRow, want: &SparseRow, tol: f64, what: &str) {
    assert_eq!(
        got.keys().collect::<Vec<_>>(),
        want.keys().collect::<Vec<_>>(),
        "{what}: support differs"
    );
    for ((k, a), (_, b)) in got.iter().zip(want.iter()) {
        assert_close(a, b, tol, &format!("{what} at {k}"));
    }
}

pub fn assert_nested_close(got: &[Vec<f64>], want: &[Vec<f64>], tol: f64, what: &str) {
    assert_eq!(got.len(), want.len(), "{what}: outer length differs");
    for (j, (g, w)) in got.iter().zip(want).enumerate() {
        assert_eq!(g.len(), w.len(), "{what}: row {j} length differs");
        for (k, (a, b)) in g.iter().zip(w).enumerate() {
            assert_close(*a, *b, tol, &format!("{what}[{j}][{k}]"));
        }
    }
}
