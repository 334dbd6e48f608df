//! Basic structured mesh generators with strip partitioning and ghost layers.
//!
//! The generated cells carry their quadrature tabulation (P1 segments with a
//! 2-point Gauss rule, Q1 quadrilaterals with a 2x2 rule), so they can be fed
//! straight to the flux calculator.

use std::collections::{BTreeMap, BTreeSet};

use crate::afc_error::AfcError;
use crate::discretization::{Basis, tabulate_element};
use crate::topology::cell::{LocalMesh, MeshCell};
use crate::topology::connected_nodes::GlobalNodeId;

fn invalid_geometry(message: impl Into<String>) -> AfcError {
    AfcError::InvalidGeometry(message.into())
}

/// Every cell of a mesh, before distribution.
#[derive(Clone, Debug, Default)]
pub struct GlobalMesh {
    cells: Vec<MeshCell>,
}

impl GlobalMesh {
    pub fn new(cells: Vec<MeshCell>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[MeshCell] {
        &self.cells
    }

    /// Distinct node ids.
    pub fn node_ids(&self) -> BTreeSet<GlobalNodeId> {
        self.cells.iter().flat_map(|c| c.nodes.iter().copied()).collect()
    }

    /// Relabel every node id.
    pub fn renumber_nodes(mut self, f: impl Fn(GlobalNodeId) -> GlobalNodeId) -> Self {
        for cell in &mut self.cells {
            for n in &mut cell.nodes {
                *n = f(*n);
            }
        }
        self
    }

    /// Assign subdomain ids.
    pub fn with_subdomains(mut self, f: impl Fn(&MeshCell) -> u32) -> Self {
        for cell in &mut self.cells {
            cell.subdomain = f(cell);
        }
        self
    }

    /// The whole mesh owned by rank 0.
    pub fn serial(&self) -> LocalMesh {
        LocalMesh::serial(self.cells.clone())
    }

    /// Split into `n_ranks` contiguous strips of cells and give every rank
    /// `ghost_layers` layers of point-neighbour ghost cells.
    pub fn partition(&self, n_ranks: usize, ghost_layers: usize) -> Result<Vec<LocalMesh>, AfcError> {
        if n_ranks == 0 {
            return Err(invalid_geometry("cannot partition over zero ranks"));
        }
        let n_cells = self.cells.len();
        let mut cells = self.cells.clone();
        for (idx, cell) in cells.iter_mut().enumerate() {
            cell.owner = idx * n_ranks / n_cells.max(1);
        }

        let mut node_to_cells: BTreeMap<GlobalNodeId, Vec<usize>> = BTreeMap::new();
        for (idx, cell) in cells.iter().enumerate() {
            for &n in &cell.nodes {
                node_to_cells.entry(n).or_default().push(idx);
            }
        }

        let mut out = Vec::with_capacity(n_ranks);
        for rank in 0..n_ranks {
            let mut visible: BTreeSet<usize> = (0..n_cells).filter(|&c| cells[c].owner == rank).collect();
            let mut front = visible.clone();
            for _ in 0..ghost_layers {
                let next: BTreeSet<usize> = front
                    .iter()
                    .flat_map(|&c| cells[c].nodes.iter())
                    .flat_map(|n| node_to_cells[n].iter().copied())
                    .filter(|c| !visible.contains(c))
                    .collect();
                visible.extend(next.iter().copied());
                front = next;
            }
            out.push(LocalMesh::new(
                rank,
                visible.into_iter().map(|c| cells[c].clone()).collect(),
            ));
        }
        Ok(out)
    }
}

/// `n_cells` equal segments on `[0, length]`; node `i` sits at `i * length / n_cells`.
pub fn line_mesh(n_cells: usize, length: f64) -> Result<GlobalMesh, AfcError> {
    if n_cells == 0 || !(length > 0.0) {
        return Err(invalid_geometry(format!(
            "line mesh needs cells and a positive length, got {n_cells} cells over {length}"
        )));
    }
    let basis = Basis::LagrangeP1Segment;
    let rule = basis.gauss_rule(2)?;
    let h = length / n_cells as f64;
    let cells = (0..n_cells)
        .map(|i| {
            let coords = [vec![i as f64 * h], vec![(i + 1) as f64 * h]];
            Ok(MeshCell {
                id: i as u64,
                owner: 0,
                subdomain: 0,
                nodes: vec![i as u64, i as u64 + 1],
                tabulation: tabulate_element(basis, &rule, &coords)?,
            })
        })
        .collect::<Result<_, AfcError>>()?;
    Ok(GlobalMesh::new(cells))
}

/// `nx * ny` rectangles on `[0, lx] x [0, ly]`, cells numbered row by row.
/// Node `(ix, iy)` has id `iy * (nx + 1) + ix`.
pub fn quad_mesh(nx: usize, ny: usize, lx: f64, ly: f64) -> Result<GlobalMesh, AfcError> {
    if nx == 0 || ny == 0 || !(lx > 0.0) || !(ly > 0.0) {
        return Err(invalid_geometry(format!(
            "quad mesh needs a positive extent, got {nx}x{ny} cells over {lx}x{ly}"
        )));
    }
    let basis = Basis::LagrangeQ1Quadrilateral;
    let rule = basis.gauss_rule(2)?;
    let (hx, hy) = (lx / nx as f64, ly / ny as f64);
    let node = |ix: usize, iy: usize| (iy * (nx + 1) + ix) as u64;
    let mut cells = Vec::with_capacity(nx * ny);
    for iy in 0..ny {
        for ix in 0..nx {
            let corners = [(ix, iy), (ix + 1, iy), (ix + 1, iy + 1), (ix, iy + 1)];
            let coords: Vec<Vec<f64>> = corners
                .iter()
                .map(|&(a, b)| vec![a as f64 * hx, b as f64 * hy])
                .collect();
            cells.push(MeshCell {
                id: (iy * nx + ix) as u64,
                owner: 0,
                subdomain: 0,
                nodes: corners.iter().map(|&(a, b)| node(a, b)).collect(),
                tabulation: tabulate_element(basis, &rule, &coords)?,
            });
        }
    }
    Ok(GlobalMesh::new(cells))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_mesh_weights_sum_to_length() {
        let mesh = line_mesh(4, 2.0).unwrap();
        let total: f64 = mesh
            .cells()
            .iter()
            .flat_map(|c| c.tabulation.jxw.iter())
            .sum();
        assert!((total - 2.0).abs() < 1e-14);
        assert_eq!(mesh.node_ids().len(), 5);
    }

    #[test]
    fn quad_mesh_numbering() {
        let mesh = quad_mesh(2, 3, 1.0, 1.0).unwrap();
        assert_eq!(mesh.cells().len(), 6);
        assert_eq!(mesh.cells()[3].nodes, vec![4, 5, 8, 7]);
        assert_eq!(mesh.node_ids().len(), 12);
    }

    #[test]
    fn strips_and_ghost_layers() {
        let mesh = line_mesh(8, 1.0).unwrap();
        let parts = mesh.partition(2, 1).unwrap();
        assert_eq!(parts[0].owned_cells(None).count(), 4);
        let ghosts: Vec<u64> = parts[0].ghost_cells(None).map(|c| c.id).collect();
        assert_eq!(ghosts, vec![4]);
        let two = mesh.partition(2, 2).unwrap();
        let ghosts: Vec<u64> = two[1].ghost_cells(None).map(|c| c.id).collect();
        assert_eq!(ghosts, vec![2, 3]);
        assert!(two[1].ghost_cells(None).all(|c| c.owner == 0));
    }

    #[test]
    fn degenerate_requests_fail() {
        assert!(line_mesh(0, 1.0).is_err());
        assert!(quad_mesh(1, 1, 0.0, 1.0).is_err());
        assert!(line_mesh(2, 1.0).unwrap().partition(0, 1).is_err());
    }
}
