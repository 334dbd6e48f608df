//! Cells as seen by one rank: owned cells plus ghost layers.
//!
//! A [`LocalMesh`] is what the mesh collaborator hands to the calculator. Every
//! cell carries its local-to-global node map, its owning rank, its subdomain,
//! and the quadrature data needed by a [`TransportProvider`](crate::physics::TransportProvider).

use std::collections::BTreeSet;

use crate::discretization::ElementTabulation;
use crate::topology::connected_nodes::GlobalNodeId;

/// One mesh cell with its quadrature data.
#[derive(Clone, Debug)]
pub struct MeshCell {
    /// Globally unique cell id.
    pub id: u64,
    /// Rank that owns (and integrates) this cell.
    pub owner: usize,
    /// Subdomain (block) id.
    pub subdomain: u32,
    /// Local-to-global node map.
    pub nodes: Vec<GlobalNodeId>,
    /// Shape values, gradients and weights at the quadrature points.
    pub tabulation: ElementTabulation,
}

impl MeshCell {
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn n_qp(&self) -> usize {
        self.tabulation.n_qp()
    }
}

/// The cells visible to one rank.
#[derive(Clone, Debug, Default)]
pub struct LocalMesh {
    rank: usize,
    cells: Vec<MeshCell>,
}

impl LocalMesh {
    pub fn new(rank: usize, cells: Vec<MeshCell>) -> Self {
        Self { rank, cells }
    }

    /// A serial mesh: every cell is owned by rank 0.
    pub fn serial(mut cells: Vec<MeshCell>) -> Self {
        for c in &mut cells {
            c.owner = 0;
        }
        Self { rank: 0, cells }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Owned and ghost cells in this rank's (ghosted) view.
    pub fn evaluable_cells<'a>(
        &'a self,
        blocks: Option<&'a BTreeSet<u32>>,
    ) -> impl Iterator<Item = &'a MeshCell> + 'a {
        self.cells
            .iter()
            .filter(move |c| blocks.is_none_or(|b| b.contains(&c.subdomain)))
    }

    /// Cells owned by this rank.
    pub fn owned_cells<'a>(
        &'a self,
        blocks: Option<&'a BTreeSet<u32>>,
    ) -> impl Iterator<Item = &'a MeshCell> + 'a {
        let rank = self.rank;
        self.evaluable_cells(blocks).filter(move |c| c.owner == rank)
    }

    /// Cells visible here but owned by another rank.
    pub fn ghost_cells<'a>(
        &'a self,
        blocks: Option<&'a BTreeSet<u32>>,
    ) -> impl Iterator<Item = &'a MeshCell> + 'a {
        let rank = self.rank;
        self.evaluable_cells(blocks).filter(move |c| c.owner != rank)
    }

    pub fn cells(&self) -> &[MeshCell] {
        &self.cells
    }
}
