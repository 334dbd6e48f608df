//! Per-pair valence: how often each ordered node pair occurs across all cells.
//!
//! The external solver loops over its own cells only; dividing a pair's
//! contribution by the valence avoids counting it once per neighbouring cell.

use std::sync::Arc;

use crate::afc_error::AfcError;
use crate::topology::cell::MeshCell;
use crate::topology::connected_nodes::{ConnectedNodes, GlobalNodeId, SequentialId};

#[derive(Clone, Debug)]
pub struct PairValence {
    connections: Arc<ConnectedNodes>,
    counts: Vec<Vec<u32>>,
}

impl PairValence {
    pub fn new(connections: Arc<ConnectedNodes>) -> Self {
        let counts = connections
            .rows()
            .map(|(_, con)| vec![0; con.len()])
            .collect();
        Self {
            connections,
            counts,
        }
    }

    /// Count every ordered local pair `(i, j)` of `cell`, including `i == j`.
    pub fn count_cell(&mut self, cell: &MeshCell) -> Result<(), AfcError> {
        for &global_i in &cell.nodes {
            let seq_i = self.connections.sequential_id(global_i)?;
            for &global_j in &cell.nodes {
                let index = self.connections.index_of_global_connection(global_i, global_j)?;
                self.counts[seq_i][index] += 1;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, seq: SequentialId, index: usize) -> u32 {
        self.counts[seq][index]
    }

    #[inline]
    pub fn get_mut(&mut self, seq: SequentialId, index: usize) -> &mut u32 {
        &mut self.counts[seq][index]
    }

    /// Valence of the pair `(i, j)` by global ids.
    pub fn valence(&self, global_i: GlobalNodeId, global_j: GlobalNodeId) -> Result<u32, AfcError> {
        let seq_i = self.connections.sequential_id(global_i)?;
        let index = self.connections.index_of_global_connection(global_i, global_j)?;
        Ok(self.counts[seq_i][index])
    }

    /// Sum over all pairs.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .flat_map(|row| row.iter())
            .map(|&c| c as u64)
            .sum()
    }
}
