//! Raw directed transport matrix `K` over the connected-node pattern.
//!
//! Row `i` (sequential) stores one weight per entry of
//! `sequential_connections_to_sequential_id(i)`, in the same order. The pattern
//! is fixed by the registry; only values change between recomputations.

use std::sync::Arc;

use crate::afc_error::AfcError;
use crate::physics::TransportProvider;
use crate::topology::cell::MeshCell;
use crate::topology::connected_nodes::{ConnectedNodes, GlobalNodeId, SequentialId};

#[derive(Clone, Debug)]
pub struct TransportMatrix {
    connections: Arc<ConnectedNodes>,
    kij: Vec<Vec<f64>>,
}

impl TransportMatrix {
    /// Zero matrix over the pattern of `connections`.
    pub fn new(connections: Arc<ConnectedNodes>) -> Self {
        let kij = connections
            .rows()
            .map(|(_, con)| vec![0.0; con.len()])
            .collect();
        Self { connections, kij }
    }

    pub fn connections(&self) -> &Arc<ConnectedNodes> {
        &self.connections
    }

    /// Zero every entry, keeping the sparsity pattern.
    pub fn reset(&mut self) {
        for row in &mut self.kij {
            row.fill(0.0);
        }
    }

    /// Row of sequential node `seq`, aligned with its connection list.
    #[inline]
    pub fn row(&self, seq: SequentialId) -> &[f64] {
        &self.kij[seq]
    }

    /// Entry by sequential node and connection index.
    #[inline]
    pub fn get(&self, seq: SequentialId, index: usize) -> f64 {
        self.kij[seq][index]
    }

    /// Mutable entry by sequential node and connection index.
    #[inline]
    pub fn get_mut(&mut self, seq: SequentialId, index: usize) -> &mut f64 {
        &mut self.kij[seq][index]
    }

    /// `K[i][j]` by global ids.
    pub fn kij(&self, global_i: GlobalNodeId, global_j: GlobalNodeId) -> Result<f64, AfcError> {
        let seq_i = self.connections.sequential_id(global_i)?;
        let index = self.connections.index_of_global_connection(global_i, global_j)?;
        Ok(self.kij[seq_i][index])
    }

    /// `K[i][j] += value` by global ids.
    pub fn add(
        &mut self,
        global_i: GlobalNodeId,
        global_j: GlobalNodeId,
        value: f64,
    ) -> Result<(), AfcError> {
        let seq_i = self.connections.sequential_id(global_i)?;
        let index = self.connections.index_of_global_connection(global_i, global_j)?;
        self.kij[seq_i][index] += value;
        Ok(())
    }

    /// Add the contributions of every local node pair of `cell`, summed over its
    /// quadrature points.
    pub fn accumulate_cell<P>(&mut self, cell: &MeshCell, provider: &P) -> Result<(), AfcError>
    where
        P: TransportProvider + ?Sized,
    {
        let tab = &cell.tabulation;
        for (local_i, &global_i) in cell.nodes.iter().enumerate() {
            let seq_i = self.connections.sequential_id(global_i)?;
            for (local_j, &global_j) in cell.nodes.iter().enumerate() {
                let index = self.connections.index_of_global_connection(global_i, global_j)?;
                let mut sum = 0.0;
                for qp in 0..tab.n_qp() {
                    sum += tab.jxw[qp] * provider.contribution(cell, local_i, local_j, qp);
                }
                self.kij[seq_i][index] += sum;
            }
        }
        Ok(())
    }

    /// Elementwise `self += other`. Both matrices must share one registry.
    pub fn merge(&mut self, other: &TransportMatrix) -> Result<(), AfcError> {
        if !Arc::ptr_eq(&self.connections, &other.connections) {
            return Err(AfcError::RegistryMismatch);
        }
        for (mine, theirs) in self.kij.iter_mut().zip(&other.kij) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += *b;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::connected_nodes::NodeSetBuilder;

    fn pair_registry() -> Arc<ConnectedNodes> {
        let mut nodes = NodeSetBuilder::new();
        nodes.add_global_node(3);
        nodes.add_global_node(9);
        let mut cons = nodes.finalize_nodes().unwrap();
        for a in [3, 9] {
            for b in [3, 9] {
                cons.add_connection(a, b).unwrap();
            }
        }
        Arc::new(cons.finalize_connections())
    }

    #[test]
    fn merge_is_elementwise_sum() {
        let reg = pair_registry();
        let mut a = TransportMatrix::new(reg.clone());
        let mut b = TransportMatrix::new(reg);
        a.add(3, 9, 1.5).unwrap();
        b.add(3, 9, 2.0).unwrap();
        b.add(9, 9, -1.0).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.kij(3, 9).unwrap(), 3.5);
        assert_eq!(a.kij(9, 9).unwrap(), -1.0);
        assert_eq!(a.kij(9, 3).unwrap(), 0.0);
    }

    #[test]
    fn merge_rejects_foreign_registry() {
        let mut a = TransportMatrix::new(pair_registry());
        let b = TransportMatrix::new(pair_registry());
        assert_eq!(a.merge(&b), Err(AfcError::RegistryMismatch));
    }

    #[test]
    fn reset_keeps_pattern() {
        let mut a = TransportMatrix::new(pair_registry());
        a.add(9, 3, 4.0).unwrap();
        a.reset();
        assert_eq!(a.row(1), &[0.0, 0.0]);
        assert!(a.kij(9, 4).is_err());
    }
}
