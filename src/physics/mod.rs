//! Velocity / unknown providers.
//!
//! The calculator is agnostic of the physical model: it only needs the
//! element-local pairing value at a quadrature point and the nodal value of the
//! transported unknown.

pub mod advection;

use std::collections::{BTreeMap, HashMap};

use crate::topology::cell::MeshCell;
use crate::topology::connected_nodes::GlobalNodeId;

pub use advection::ConstantVelocity;

/// Source of `K` contributions and nodal unknowns for one cell.
///
/// Implementations are shared read-only by all assembly workers.
pub trait TransportProvider: Sync {
    /// Pairing value of local nodes `local_i`, `local_j` at quadrature point `qp`,
    /// before weighting by `JxW`.
    fn contribution(&self, cell: &MeshCell, local_i: usize, local_j: usize, qp: usize) -> f64;

    /// Transported unknown at local node `local_node` of `cell`.
    fn nodal_value(&self, cell: &MeshCell, local_node: usize) -> f64;
}

/// Nodal values keyed by global node id.
pub trait NodalField: Sync {
    fn value(&self, node: GlobalNodeId) -> f64;
}

impl<F> NodalField for F
where
    F: Fn(GlobalNodeId) -> f64 + Sync,
{
    #[inline]
    fn value(&self, node: GlobalNodeId) -> f64 {
        self(node)
    }
}

/// Missing entries read as zero.
impl NodalField for BTreeMap<GlobalNodeId, f64> {
    fn value(&self, node: GlobalNodeId) -> f64 {
        self.get(&node).copied().unwrap_or(0.0)
    }
}

/// Missing entries read as zero.
impl NodalField for HashMap<GlobalNodeId, f64> {
    fn value(&self, node: GlobalNodeId) -> f64 {
        self.get(&node).copied().unwrap_or(0.0)
    }
}
