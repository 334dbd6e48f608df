//! Advection by a spatially constant velocity.

use crate::physics::{NodalField, TransportProvider};
use crate::topology::cell::MeshCell;

/// `K_ij` contribution `(∇φ_i · v) φ_j` for a constant velocity `v`.
///
/// In 1D this gives `K[i][i+1] = -v/2`, so for `v > 0` the left node of every
/// edge is upwind.
///
/// The velocity has three components; cells of lower dimension use the
/// leading ones.
#[derive(Clone, Debug)]
pub struct ConstantVelocity<F> {
    velocity: [f64; 3],
    field: F,
}

impl<F: NodalField> ConstantVelocity<F> {
    pub fn new(velocity: [f64; 3], field: F) -> Self {
        Self { velocity, field }
    }

    pub fn velocity(&self) -> [f64; 3] {
        self.velocity
    }

    pub fn field(&self) -> &F {
        &self.field
    }
}

impl<F: NodalField> TransportProvider for ConstantVelocity<F> {
    fn contribution(&self, cell: &MeshCell, local_i: usize, local_j: usize, qp: usize) -> f64 {
        let tab = &cell.tabulation;
        let grad_dot_v: f64 = tab.grad_phi[qp][local_i]
            .iter()
            .zip(self.velocity.iter())
            .map(|(g, v)| g * v)
            .sum();
        grad_dot_v * tab.phi[qp][local_j]
    }

    fn nodal_value(&self, cell: &MeshCell, local_node: usize) -> f64 {
        self.field.value(cell.nodes[local_node])
    }
}
