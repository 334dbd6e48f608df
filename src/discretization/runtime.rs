//! Reference basis/quadrature evaluation and physical-element tabulation.
//!
//! This is the quadrature side of the mesh collaborator: it turns element
//! node coordinates into per-quadrature-point shape values, physical
//! gradients, and `JxW` weights stored on each [`MeshCell`](crate::topology::cell::MeshCell).

use serde::{Deserialize, Serialize};

use crate::afc_error::AfcError;

/// Supported basis implementations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Basis {
    /// Linear Lagrange basis on a segment.
    LagrangeP1Segment,
    /// Bilinear Lagrange basis on a quadrilateral.
    LagrangeQ1Quadrilateral,
}

impl Basis {
    /// Reference dimension of the basis.
    pub fn dimension(&self) -> usize {
        match self {
            Basis::LagrangeP1Segment => 1,
            Basis::LagrangeQ1Quadrilateral => 2,
        }
    }

    /// Number of basis functions per element.
    pub fn num_nodes(&self) -> usize {
        match self {
            Basis::LagrangeP1Segment => 2,
            Basis::LagrangeQ1Quadrilateral => 4,
        }
    }

    /// Tensor-product Gauss rule with `order` points per direction.
    pub fn gauss_rule(&self, order: usize) -> Result<QuadratureRule, AfcError> {
        let line = gauss_legendre_1d(order)?;
        Ok(match self {
            Basis::LagrangeP1Segment => line,
            Basis::LagrangeQ1Quadrilateral => tensor_product_quadrature(&line, &line),
        })
    }

    /// Evaluate basis values and reference gradients at reference points.
    pub fn tabulate(&self, points: &[Vec<f64>]) -> Result<BasisTabulation, AfcError> {
        match self {
            Basis::LagrangeP1Segment => tabulate_p1_segment(points),
            Basis::LagrangeQ1Quadrilateral => tabulate_q1_quad(points),
        }
    }
}

/// Basis function tabulation on the reference element.
#[derive(Clone, Debug)]
pub struct BasisTabulation {
    /// Basis values per quadrature point: `[qp][basis]`.
    pub values: Vec<Vec<f64>>,
    /// Reference gradients per quadrature point: `[qp][basis][dim]`.
    pub gradients: Vec<Vec<Vec<f64>>>,
}

/// Quadrature rule on the reference element.
#[derive(Clone, Debug)]
pub struct QuadratureRule {
    /// Quadrature points in reference coordinates.
    pub points: Vec<Vec<f64>>,
    /// Quadrature weights.
    pub weights: Vec<f64>,
}

/// Tabulation data on a physical element.
#[derive(Clone, Debug, Default)]
pub struct ElementTabulation {
    /// Basis values per quadrature point: `[qp][node]`.
    pub phi: Vec<Vec<f64>>,
    /// Physical basis gradients per quadrature point: `[qp][node][dim]`.
    pub grad_phi: Vec<Vec<Vec<f64>>>,
    /// Quadrature weight times |det J| per quadrature point.
    pub jxw: Vec<f64>,
}

impl ElementTabulation {
    #[inline]
    pub fn n_qp(&self) -> usize {
        self.jxw.len()
    }
}

/// Build element tabulation including geometric terms.
pub fn tabulate_element(
    basis: Basis,
    quadrature: &QuadratureRule,
    node_coords: &[Vec<f64>],
) -> Result<ElementTabulation, AfcError> {
    let num_nodes = basis.num_nodes();
    if node_coords.len() != num_nodes {
        return Err(AfcError::InvalidGeometry(format!(
            "expected {num_nodes} node coordinates, found {}",
            node_coords.len()
        )));
    }
    let dim = basis.dimension();
    if let Some(bad) = node_coords.iter().find(|c| c.len() != dim) {
        return Err(AfcError::InvalidGeometry(format!(
            "basis dimension {dim} does not match coordinate dimension {}",
            bad.len()
        )));
    }

    let basis_tab = basis.tabulate(&quadrature.points)?;
    let n_qp = quadrature.points.len();
    let mut grad_phi = Vec::with_capacity(n_qp);
    let mut jxw = Vec::with_capacity(n_qp);

    for (qp, ref_grads) in basis_tab.gradients.iter().enumerate() {
        let jac = build_jacobian(dim, node_coords, ref_grads);
        let (det, inv) = invert_jacobian(dim, &jac)?;
        jxw.push(det.abs() * quadrature.weights[qp]);

        let mut grad_qp = Vec::with_capacity(num_nodes);
        for ref_grad in ref_grads {
            let mut phys_grad = vec![0.0; dim];
            for (phys_dim, g) in phys_grad.iter_mut().enumerate() {
                for ref_dim in 0..dim {
                    *g += inv[ref_dim * dim + phys_dim] * ref_grad[ref_dim];
                }
            }
            grad_qp.push(phys_grad);
        }
        grad_phi.push(grad_qp);
    }

    Ok(ElementTabulation {
        phi: basis_tab.values,
        grad_phi,
        jxw,
    })
}

fn tabulate_p1_segment(points: &[Vec<f64>]) -> Result<BasisTabulation, AfcError> {
    let mut values = Vec::with_capacity(points.len());
    let mut gradients = Vec::with_capacity(points.len());
    for point in points {
        let &[xi] = point.as_slice() else {
            return Err(AfcError::InvalidGeometry(
                "segment quadrature must be 1D".to_string(),
            ));
        };
        values.push(vec![0.5 * (1.0 - xi), 0.5 * (1.0 + xi)]);
        gradients.push(vec![vec![-0.5], vec![0.5]]);
    }
    Ok(BasisTabulation { values, gradients })
}

fn tabulate_q1_quad(points: &[Vec<f64>]) -> Result<BasisTabulation, AfcError> {
    let mut values = Vec::with_capacity(points.len());
    let mut gradients = Vec::with_capacity(points.len());
    for point in points {
        let &[xi, eta] = point.as_slice() else {
            return Err(AfcError::InvalidGeometry(
                "quadrilateral quadrature must be 2D".to_string(),
            ));
        };
        values.push(vec![
            0.25 * (1.0 - xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 - eta),
            0.25 * (1.0 + xi) * (1.0 + eta),
            0.25 * (1.0 - xi) * (1.0 + eta),
        ]);
        gradients.push(vec![
            vec![-0.25 * (1.0 - eta), -0.25 * (1.0 - xi)],
            vec![0.25 * (1.0 - eta), -0.25 * (1.0 + xi)],
            vec![0.25 * (1.0 + eta), 0.25 * (1.0 + xi)],
            vec![-0.25 * (1.0 + eta), 0.25 * (1.0 - xi)],
        ]);
    }
    Ok(BasisTabulation { values, gradients })
}

fn gauss_legendre_1d(order: usize) -> Result<QuadratureRule, AfcError> {
    match order {
        1 => Ok(QuadratureRule {
            points: vec![vec![0.0]],
            weights: vec![2.0],
        }),
        2 => {
            let pt = 1.0_f64 / 3.0_f64.sqrt();
            Ok(QuadratureRule {
                points: vec![vec![-pt], vec![pt]],
                weights: vec![1.0, 1.0],
            })
        }
        _ => Err(AfcError::InvalidGeometry(format!(
            "unsupported Gauss order {order}"
        ))),
    }
}

fn tensor_product_quadrature(a: &QuadratureRule, b: &QuadratureRule) -> QuadratureRule {
    let mut points = Vec::with_capacity(a.points.len() * b.points.len());
    let mut weights = Vec::with_capacity(a.points.len() * b.points.len());
    for (pa, wa) in a.points.iter().zip(a.weights.iter()) {
        for (pb, wb) in b.points.iter().zip(b.weights.iter()) {
            let mut pt = Vec::with_capacity(pa.len() + pb.len());
            pt.extend_from_slice(pa);
            pt.extend_from_slice(pb);
            points.push(pt);
            weights.push(wa * wb);
        }
    }
    QuadratureRule { points, weights }
}

fn build_jacobian(dim: usize, node_coords: &[Vec<f64>], ref_grads: &[Vec<f64>]) -> Vec<f64> {
    let mut jac = vec![0.0; dim * dim];
    for (node, grad) in node_coords.iter().zip(ref_grads.iter()) {
        for phys_dim in 0..dim {
            for ref_dim in 0..dim {
                jac[phys_dim * dim + ref_dim] += node[phys_dim] * grad[ref_dim];
            }
        }
    }
    jac
}

fn invert_jacobian(dim: usize, jac: &[f64]) -> Result<(f64, Vec<f64>), AfcError> {
    let singular = || AfcError::InvalidGeometry("zero Jacobian determinant".to_string());
    match dim {
        1 => {
            let det = jac[0];
            if det.abs() < f64::EPSILON {
                return Err(singular());
            }
            Ok((det, vec![1.0 / det]))
        }
        2 => {
            let (a, b, c, d) = (jac[0], jac[1], jac[2], jac[3]);
            let det = a * d - b * c;
            if det.abs() < f64::EPSILON {
                return Err(singular());
            }
            Ok((det, vec![d / det, -b / det, -c / det, a / det]))
        }
        _ => Err(AfcError::InvalidGeometry(format!(
            "unsupported dimension {dim}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_weights_sum_to_length() {
        let basis = Basis::LagrangeP1Segment;
        let rule = basis.gauss_rule(2).unwrap();
        let tab = tabulate_element(basis, &rule, &[vec![1.0], vec![3.5]]).unwrap();
        let total: f64 = tab.jxw.iter().sum();
        assert!((total - 2.5).abs() < 1e-14);
        assert!((tab.grad_phi[0][0][0] + 0.4).abs() < 1e-14);
        assert!((tab.grad_phi[1][1][0] - 0.4).abs() < 1e-14);
    }

    #[test]
    fn quad_partition_of_unity() {
        let basis = Basis::LagrangeQ1Quadrilateral;
        let rule = basis.gauss_rule(2).unwrap();
        let coords = [vec![0.0, 0.0], vec![2.0, 0.0], vec![2.0, 1.0], vec![0.0, 1.0]];
        let tab = tabulate_element(basis, &rule, &coords).unwrap();
        assert!((tab.jxw.iter().sum::<f64>() - 2.0).abs() < 1e-14);
        for qp in 0..tab.n_qp() {
            assert!((tab.phi[qp].iter().sum::<f64>() - 1.0).abs() < 1e-14);
            for d in 0..2 {
                let g: f64 = tab.grad_phi[qp].iter().map(|g| g[d]).sum();
                assert!(g.abs() < 1e-14);
            }
        }
    }

    #[test]
    fn degenerate_element_is_rejected() {
        let basis = Basis::LagrangeP1Segment;
        let rule = basis.gauss_rule(1).unwrap();
        let err = tabulate_element(basis, &rule, &[vec![1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, AfcError::InvalidGeometry(_)));
    }
}
