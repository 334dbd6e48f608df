//! Cache of the transported unknown at every registered node.

use crate::afc_error::AfcError;
use crate::topology::connected_nodes::SequentialId;

/// Nodal values plus a per-node flag recording whether this accumulator
/// evaluated the node itself.
#[derive(Clone, Debug, Default)]
pub struct NodalValues {
    values: Vec<f64>,
    computed: Vec<bool>,
}

impl NodalValues {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            values: vec![0.0; num_nodes],
            computed: vec![false; num_nodes],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forget all values, keeping the size.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.computed.fill(false);
    }

    #[inline]
    pub fn is_computed(&self, seq: SequentialId) -> bool {
        self.computed[seq]
    }

    /// Store `value` unless the node has already been evaluated.
    #[inline]
    pub fn record_once(&mut self, seq: SequentialId, value: impl FnOnce() -> f64) {
        if !self.computed[seq] {
            self.values[seq] = value();
            self.computed[seq] = true;
        }
    }

    /// Overwrite the value (ghost receive).
    #[inline]
    pub fn set(&mut self, seq: SequentialId, value: f64) {
        self.values[seq] = value;
        self.computed[seq] = true;
    }

    #[inline]
    pub fn get(&self, seq: SequentialId) -> f64 {
        self.values[seq]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Take values this accumulator has not computed from `other`.
    pub fn merge(&mut self, other: &NodalValues) -> Result<(), AfcError> {
        if other.len() != self.len() {
            return Err(AfcError::NodalValueCount {
                expected: self.len(),
                found: other.len(),
            });
        }
        for seq in 0..self.values.len() {
            if !self.computed[seq] && other.computed[seq] {
                self.values[seq] = other.values[seq];
                self.computed[seq] = true;
            }
        }
        Ok(())
    }
}
