use crate::afc_error::AfcError;
use crate::flux::kuzmin_turek::FluxCorrection;
use crate::topology::connected_nodes::ConnectedNodes;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), AfcError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

fn violated(message: String) -> AfcError {
    AfcError::InvariantViolated(message)
}

impl DebugInvariants for ConnectedNodes {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ConnectedNodes");
    }

    /// Id bijection and strictly sorted adjacency.
    fn validate_invariants(&self) -> Result<(), AfcError> {
        for (seq, &global) in self.numbering().global_ids().iter().enumerate() {
            if self.sequential_id(global)? != seq {
                return Err(violated(format!(
                    "global {global} does not map back to sequential {seq}"
                )));
            }
        }
        for (seq, con) in self.rows() {
            if con.windows(2).any(|w| w[0] >= w[1]) {
                return Err(violated(format!("row {seq} is not strictly sorted")));
            }
            if let Some(&bad) = con.iter().find(|&&s| s >= self.num_nodes()) {
                return Err(violated(format!("row {seq} references node {bad}")));
            }
        }
        Ok(())
    }
}

impl DebugInvariants for FluxCorrection {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "FluxCorrection");
    }

    /// Zero row sums of `D`, non-negative off-diagonal `L`, antisymmetric `f`.
    fn validate_invariants(&self) -> Result<(), AfcError> {
        let con = self.connections();
        for (i, con_i) in con.rows() {
            let row = &self.dij_rows()[i];
            let scale: f64 = row.iter().map(|d| d.abs()).sum::<f64>().max(1.0);
            let sum: f64 = row.iter().sum();
            if sum.abs() > 1e-12 * scale {
                return Err(violated(format!("D row {i} sums to {sum}")));
            }
            for (jdx, &j) in con_i.iter().enumerate() {
                if j == i {
                    continue;
                }
                let l = self.lij_rows()[i][jdx];
                if l < 0.0 {
                    return Err(violated(format!("L[{i}][{j}] = {l} is negative")));
                }
                let ji = con.index_of_sequential_connection(j, i)?;
                let (f_ij, f_ji) = (self.fa_rows()[i][jdx], self.fa_rows()[j][ji]);
                if f_ij != -f_ji {
                    return Err(violated(format!(
                        "f[{i}][{j}] = {f_ij} but f[{j}][{i}] = {f_ji}"
                    )));
                }
            }
        }
        Ok(())
    }
}
