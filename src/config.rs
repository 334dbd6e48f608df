//! Engine configuration.
//!
//! The configuration is plain data (serde) so that it can come from an input
//! file; [`FluxCalculatorConfig::validate`] rejects combinations that would
//! let the solver read stale fluxes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::afc_error::AfcError;
use crate::flux::limiter::FluxLimiterType;

/// Solve-loop phases at which the calculator may be recomputed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteOn {
    Initial,
    Linear,
    Nonlinear,
    TimestepBegin,
    TimestepEnd,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxCalculatorConfig {
    /// Used in diagnostics only.
    pub name: String,
    pub flux_limiter_type: FluxLimiterType,
    /// Warn when the registry lookup table wastes more than this many megabytes.
    pub allowable_mb_wastage: f64,
    pub execute_on: Vec<ExecuteOn>,
    /// Assembly worker count; 0 selects the rayon default.
    pub num_threads: usize,
    /// Restrict all cell loops to these subdomains.
    pub blocks: Option<BTreeSet<u32>>,
}

impl Default for FluxCalculatorConfig {
    fn default() -> Self {
        Self {
            name: "advective_flux".to_string(),
            flux_limiter_type: FluxLimiterType::VanLeer,
            allowable_mb_wastage: 5.0,
            execute_on: vec![ExecuteOn::Linear],
            num_threads: 0,
            blocks: None,
        }
    }
}

impl FluxCalculatorConfig {
    pub fn with_limiter(mut self, limiter: FluxLimiterType) -> Self {
        self.flux_limiter_type = limiter;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = u32>) -> Self {
        self.blocks = Some(blocks.into_iter().collect());
        self
    }

    pub fn validate(&self) -> Result<(), AfcError> {
        if !self.execute_on.contains(&ExecuteOn::Linear) {
            return Err(AfcError::ExecuteOnMissingLinear {
                name: self.name.clone(),
            });
        }
        if !(self.allowable_mb_wastage > 0.0) {
            return Err(AfcError::InvalidConfig(format!(
                "allowable_mb_wastage must be positive, got {}",
                self.allowable_mb_wastage
            )));
        }
        if matches!(&self.blocks, Some(b) if b.is_empty()) {
            return Err(AfcError::InvalidConfig(
                "blocks must name at least one subdomain".to_string(),
            ));
        }
        Ok(())
    }
}
