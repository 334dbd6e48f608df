#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-afc
//!
//! mesh-afc implements algebraic flux correction (the Kuzmin-Turek FEM-TVD scheme)
//! for advective transport on unstructured, partitioned finite-element meshes. From
//! element-local transport contributions it assembles a directed transport matrix
//! `K`, adds the minimal artificial diffusion that makes the scheme local-extremum
//! diminishing, and admits back as much antidiffusion as a TVD flux limiter allows.
//! Every nodal outflow comes with its exact derivatives with respect to the nodal
//! unknowns and to the entries of `K`, ready for a Newton solver.
//!
//! ## Features
//! - Typestate node registry mapping sparse global ids to dense sequential ids
//! - Lock-free thread-parallel assembly (rayon) with per-worker accumulators
//! - Ghost exchange over a pluggable [`Communicator`](algs::communicator::Communicator):
//!   serial, in-process threads, or MPI (`mpi-support` feature)
//! - MinMod, VanLeer, MC, superbee and None limiters
//!
//! ## Determinism
//!
//! Results do not depend on the order in which workers process their cells. Changing
//! the number of workers or ranks changes floating-point summation order only.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mesh_afc::prelude::*;
//!
//! # fn main() -> Result<(), AfcError> {
//! let mesh = line_mesh(10, 1.0)?.serial();
//! let provider = ConstantVelocity::new([1.0, 0.0, 0.0], |n: u64| (n as f64).sin());
//! let mut calc = AdvectiveFluxCalculator::new(FluxCalculatorConfig::default())?;
//! calc.setup(&mesh, &NoComm)?;
//! calc.compute(&mesh, &provider, &NoComm)?;
//! let residual = calc.flux_out(3)?;
//! let jacobian_row = calc.dflux_out_du(3)?;
//! # let _ = (residual, jacobian_row);
//! # Ok(())
//! # }
//! ```

pub mod afc_error;
pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod discretization;
pub mod flux;
pub mod overlap;
pub mod physics;
pub mod topology;

pub use afc_error::AfcError;
pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::afc_error::AfcError;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, GhostCommTags, LocalComm, NoComm};
    pub use crate::algs::meshgen::{GlobalMesh, line_mesh, quad_mesh};
    pub use crate::config::{ExecuteOn, FluxCalculatorConfig};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::flux::{
        AdvectiveFluxCalculator, CalculatorTopology, FluxCorrection, FluxLimiterType, KuzminTurek,
        SparseRow,
    };
    pub use crate::physics::{ConstantVelocity, NodalField, TransportProvider};
    pub use crate::topology::{
        ConnectedNodes, GlobalNodeId, LocalMesh, MeshCell, NodeSetBuilder, SequentialId,
    };
}
