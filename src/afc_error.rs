//! AfcError: Unified error type for mesh-afc public APIs
//!
//! Every variant describes a deterministic setup or usage fault. None of them is
//! transient: callers are expected to propagate the error and terminate the run,
//! because a partially assembled transport matrix cannot yield a monotone scheme.

use thiserror::Error;

/// Unified error type for flux-correction operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AfcError {
    /// A global node id was queried that was never registered.
    #[error("Registry error: global node {0} is not registered")]
    UnknownGlobalNode(u64),
    /// A sequential id outside `[0, num_nodes)` was queried.
    #[error("Registry error: sequential id {0} is out of range")]
    UnknownSequentialNode(usize),
    /// `to` is not a neighbour of `from`.
    #[error("Registry error: node {to} is not connected from node {from}")]
    NotConnected { from: u64, to: u64 },
    /// Every node must be connected to itself for the diagonal of D and L.
    #[error("Registry error: node {0} has no self-connection")]
    MissingSelfConnection(u64),
    /// The global id span does not fit in an addressable lookup table.
    #[error(
        "Registry error: global ids {min}..={max} span too many slots for the lookup table; \
         renumber the mesh nodes"
    )]
    RegistrySpanTooLarge { min: u64, max: u64 },
    /// Two accumulators built over different registries were merged.
    #[error("Merge error: accumulators were built over different node registries")]
    RegistryMismatch,
    /// Nodal value vector length does not match the registry.
    #[error("Size mismatch: expected {expected} nodal values, found {found}")]
    NodalValueCount { expected: usize, found: usize },
    /// The execution schedule does not include the linear phase.
    #[error(
        "Configuration error in '{name}': execute_on must include, at least, 'linear' so that \
         fluxes are recomputed just before residuals are evaluated"
    )]
    ExecuteOnMissingLinear { name: String },
    /// Any other invalid configuration value.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
    /// `compute` was called before `setup`, or after `mesh_changed` without a new `setup`.
    #[error("Usage error: topology has not been built (call setup first)")]
    TopologyNotBuilt,
    /// Results were queried before a recompute finished.
    #[error("Usage error: fluxes have not been computed")]
    NotComputed,
    /// An expected ghost message never arrived.
    #[error("Ghost exchange error: no message from rank {peer} (tag {tag:#x})")]
    MissingGhostMessage { peer: usize, tag: u16 },
    /// A ghost message had the wrong length for the manifest.
    #[error("Ghost exchange error: rank {peer} sent {actual} bytes, manifest expects {expected}")]
    GhostMessageSize {
        peer: usize,
        expected: usize,
        actual: usize,
    },
    /// A rank referenced a remote that the manifest does not know about.
    #[error("Ghost exchange error: unexpected peer {0}")]
    UnexpectedPeer(usize),
    /// Failure in the underlying communicator.
    #[error("Communicator error: {0}")]
    Communicator(String),
    /// Worker pool construction failed.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
    /// Degenerate or inconsistent element geometry.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Invariant violation found by [`DebugInvariants`](crate::DebugInvariants).
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}
