//! Overlap module: ghost manifests, fuse rules and the exchanges that bring
//! nodal values and `K` partial sums across partition boundaries.

pub mod delta;
pub mod exchange;
pub mod manifest;

pub use delta::{AddDelta, CopyDelta, Delta};
pub use manifest::GhostManifest;
