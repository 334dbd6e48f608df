//! Re-export public algorithms.

pub mod assembly;
pub mod communicator;
pub mod meshgen;
pub mod wire;

pub use assembly::{Assembler, ThreadAccumulator, build_pool};
pub use communicator::{CommTag, Communicator, GhostCommTags, LocalComm, NoComm};
pub use meshgen::{GlobalMesh, line_mesh, quad_mesh};
