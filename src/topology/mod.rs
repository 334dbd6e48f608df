//! Node registry and cell views.

pub mod cell;
pub mod connected_nodes;

pub use cell::{LocalMesh, MeshCell};
pub use connected_nodes::{
    ConnectedNodes, ConnectionBuilder, GlobalNodeId, NodeNumbering, NodeSetBuilder, SequentialId,
};
