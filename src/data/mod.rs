//! Numeric payload over the registry pattern: `K`, nodal values, valence.

pub mod nodal_values;
pub mod transport_matrix;
pub mod valence;

pub use nodal_values::NodalValues;
pub use transport_matrix::TransportMatrix;
pub use valence::PairValence;
