//! Element-local quadrature support.

pub mod runtime;

pub use runtime::{Basis, ElementTabulation, QuadratureRule, tabulate_element};
