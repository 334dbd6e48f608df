//! Flux limiting and the flux-correction engine.

pub mod calculator;
pub mod kuzmin_turek;
pub mod limiter;
pub mod sparse;

pub use calculator::{AdvectiveFluxCalculator, CalculatorTopology};
pub use kuzmin_turek::{FluxCorrection, KuzminTurek};
pub use limiter::FluxLimiterType;
pub use sparse::SparseRow;
