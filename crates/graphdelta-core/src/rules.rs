//! Structural invariants of a tracked graph

pub mod invariants;
pub mod validation;

pub use validation::validate_graph;
