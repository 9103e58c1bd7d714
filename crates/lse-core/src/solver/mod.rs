//! Dense complex inversion backends for the weighted-least-squares gain matrix.

pub mod backend;
pub mod registry;

pub use backend::{DenseMatrix, FaerSolver, GaussSolver, LinearSystemBackend};
pub use registry::SolverKind;
