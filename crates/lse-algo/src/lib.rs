//! # lse-algo: Linear phasor state estimation
//!
//! Turns a [`lse_core::NetworkModel`] into the matrices of a linear
//! weighted-least-squares state estimate, once per measurement cycle.
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Switching topology | [`topology::resolver`] | [`TopologyPartition`] of nodes into observed buses |
//! | Observability | [`topology::observability`] | node flags and the cycle's [`IndexAssignment`] |
//! | Partition builders | [`sparse`] | A, II, Y, Ys, Ysh |
//! | Assembly | [`sparse::system`] | K, B, R and the gain M |
//! | Calibration | [`sparse::calibration`] | K reduced to calibration instruments |
//! | Estimate | [`estimator`] | `x = M·z`, per-node voltages, residuals |
//!
//! A partition with no rows or no columns is [`Absent`], never an error.
//! Only an inconsistent model or a singular gain system fails a cycle.
//!
//! ## Example
//!
//! ```
//! use lse_algo::{test_utils, StateEstimator};
//! use lse_core::{EstimatorConfig, PhaseMode};
//!
//! let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
//! let mut estimator = StateEstimator::new(EstimatorConfig::default());
//!
//! let output = estimator.run_cycle(&mut model).unwrap();
//! assert_eq!(output.assignment.columns().len(), 2);
//! assert!(output.matrices.gain.is_ok());
//! ```

pub mod estimator;
pub mod io;
pub mod sparse;
pub mod test_utils;
pub mod topology;

pub use estimator::{measurement_vector, CycleOutput, NodeEstimate, StateEstimator};
pub use io::{export_cycle, matrix_to_csv_string, write_matrix_csv, CsvLayout};
pub use sparse::{
    assemble, calibration_matrix, Absent, Built, CalibrationReduction, Partition, PhasorMatrix,
    RowSource, SystemMatrices, SystemRow,
};
pub use topology::{
    classify, resolve_full, IndexAssignment, ObservedBus, RebuildKind, TopologyPartition,
    TopologyResolver,
};
