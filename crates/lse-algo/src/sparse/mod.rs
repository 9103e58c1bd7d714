//! # Sparse measurement matrices
//!
//! Every matrix of an estimation cycle is a sparse complex CSR matrix built
//! from triplets against one [`IndexAssignment`](crate::topology::IndexAssignment).
//! In three-phase mode each measurement and each bus spans three rows or
//! columns; positive-sequence entries become 3×3 blocks.
//!
//! ## Module Organization
//!
//! - [`matrix`]: [`PhasorMatrix`], the [`Absent`] marker, triplet builder
//! - [`incidence`]: current-flow (A) and voltage (II) incidence
//! - [`admittance`]: series admittance (Y) and line shunt (Ys)
//! - [`shunt`]: shunt-device susceptance (Ysh)
//! - [`system`]: K, B, R and the gain matrix M
//! - [`calibration`]: K reduced to calibration instruments
//!
//! | Symbol | Rows | Columns |
//! |--------|------|---------|
//! | A, Ys, K | included current flows | observed buses |
//! | II | directly observed nodes | observed buses |
//! | Y | included current flows | included current flows |
//! | Ysh | included current injections | observed buses |
//! | B | II ∪ K ∪ Ysh rows | observed buses |
//! | M | observed buses | rows of B |

pub mod admittance;
pub mod calibration;
pub mod incidence;
pub mod matrix;
pub mod shunt;
pub mod system;

pub use admittance::{line_shunt_admittance, series_admittance};
pub use calibration::{calibration_matrix, CalibrationReduction};
pub use incidence::{current_flow_incidence, voltage_incidence};
pub use matrix::{Absent, Built, MatrixBuilder, Partition, PhasorMatrix};
pub use shunt::shunt_susceptance;
pub use system::{
    assemble, gain_matrix, series_partition, stack, RowSource, SystemMatrices, SystemRow,
};
