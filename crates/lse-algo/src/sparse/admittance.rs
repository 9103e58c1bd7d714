//! Branch admittance partitions of the series block.
//!
//! Y is (block-)diagonal with one entry per included current-flow row: the
//! series admittance of the metered branch as seen from the measuring
//! terminal. Ys carries the terminal shunt (half line charging, or the
//! transformer magnetizing susceptance) in the column of the bus the
//! current leaves, so that `K = Y·A + Ys` maps bus voltages to currents.

use lse_core::{NetworkModel, PhaseMode};

use super::matrix::{Built, MatrixBuilder, Partition};
use crate::topology::IndexAssignment;

/// Series admittance matrix Y.
pub fn series_admittance(model: &NetworkModel, assignment: &IndexAssignment) -> Built {
    let w = assignment.width();
    let n = assignment.flow_rows().len() * w;
    let mut builder = MatrixBuilder::new(Partition::SeriesAdmittance, n, n);

    for (k, row) in assignment.flow_rows().iter().enumerate() {
        let branch = &model.graph[row.edge];
        match assignment.mode() {
            PhaseMode::PositiveSequence => {
                if let Some(y) = branch.series_admittance(row.end) {
                    builder.add(k, k, y);
                }
            }
            PhaseMode::ThreePhase => {
                if let Some(block) = branch.phase_admittance(row.end) {
                    builder.add_block(k * w, k * w, &block);
                }
            }
        }
    }
    builder.finish()
}

/// Line shunt admittance matrix Ys.
pub fn line_shunt_admittance(model: &NetworkModel, assignment: &IndexAssignment) -> Built {
    let w = assignment.width();
    let mut builder = MatrixBuilder::new(
        Partition::LineShunt,
        assignment.flow_rows().len() * w,
        assignment.state_dimension(),
    );

    for (k, row) in assignment.flow_rows().iter().enumerate() {
        let shunt = model.graph[row.edge].terminal_shunt_admittance();
        if let Some(col) = row.leaving.filter(|_| shunt.norm() > 0.0) {
            builder.add_scaled_identity(k * w, col * w, w, shunt);
        }
    }
    builder.finish()
}
