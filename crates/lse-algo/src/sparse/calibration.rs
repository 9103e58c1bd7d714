//! Calibration matrix reducer.
//!
//! K_cal is the series partition K restricted to the instruments that take
//! part in the calibration sweep:
//! - a current-flow row survives only if all three phases are `Active`
//! - a bus column survives only if some member node has a voltage group
//!   whose three phases are all `Active` or `Perfect`

use lse_core::{CalibrationSetting, NetworkModel};

use super::matrix::{Absent, Built, Partition};
use crate::topology::IndexAssignment;

/// Reduced matrix plus the rows and columns of K it dropped.
#[derive(Debug, Clone)]
pub struct CalibrationReduction {
    pub matrix: Built,
    /// Dropped rows of K, descending
    pub dropped_rows: Vec<usize>,
    /// Dropped columns of K, descending
    pub dropped_columns: Vec<usize>,
}

impl CalibrationReduction {
    /// Surviving indices out of `len`, ascending.
    pub fn kept(len: usize, dropped: &[usize]) -> Vec<usize> {
        (0..len).filter(|i| !dropped.contains(i)).collect()
    }
}

fn block_indices(entities: impl Iterator<Item = usize>, width: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = entities
        .flat_map(|e| (e * width)..(e * width + width))
        .collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices
}

/// Reduce the series partition to the calibration measurement set.
pub fn calibration_matrix(
    model: &NetworkModel,
    assignment: &IndexAssignment,
    series: &Built,
) -> CalibrationReduction {
    let w = assignment.width();

    let dropped_rows = block_indices(
        assignment
            .flow_rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                !model.current_flows[row.flow]
                    .group
                    .all_phases(|s| s == CalibrationSetting::Active)
            })
            .map(|(k, _)| k),
        w,
    );

    let dropped_columns = block_indices(
        assignment
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| {
                !column.nodes.iter().any(|&n| {
                    model.graph[n]
                        .voltage
                        .as_ref()
                        .is_some_and(|g| g.all_phases(CalibrationSetting::is_reference))
                })
            })
            .map(|(c, _)| c),
        w,
    );

    let matrix = match series {
        Ok(k) => k.pruned(&dropped_rows, &dropped_columns, Partition::Calibration),
        Err(_) => Err(Absent(Partition::Calibration)),
    };

    CalibrationReduction {
        matrix,
        dropped_rows,
        dropped_columns,
    }
}
