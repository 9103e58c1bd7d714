//! Shunt-device susceptance partition Ysh.
//!
//! One row (block) per included current-injection measurement. The current
//! into a shunt compensator of susceptance `b` at bus voltage `V` is `jb·V`;
//! a meter oriented out of the shunt sees the negated value.

use lse_core::{Branch, NetworkModel};
use num_complex::Complex64;

use super::matrix::{Built, MatrixBuilder, Partition};
use crate::topology::IndexAssignment;

pub fn shunt_susceptance(model: &NetworkModel, assignment: &IndexAssignment) -> Built {
    let w = assignment.width();
    let mut builder = MatrixBuilder::new(
        Partition::ShuntSusceptance,
        assignment.injection_rows().len() * w,
        assignment.state_dimension(),
    );

    for (k, row) in assignment.injection_rows().iter().enumerate() {
        if let Branch::Shunt(shunt) = &model.graph[row.edge] {
            let entry = Complex64::new(0.0, row.direction.sign() * shunt.susceptance);
            builder.add_scaled_identity(k * w, row.column * w, w, entry);
        }
    }
    builder.finish()
}
