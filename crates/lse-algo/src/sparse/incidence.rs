//! Measurement-to-bus incidence matrices.
//!
//! ```text
//! A  (current flow):  row k, column leaving(k)  = +1      column entering(k) = -1
//! II (voltage):       row k, column bus(node k) = 1
//! ```
//!
//! A current measured at the from end of a transformer sees the off-nominal
//! ratio `t`: the leaving entry becomes `1/|t|²` and the entering entry
//! `-1/t*`. Measured at the to end the pair is `+1` and `-1/t`. In
//! three-phase mode every entry is a 3×3 scaled identity block. A
//! transformer with its own phase admittance block gets plain `±I₃`, since
//! that block already carries the ratio. Without one, the admittance falls
//! back to a balanced scalar and the ratio stays in the incidence blocks.

use lse_core::{Branch, NetworkModel, PhaseMode, TerminalEnd};
use num_complex::Complex64;

use super::matrix::{Built, MatrixBuilder, Partition};
use crate::topology::IndexAssignment;

/// (leaving, entering) coefficients for one current-flow row.
fn flow_coefficients(
    branch: &Branch,
    end: TerminalEnd,
    mode: PhaseMode,
) -> (Complex64, Complex64) {
    let one = Complex64::new(1.0, 0.0);
    match branch {
        Branch::Transformer(tx)
            if mode == PhaseMode::PositiveSequence || tx.phase_admittance.is_none() =>
        {
            let t = tx.turns_ratio;
            match end {
                TerminalEnd::From => (one / t.norm_sqr(), -one / t.conj()),
                TerminalEnd::To => (one, -one / t),
            }
        }
        _ => (one, -one),
    }
}

/// Current-flow incidence matrix A.
pub fn current_flow_incidence(model: &NetworkModel, assignment: &IndexAssignment) -> Built {
    let w = assignment.width();
    let rows = assignment.flow_rows();
    let mut builder = MatrixBuilder::new(
        Partition::CurrentFlowIncidence,
        rows.len() * w,
        assignment.state_dimension(),
    );

    for (k, row) in rows.iter().enumerate() {
        let (leaving, entering) =
            flow_coefficients(&model.graph[row.edge], row.end, assignment.mode());
        if let Some(col) = row.leaving {
            builder.add_scaled_identity(k * w, col * w, w, leaving);
        }
        if let Some(col) = row.entering {
            builder.add_scaled_identity(k * w, col * w, w, entering);
        }
    }
    builder.finish()
}

/// Voltage incidence matrix II.
pub fn voltage_incidence(assignment: &IndexAssignment) -> Built {
    let w = assignment.width();
    let rows = assignment.voltage_rows();
    let mut builder = MatrixBuilder::new(
        Partition::VoltageIncidence,
        rows.len() * w,
        assignment.state_dimension(),
    );
    for (k, row) in rows.iter().enumerate() {
        builder.add_scaled_identity(k * w, row.column * w, w, Complex64::new(1.0, 0.0));
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lse_core::{BranchId, PhaseMatrix, Radians, Transformer};

    #[test]
    fn line_coefficients_are_unit() {
        let line = Branch::Line(lse_core::TransmissionLine::new(BranchId::new(1), "L", 0.0, 0.1));
        let (l, e) = flow_coefficients(&line, TerminalEnd::To, PhaseMode::PositiveSequence);
        assert_eq!((l.re, e.re), (1.0, -1.0));
    }

    #[test]
    fn transformer_ratio_scales_positive_sequence_entries() {
        let tx = Branch::Transformer(
            Transformer::new(BranchId::new(2), "T", 0.0, 0.1).with_turns_ratio(1.05, Radians(0.1)),
        );
        let t = Complex64::from_polar(1.05, 0.1);
        let (l, e) = flow_coefficients(&tx, TerminalEnd::From, PhaseMode::PositiveSequence);
        assert!((l.re - 1.0 / (1.05 * 1.05)).abs() < 1e-12);
        assert!((e + Complex64::new(1.0, 0.0) / t.conj()).norm() < 1e-12);

        let (l, e) = flow_coefficients(&tx, TerminalEnd::To, PhaseMode::PositiveSequence);
        assert_eq!(l, Complex64::new(1.0, 0.0));
        assert!((e + Complex64::new(1.0, 0.0) / t).norm() < 1e-12);

        // no phase block: the balanced fallback keeps the ratio here
        let (l, e) = flow_coefficients(&tx, TerminalEnd::From, PhaseMode::ThreePhase);
        assert!((l.re - 1.0 / (1.05 * 1.05)).abs() < 1e-12);
        assert!((e + Complex64::new(1.0, 0.0) / t.conj()).norm() < 1e-12);
    }

    #[test]
    fn explicit_phase_block_gives_plain_identity_entries() {
        let block = PhaseMatrix::scalar(Complex64::new(0.0, -12.0));
        let tx = Branch::Transformer(
            Transformer::new(BranchId::new(2), "T", 0.0, 0.1)
                .with_turns_ratio(1.05, Radians(0.1))
                .with_phase_admittance(block),
        );
        let (l, e) = flow_coefficients(&tx, TerminalEnd::From, PhaseMode::ThreePhase);
        assert_eq!((l, e), (Complex64::new(1.0, 0.0), Complex64::new(-1.0, 0.0)));

        let (l, _) = flow_coefficients(&tx, TerminalEnd::From, PhaseMode::PositiveSequence);
        assert!((l.re - 1.0 / (1.05 * 1.05)).abs() < 1e-12);
    }
}
