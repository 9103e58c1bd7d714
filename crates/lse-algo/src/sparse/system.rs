//! System matrix assembly and the weighted-least-squares gain.
//!
//! ```text
//! K = Y·A + Ys
//!
//!     ┌ II  ┐
//! B = │ K   │      (absent partitions are skipped)
//!     └ Ysh ┘
//!
//! M = (Bᴴ R⁻¹ B)⁻¹ Bᴴ R⁻¹
//! ```
//!
//! R is diagonal and built in lock-step with the rows of B, so row `i` of B,
//! entry `i` of R and entry `i` of the measurement vector always refer to
//! the same channel. The normal matrix is inverted by a
//! [`LinearSystemBackend`]; a singular system aborts the cycle.

use lse_core::{
    EstimatorConfig, LinearSystemBackend, LseResult, NetworkModel, PhaseMode, PhasorGroup,
};
use num_complex::Complex64;
use tracing::{debug, warn};

use super::admittance::{line_shunt_admittance, series_admittance};
use super::incidence::{current_flow_incidence, voltage_incidence};
use super::matrix::{Absent, Built, MatrixBuilder, Partition, PhasorMatrix};
use super::shunt::shunt_susceptance;
use crate::topology::IndexAssignment;

/// Measurement that produced a row of B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// Index into [`IndexAssignment::voltage_rows`]
    Voltage(usize),
    /// Index into [`IndexAssignment::flow_rows`]
    CurrentFlow(usize),
    /// Index into [`IndexAssignment::injection_rows`]
    CurrentInjection(usize),
}

/// One row of the system matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemRow {
    pub source: RowSource,
    /// Phase within a three-phase block (0..3); `None` in positive-sequence mode
    pub phase: Option<usize>,
    pub label: String,
    /// Variance after applying the configured floor
    pub variance: f64,
}

/// Every matrix of one estimation cycle.
#[derive(Debug, Clone)]
pub struct SystemMatrices {
    pub current_flow_incidence: Built,
    pub voltage_incidence: Built,
    pub series_admittance: Built,
    pub line_shunt: Built,
    pub shunt_susceptance: Built,
    pub series: Built,
    pub system: Built,
    pub covariance: Built,
    pub gain: Built,
    pub rows: Vec<SystemRow>,
}

impl SystemMatrices {
    /// Present matrices in export order.
    pub fn present(&self) -> Vec<&PhasorMatrix> {
        [
            &self.current_flow_incidence,
            &self.voltage_incidence,
            &self.series_admittance,
            &self.line_shunt,
            &self.shunt_susceptance,
            &self.series,
            &self.system,
            &self.covariance,
            &self.gain,
        ]
        .into_iter()
        .filter_map(|built| built.as_ref().ok())
        .collect()
    }

    pub fn row_labels(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.label.clone()).collect()
    }
}

/// Series partition `K = Y·A + Ys`; absent unless all three inputs are present.
pub fn series_partition(y: &Built, a: &Built, ys: &Built) -> Built {
    match (y, a, ys) {
        (Ok(y), Ok(a), Ok(ys)) => y.mul(a, Partition::Series)?.add(ys, Partition::Series),
        _ => Err(Absent(Partition::Series)),
    }
}

/// Vertically concatenate the present partitions in the given order.
///
/// Absent partitions are skipped; if none is present the result is absent.
pub fn stack(parts: &[&Built]) -> Built {
    let present: Vec<&PhasorMatrix> = parts.iter().filter_map(|p| p.as_ref().ok()).collect();
    let rows = present.iter().map(|m| m.rows()).sum();
    let cols = present.first().map_or(0, |m| m.cols());

    let mut builder = MatrixBuilder::new(Partition::System, rows, cols);
    let mut offset = 0;
    for matrix in present {
        debug_assert_eq!(matrix.cols(), cols, "{} column count differs", matrix.partition());
        for (r, c, v) in matrix.entries() {
            builder.add(offset + r, c, v);
        }
        offset += matrix.rows();
    }
    builder.finish()
}

fn covariance(rows: &[SystemRow]) -> Built {
    let mut builder = MatrixBuilder::new(Partition::Covariance, rows.len(), rows.len());
    for (i, row) in rows.iter().enumerate() {
        builder.add(i, i, Complex64::new(row.variance, 0.0));
    }
    builder.finish()
}

fn push_rows(
    rows: &mut Vec<SystemRow>,
    source: RowSource,
    group: &PhasorGroup,
    label: &str,
    mode: PhaseMode,
    floor: f64,
) {
    for (p, variance) in group.variances(mode).into_iter().enumerate() {
        let (phase, label) = match mode {
            PhaseMode::PositiveSequence => (None, label.to_string()),
            PhaseMode::ThreePhase => (
                Some(p),
                format!("{label}.{}", lse_core::phase::PHASE_LABELS[p]),
            ),
        };
        rows.push(SystemRow {
            source,
            phase,
            label,
            // NaN falls back to the floor as well
            variance: variance.max(floor),
        });
    }
}

/// Row descriptors of B for the partitions that are present.
fn system_rows(
    model: &NetworkModel,
    assignment: &IndexAssignment,
    include: [bool; 3],
    floor: f64,
) -> Vec<SystemRow> {
    let mode = assignment.mode();
    let mut rows = Vec::new();

    if include[0] {
        for (k, row) in assignment.voltage_rows().iter().enumerate() {
            if let Some(group) = &model.graph[row.node].voltage {
                push_rows(&mut rows, RowSource::Voltage(k), group, &row.label, mode, floor);
            }
        }
    }
    if include[1] {
        for (k, row) in assignment.flow_rows().iter().enumerate() {
            let group = &model.current_flows[row.flow].group;
            push_rows(&mut rows, RowSource::CurrentFlow(k), group, &row.label, mode, floor);
        }
    }
    if include[2] {
        for (k, row) in assignment.injection_rows().iter().enumerate() {
            let group = &model.current_injections[row.injection].group;
            push_rows(&mut rows, RowSource::CurrentInjection(k), group, &row.label, mode, floor);
        }
    }
    rows
}

/// Weighted-least-squares gain `M = (Bᴴ R⁻¹ B)⁻¹ Bᴴ R⁻¹` for a diagonal R.
pub fn gain_matrix(
    system: &PhasorMatrix,
    variances: &[f64],
    backend: &dyn LinearSystemBackend,
) -> LseResult<Built> {
    let (m, n) = system.shape();
    debug_assert_eq!(variances.len(), m);

    // Bᴴ R⁻¹: column j of Bᴴ scaled by the weight of measurement j
    let mut weighted = MatrixBuilder::new(Partition::Gain, n, m);
    for (r, c, v) in system.entries() {
        weighted.add(c, r, v.conj() / variances[r]);
    }
    let weighted = match weighted.finish() {
        Ok(w) => w,
        Err(absent) => return Ok(Err(absent)),
    };

    let normal = match weighted.mul(system, Partition::Gain) {
        Ok(g) => g.to_dense(),
        Err(absent) => return Ok(Err(absent)),
    };
    let inverse = backend.invert(&normal).map_err(|err| {
        warn!(dimension = n, backend = backend.name(), "gain matrix is singular");
        err
    })?;

    let mut gain = vec![vec![Complex64::default(); m]; n];
    for (i, out) in gain.iter_mut().enumerate() {
        for (k, &g) in inverse[i].iter().enumerate() {
            if g == Complex64::default() {
                continue;
            }
            for (j, v) in weighted.row_entries(k) {
                out[j] += g * v;
            }
        }
    }
    Ok(PhasorMatrix::from_dense(Partition::Gain, &gain))
}

/// Build every partition, the system matrix, its covariance and the gain.
///
/// # Errors
///
/// Fails only when the weighted normal matrix is singular; missing
/// partitions are reported as [`Absent`] inside the result.
pub fn assemble(
    model: &NetworkModel,
    assignment: &IndexAssignment,
    config: &EstimatorConfig,
    backend: &dyn LinearSystemBackend,
) -> LseResult<SystemMatrices> {
    let a = current_flow_incidence(model, assignment);
    let ii = voltage_incidence(assignment);
    let y = series_admittance(model, assignment);
    let ys = line_shunt_admittance(model, assignment);
    let ysh = shunt_susceptance(model, assignment);
    let k = series_partition(&y, &a, &ys);

    let include = [ii.is_ok(), k.is_ok(), ysh.is_ok()];
    let system = stack(&[&ii, &k, &ysh]);
    let rows = system_rows(model, assignment, include, config.variance_floor);
    let covariance = covariance(&rows);

    debug!(
        ii = include[0],
        k = include[1],
        ysh = include[2],
        rows = rows.len(),
        columns = assignment.state_dimension(),
        "system matrix assembled"
    );

    let gain = match &system {
        Ok(b) => {
            let variances: Vec<f64> = rows.iter().map(|r| r.variance).collect();
            gain_matrix(b, &variances, backend)?
        }
        Err(_) => Err(Absent(Partition::Gain)),
    };

    Ok(SystemMatrices {
        current_flow_incidence: a,
        voltage_incidence: ii,
        series_admittance: y,
        line_shunt: ys,
        shunt_susceptance: ysh,
        series: k,
        system,
        covariance,
        gain,
        rows,
    })
}
