//! Per-cycle estimation pipeline.
//!
//! ```text
//! resolve topology → classify → build partitions → assemble B, R, M
//!                                               ↘ reduce K to K_cal
//! x = M·z,  residual = z − B·x
//! ```
//!
//! [`StateEstimator::run_cycle`] takes the model by `&mut` for the whole
//! pass, so switching states and measurement values cannot change between
//! resolution and assembly.

use std::sync::Arc;

use lse_core::{
    validate_model, EstimatorConfig, LinearSystemBackend, LseResult, NetworkModel, NodeId,
    Observability,
};
use num_complex::Complex64;
use tracing::{debug, info, warn};

use crate::io;
use crate::sparse::{assemble, calibration_matrix, CalibrationReduction, RowSource, SystemMatrices};
use crate::topology::{classify, IndexAssignment, TopologyResolver};

/// Estimated voltage of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEstimate {
    pub node: NodeId,
    pub observability: Observability,
    /// One value in positive-sequence mode, phases A, B, C otherwise;
    /// `None` outside the solvable island or when no gain matrix exists
    pub voltage: Option<Vec<Complex64>>,
}

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub cycle: u64,
    pub topology_changed: bool,
    pub assignment: IndexAssignment,
    pub matrices: SystemMatrices,
    pub calibration: CalibrationReduction,
    /// Measurement vector z in the row order of B
    pub measurements: Vec<Complex64>,
    /// State vector x = M·z, one entry per column of B
    pub state: Option<Vec<Complex64>>,
    pub node_estimates: Vec<NodeEstimate>,
    /// z − B·x
    pub residuals: Option<Vec<Complex64>>,
}

impl CycleOutput {
    pub fn estimate_for(&self, node: NodeId) -> Option<&NodeEstimate> {
        self.node_estimates.iter().find(|e| e.node == node)
    }
}

/// Calibration-corrected measurement vector in the row order of B.
pub fn measurement_vector(
    model: &NetworkModel,
    assignment: &IndexAssignment,
    matrices: &SystemMatrices,
) -> Vec<Complex64> {
    let mode = assignment.mode();
    let mut z = Vec::with_capacity(matrices.rows.len());
    for row in &matrices.rows {
        let group = match row.source {
            RowSource::Voltage(k) => {
                model.graph[assignment.voltage_rows()[k].node].voltage.as_ref()
            }
            RowSource::CurrentFlow(k) => {
                Some(&model.current_flows[assignment.flow_rows()[k].flow].group)
            }
            RowSource::CurrentInjection(k) => {
                Some(&model.current_injections[assignment.injection_rows()[k].injection].group)
            }
        };
        let value = group
            .map(|g| g.measured_values(mode)[row.phase.unwrap_or(0)])
            .unwrap_or_default();
        z.push(value);
    }
    z
}

fn node_estimates(
    model: &NetworkModel,
    assignment: &IndexAssignment,
    state: Option<&[Complex64]>,
) -> Vec<NodeEstimate> {
    let w = assignment.width();
    model
        .graph
        .node_indices()
        .map(|idx| {
            let node = &model.graph[idx];
            let voltage = state
                .zip(assignment.column_of(idx))
                .map(|(x, col)| x[col * w..(col + 1) * w].to_vec());
            NodeEstimate {
                node: node.id,
                observability: node.observability,
                voltage,
            }
        })
        .collect()
}

/// Stateful estimator: owns the topology cache and the inversion backend.
pub struct StateEstimator {
    config: EstimatorConfig,
    backend: Arc<dyn LinearSystemBackend>,
    resolver: TopologyResolver,
    cycle: u64,
}

impl StateEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let backend = config.solver.build_solver(config.singular_tolerance);
        Self {
            config,
            backend,
            resolver: TopologyResolver::new(),
            cycle: 0,
        }
    }

    /// Replace the inversion backend chosen by the configuration.
    pub fn with_backend(mut self, backend: Arc<dyn LinearSystemBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Number of cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run one full estimation pass over the model's current state.
    ///
    /// # Errors
    ///
    /// Model-consistency errors and a singular gain system abort the cycle.
    /// Export failures are reported as [`lse_core::LseError::Other`].
    pub fn run_cycle(&mut self, model: &mut NetworkModel) -> LseResult<CycleOutput> {
        if self.cycle == 0 {
            let diagnostics = validate_model(model);
            for issue in diagnostics.errors() {
                warn!(category = %issue.category, entity = ?issue.entity, "{}", issue.message);
            }
            for issue in diagnostics.warnings() {
                debug!(category = %issue.category, entity = ?issue.entity, "{}", issue.message);
            }
            info!(stats = %model.stats(), "first estimation cycle");
        }
        self.cycle += 1;
        let cycle = self.cycle;

        let partition = self.resolver.resolve(model)?;
        let assignment = classify(model, partition)?;
        let topology_changed = self.resolver.topology_changed();

        let matrices = assemble(model, &assignment, &self.config, self.backend.as_ref())?;
        let calibration = calibration_matrix(model, &assignment, &matrices.series);

        let measurements = measurement_vector(model, &assignment, &matrices);
        let state = matrices
            .gain
            .as_ref()
            .ok()
            .map(|m| m.mul_vector(&measurements));
        let residuals = match (&matrices.system, &state) {
            (Ok(b), Some(x)) => Some(
                measurements
                    .iter()
                    .zip(b.mul_vector(x))
                    .map(|(&z, bx)| z - bx)
                    .collect(),
            ),
            _ => None,
        };
        let node_estimates = node_estimates(model, &assignment, state.as_deref());

        let output = CycleOutput {
            cycle,
            topology_changed,
            assignment,
            matrices,
            calibration,
            measurements,
            state,
            node_estimates,
            residuals,
        };

        if let Some(dir) = &self.config.export.matrix_dir {
            let target = dir.join(format!("cycle-{cycle:06}"));
            let written = io::export_cycle(&target, &output, self.config.export.include_header)?;
            debug!(files = written.len(), dir = %target.display(), "matrices exported");
        }

        debug!(
            cycle,
            topology_changed,
            rows = output.measurements.len(),
            state = output.state.as_ref().map_or(0, Vec::len),
            "estimation cycle complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use lse_core::PhaseMode;

    #[test]
    fn noiseless_single_line_recovers_voltages() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let mut estimator = StateEstimator::new(EstimatorConfig::default());
        let output = estimator.run_cycle(&mut model).unwrap();

        let x = output.state.as_ref().unwrap();
        assert_eq!(x.len(), 2);
        for residual in output.residuals.as_ref().unwrap() {
            assert!(residual.norm() < 1e-8, "residual {residual}");
        }
        let n1 = output.estimate_for(NodeId::new(1)).unwrap();
        assert_eq!(n1.observability, Observability::DirectlyObserved);
        assert!((n1.voltage.as_ref().unwrap()[0] - x[0]).norm() < 1e-12);
    }

    #[test]
    fn injected_backend_replaces_configured_solver() {
        // no pivot can reach twice the largest entry
        let strict = Arc::new(lse_core::GaussSolver { tolerance: 2.0 });
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let err = StateEstimator::new(EstimatorConfig::default())
            .with_backend(strict)
            .run_cycle(&mut model)
            .unwrap_err();
        assert!(matches!(err, lse_core::LseError::SingularSystem { .. }));
    }

    #[test]
    fn second_cycle_reuses_topology() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let mut estimator = StateEstimator::new(EstimatorConfig::default());
        assert!(estimator.run_cycle(&mut model).unwrap().topology_changed);
        let second = estimator.run_cycle(&mut model).unwrap();
        assert!(!second.topology_changed);
        assert_eq!(second.cycle, 2);
        assert_eq!(estimator.cycles(), 2);
    }
}
