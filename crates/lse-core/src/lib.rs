//! # lse-core: Network Model for linear phasor state estimation
//!
//! Provides the data structures the estimator consumes each cycle: electrical
//! nodes, the branches between them, and the phasor measurement groups that
//! observe them.
//!
//! ## Design Philosophy
//!
//! The network is an **undirected multigraph**:
//! - **Nodes**: electrical connection points, each with an optional voltage [`PhasorGroup`]
//! - **Edges**: a tagged [`Branch`] (line, transformer, shunt compensator, switching device)
//!
//! Shunt compensators connect a node to ground and are stored as self-loops.
//! Switching devices carry no impedance; they only decide which nodes fuse
//! into one observed bus.
//!
//! ## Quick Start
//!
//! ```rust
//! use lse_core::*;
//!
//! let mut model = NetworkModel::new(PhaseMode::PositiveSequence);
//!
//! let n1 = model.add_node(Node::new(NodeId::new(1), "Sub A 230", Kilovolts(230.0)));
//! let n2 = model.add_node(Node::new(NodeId::new(2), "Sub A 230 bay", Kilovolts(230.0)));
//! let n3 = model.add_node(Node::new(NodeId::new(3), "Sub B 230", Kilovolts(230.0)));
//!
//! model.add_branch(n1, n2, Branch::Switch(SwitchingDevice::breaker(BranchId::new(10), "CB-10")));
//! model.add_branch(n2, n3, Branch::Line(TransmissionLine::new(BranchId::new(20), "A-B", 0.01, 0.1)));
//!
//! assert_eq!(model.stats().num_switches, 1);
//! ```
//!
//! ## Modules
//!
//! - [`phasor`] - Measurement channels, calibration settings, phasor groups
//! - [`phase`] - Phase mode and 3×3 phase-coupled blocks
//! - [`diagnostics`] - Model validation reporting
//! - [`config`] - Estimator configuration
//! - [`solver`] - Dense complex inversion backends for the gain matrix

use std::collections::HashMap;

use num_complex::Complex64;
use petgraph::prelude::*;
use petgraph::Undirected;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod phase;
pub mod phasor;
pub mod solver;
pub mod units;

pub use config::{EstimatorConfig, ExportConfig};
pub use diagnostics::{validate_model, DiagnosticIssue, Diagnostics, Severity};
pub use error::{LseError, LseResult};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use phase::{PhaseMatrix, PhaseMode};
pub use phasor::{
    CalibrationSetting, Correction, CurrentFlowPhasorGroup, CurrentInjectionPhasorGroup,
    InjectionDirection, Phasor, PhasorGroup,
};
pub use solver::*;
pub use units::{Degrees, Kilovolts, Radians};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhasorGroupId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl BranchId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BranchId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl PhasorGroupId {
    #[inline]
    pub fn new(value: usize) -> Self {
        PhasorGroupId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node#{}", self.0)
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Branch#{}", self.0)
    }
}

impl std::fmt::Display for PhasorGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Phasor#{}", self.0)
    }
}

/// Observability of a node after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observability {
    /// Owns a usable voltage phasor group
    DirectlyObserved,
    /// Shares an observed bus with a directly observed node
    IndirectlyObserved,
    #[default]
    Unobserved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Nominal line-to-line voltage
    pub base_kv: Kilovolts,
    /// Voltage measurement at this node, if instrumented
    #[serde(default)]
    pub voltage: Option<PhasorGroup>,
    /// Recomputed every cycle by the observability classifier
    #[serde(default)]
    pub observability: Observability,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, base_kv: Kilovolts) -> Self {
        Self {
            id,
            name: name.into(),
            base_kv,
            voltage: None,
            observability: Observability::Unobserved,
        }
    }

    pub fn with_voltage(mut self, group: PhasorGroup) -> Self {
        self.voltage = Some(group);
        self
    }
}

/// Series impedance in per-unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SeriesImpedance {
    pub resistance: f64,
    pub reactance: f64,
}

impl SeriesImpedance {
    pub fn new(resistance: f64, reactance: f64) -> Self {
        Self {
            resistance,
            reactance,
        }
    }

    pub fn as_complex(&self) -> Complex64 {
        Complex64::new(self.resistance, self.reactance)
    }

    /// y = 1 / (r + jx); `None` for a zero impedance.
    pub fn admittance(&self) -> Option<Complex64> {
        let z = self.as_complex();
        if z.norm() < 1e-12 {
            None
        } else {
            Some(z.inv())
        }
    }
}

/// Equivalent impedances seen from each terminal when a branch has
/// intermediate taps that are not observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TapEquivalent {
    pub from_side: SeriesImpedance,
    pub to_side: SeriesImpedance,
}

/// Branch terminal at which a current measurement is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalEnd {
    From,
    To,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionLine {
    pub id: BranchId,
    pub name: String,
    pub impedance: SeriesImpedance,
    /// Total line charging susceptance (per-unit), split half per terminal
    #[serde(default)]
    pub charging_susceptance: f64,
    /// Full phase impedance matrix for three-phase estimation
    #[serde(default)]
    pub phase_impedance: Option<PhaseMatrix>,
    #[serde(default)]
    pub tap_equivalent: Option<TapEquivalent>,
    pub in_service: bool,
}

impl TransmissionLine {
    pub fn new(id: BranchId, name: impl Into<String>, resistance: f64, reactance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            impedance: SeriesImpedance::new(resistance, reactance),
            charging_susceptance: 0.0,
            phase_impedance: None,
            tap_equivalent: None,
            in_service: true,
        }
    }

    pub fn with_charging(mut self, susceptance: f64) -> Self {
        self.charging_susceptance = susceptance;
        self
    }

    pub fn with_phase_impedance(mut self, z: PhaseMatrix) -> Self {
        self.phase_impedance = Some(z);
        self
    }

    pub fn with_tap_equivalent(mut self, taps: TapEquivalent) -> Self {
        self.tap_equivalent = Some(taps);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub id: BranchId,
    pub name: String,
    pub impedance: SeriesImpedance,
    /// Effective off-nominal turns ratio at the from terminal (tap × e^{jφ})
    pub turns_ratio: Complex64,
    #[serde(default)]
    pub magnetizing_susceptance: f64,
    /// Phase-coupled admittance block for three-phase estimation
    #[serde(default)]
    pub phase_admittance: Option<PhaseMatrix>,
    #[serde(default)]
    pub tap_equivalent: Option<TapEquivalent>,
    pub in_service: bool,
}

impl Transformer {
    pub fn new(id: BranchId, name: impl Into<String>, resistance: f64, reactance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            impedance: SeriesImpedance::new(resistance, reactance),
            turns_ratio: Complex64::new(1.0, 0.0),
            magnetizing_susceptance: 0.0,
            phase_admittance: None,
            tap_equivalent: None,
            in_service: true,
        }
    }

    /// Off-nominal tap magnitude and phase shift.
    pub fn with_turns_ratio(mut self, tap: f64, shift: Radians) -> Self {
        self.turns_ratio = Complex64::from_polar(tap, shift.value());
        self
    }

    pub fn with_phase_admittance(mut self, y: PhaseMatrix) -> Self {
        self.phase_admittance = Some(y);
        self
    }
}

/// Shunt capacitor or reactor between a node and ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuntCompensator {
    pub id: BranchId,
    pub name: String,
    /// Susceptance in per-unit (positive = capacitor, negative = reactor)
    pub susceptance: f64,
    pub in_service: bool,
}

impl ShuntCompensator {
    pub fn new(id: BranchId, name: impl Into<String>, susceptance: f64) -> Self {
        Self {
            id,
            name: name.into(),
            susceptance,
            in_service: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    Breaker,
    Switch,
}

/// Zero-impedance switching device. Breakers and switches behave the same
/// for connectivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchingDevice {
    pub id: BranchId,
    pub name: String,
    pub kind: SwitchKind,
    pub closed: bool,
}

impl SwitchingDevice {
    pub fn breaker(id: BranchId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: SwitchKind::Breaker,
            closed: true,
        }
    }

    pub fn switch(id: BranchId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: SwitchKind::Switch,
            closed: true,
        }
    }

    pub fn opened(mut self) -> Self {
        self.closed = false;
        self
    }
}

/// Edge payload of the network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Branch {
    Line(TransmissionLine),
    Transformer(Transformer),
    Shunt(ShuntCompensator),
    Switch(SwitchingDevice),
}

impl Branch {
    pub fn id(&self) -> BranchId {
        match self {
            Branch::Line(line) => line.id,
            Branch::Transformer(tx) => tx.id,
            Branch::Shunt(shunt) => shunt.id,
            Branch::Switch(device) => device.id,
        }
    }

    /// Human-readable label for the branch.
    pub fn label(&self) -> &str {
        match self {
            Branch::Line(line) => &line.name,
            Branch::Transformer(tx) => &tx.name,
            Branch::Shunt(shunt) => &shunt.name,
            Branch::Switch(device) => &device.name,
        }
    }

    /// In-service flag; a switching device is "in service" when closed.
    pub fn in_service(&self) -> bool {
        match self {
            Branch::Line(line) => line.in_service,
            Branch::Transformer(tx) => tx.in_service,
            Branch::Shunt(shunt) => shunt.in_service,
            Branch::Switch(device) => device.closed,
        }
    }

    /// Lines and transformers carry series impedance and can host current-flow measurements.
    pub fn is_series(&self) -> bool {
        matches!(self, Branch::Line(_) | Branch::Transformer(_))
    }

    fn side_impedance(
        impedance: &SeriesImpedance,
        taps: &Option<TapEquivalent>,
        end: TerminalEnd,
    ) -> SeriesImpedance {
        match (taps, end) {
            (Some(taps), TerminalEnd::From) => taps.from_side,
            (Some(taps), TerminalEnd::To) => taps.to_side,
            (None, _) => *impedance,
        }
    }

    /// Positive-sequence series admittance seen from the measuring terminal.
    ///
    /// `None` for non-series branches and zero impedances.
    pub fn series_admittance(&self, end: TerminalEnd) -> Option<Complex64> {
        match self {
            Branch::Line(line) => {
                Self::side_impedance(&line.impedance, &line.tap_equivalent, end).admittance()
            }
            Branch::Transformer(tx) => {
                Self::side_impedance(&tx.impedance, &tx.tap_equivalent, end).admittance()
            }
            Branch::Shunt(_) | Branch::Switch(_) => None,
        }
    }

    /// 3×3 series admittance block seen from the measuring terminal.
    ///
    /// Falls back to the positive-sequence admittance of the measuring side
    /// times identity when no phase data is modelled or the phase impedance
    /// cannot be inverted. A transformer's turns ratio is not part of that
    /// fallback; the current-flow incidence carries it.
    pub fn phase_admittance(&self, end: TerminalEnd) -> Option<PhaseMatrix> {
        let balanced = self.series_admittance(end).map(PhaseMatrix::scalar);
        match self {
            Branch::Line(line) if line.tap_equivalent.is_none() => line
                .phase_impedance
                .and_then(|z| z.inverse())
                .or(balanced),
            Branch::Transformer(tx) => tx.phase_admittance.or(balanced),
            _ => balanced,
        }
    }

    /// Shunt admittance attributed to the measuring terminal (half line charging,
    /// or transformer magnetizing susceptance).
    pub fn terminal_shunt_admittance(&self) -> Complex64 {
        match self {
            Branch::Line(line) => Complex64::new(0.0, line.charging_susceptance / 2.0),
            Branch::Transformer(tx) => Complex64::new(0.0, tx.magnetizing_susceptance),
            Branch::Shunt(_) | Branch::Switch(_) => Complex64::new(0.0, 0.0),
        }
    }
}

/// The network model the estimator reads and updates each cycle.
#[derive(Debug, Default)]
pub struct NetworkModel {
    pub graph: Graph<Node, Branch, Undirected>,
    /// Phase representation, read once per cycle
    pub phase_mode: PhaseMode,
    pub current_flows: Vec<CurrentFlowPhasorGroup>,
    pub current_injections: Vec<CurrentInjectionPhasorGroup>,
    node_lookup: HashMap<NodeId, NodeIndex>,
    branch_lookup: HashMap<BranchId, EdgeIndex>,
}

// Electrical nodes are graph nodes and every branch kind is an edge, so the
// switching topology and the admittance network share one structure. Edge
// endpoints keep insertion order, which fixes each branch's from/to terminals.
// Nodes and branches must be added through the `add_*` methods so the id
// lookups stay in step with the graph.

impl NetworkModel {
    pub fn new(phase_mode: PhaseMode) -> Self {
        Self {
            graph: Graph::new_undirected(),
            phase_mode,
            current_flows: Vec::new(),
            current_injections: Vec::new(),
            node_lookup: HashMap::new(),
            branch_lookup: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_lookup.insert(id, idx);
        idx
    }

    /// Add a branch from `from` to `to`; the order fixes the branch orientation.
    pub fn add_branch(&mut self, from: NodeIndex, to: NodeIndex, branch: Branch) -> EdgeIndex {
        let id = branch.id();
        let idx = self.graph.add_edge(from, to, branch);
        self.branch_lookup.insert(id, idx);
        idx
    }

    /// Attach a shunt compensator to `node` (stored as a self-loop).
    pub fn add_shunt(&mut self, node: NodeIndex, shunt: ShuntCompensator) -> EdgeIndex {
        self.add_branch(node, node, Branch::Shunt(shunt))
    }

    pub fn add_current_flow(&mut self, flow: CurrentFlowPhasorGroup) {
        self.current_flows.push(flow);
    }

    pub fn add_current_injection(&mut self, injection: CurrentInjectionPhasorGroup) {
        self.current_injections.push(injection);
    }

    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.node_lookup.get(&id).copied()
    }

    pub fn branch_index(&self, id: BranchId) -> Option<EdgeIndex> {
        self.branch_lookup.get(&id).copied()
    }

    pub fn node_mut(&mut self, id: NodeId) -> LseResult<&mut Node> {
        let idx = self.node_index(id).ok_or(LseError::UnknownNode(id))?;
        Ok(&mut self.graph[idx])
    }

    /// Voltage phasor group of a node, for per-cycle value updates.
    pub fn voltage_group_mut(&mut self, id: NodeId) -> LseResult<Option<&mut PhasorGroup>> {
        Ok(self.node_mut(id)?.voltage.as_mut())
    }

    pub fn branch_mut(&mut self, id: BranchId) -> LseResult<&mut Branch> {
        let idx = self.branch_index(id).ok_or(LseError::UnknownBranch(id))?;
        Ok(&mut self.graph[idx])
    }

    /// Open or close a switching device.
    pub fn set_switch_state(&mut self, id: BranchId, closed: bool) -> LseResult<()> {
        match self.branch_mut(id)? {
            Branch::Switch(device) => {
                device.closed = closed;
                Ok(())
            }
            _ => Err(LseError::BranchKindMismatch {
                branch: id,
                expected: "switching device",
            }),
        }
    }

    /// Change the in-service flag of a line, transformer or shunt compensator.
    pub fn set_in_service(&mut self, id: BranchId, in_service: bool) -> LseResult<()> {
        match self.branch_mut(id)? {
            Branch::Line(line) => line.in_service = in_service,
            Branch::Transformer(tx) => tx.in_service = in_service,
            Branch::Shunt(shunt) => shunt.in_service = in_service,
            Branch::Switch(_) => {
                return Err(LseError::BranchKindMismatch {
                    branch: id,
                    expected: "line, transformer or shunt compensator",
                })
            }
        }
        Ok(())
    }

    /// Open/closed state of every switching device, in edge order.
    pub fn switch_states(&self) -> Vec<(EdgeIndex, bool)> {
        self.graph
            .edge_indices()
            .filter_map(|idx| match &self.graph[idx] {
                Branch::Switch(device) => Some((idx, device.closed)),
                _ => None,
            })
            .collect()
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_nodes: self.graph.node_count(),
            num_current_flows: self.current_flows.len(),
            num_current_injections: self.current_injections.len(),
            ..NetworkStats::default()
        };

        stats.num_voltage_groups = self
            .graph
            .node_weights()
            .filter(|n| n.voltage.is_some())
            .count();

        for branch in self.graph.edge_weights() {
            match branch {
                Branch::Line(_) => stats.num_lines += 1,
                Branch::Transformer(_) => stats.num_transformers += 1,
                Branch::Shunt(_) => stats.num_shunts += 1,
                Branch::Switch(device) => {
                    stats.num_switches += 1;
                    if device.closed {
                        stats.num_closed_switches += 1;
                    }
                }
            }
        }
        stats
    }

    /// Validate the model for issues that abort or degrade an estimation cycle.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.graph.node_count() == 0 {
            diag.add_error("structure", "Network model has no nodes");
            return;
        }

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            if self.graph.edges(idx).next().is_none() {
                diag.add_error_with_entity(
                    "topology",
                    "Node is not connected to any branch",
                    &node.id.to_string(),
                );
            }
            if let Some(group) = &node.voltage {
                check_variances(diag, group);
            }
        }

        for branch in self.graph.edge_weights() {
            match branch {
                Branch::Line(_) | Branch::Transformer(_)
                    if branch.series_admittance(TerminalEnd::From).is_none() =>
                {
                    diag.add_error_with_entity(
                        "physical",
                        "Series branch has zero impedance",
                        &branch.id().to_string(),
                    );
                }
                Branch::Shunt(shunt) if shunt.susceptance.abs() < 1e-12 => {
                    diag.add_warning_with_entity(
                        "physical",
                        "Shunt compensator has zero susceptance",
                        &shunt.id.to_string(),
                    );
                }
                _ => {}
            }
        }

        for flow in &self.current_flows {
            if self.branch_index(flow.branch).is_none() {
                diag.add_error_with_entity(
                    "reference",
                    &format!("Current flow references unknown {}", flow.branch),
                    &flow.group.id.to_string(),
                );
            }
            for node in [flow.from_node, flow.to_node] {
                if self.node_index(node).is_none() {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("Current flow references unknown {}", node),
                        &flow.group.id.to_string(),
                    );
                }
            }
            check_variances(diag, &flow.group);
        }

        for injection in &self.current_injections {
            if self.branch_index(injection.shunt).is_none() {
                diag.add_error_with_entity(
                    "reference",
                    &format!("Current injection references unknown {}", injection.shunt),
                    &injection.group.id.to_string(),
                );
            }
            if self.node_index(injection.node).is_none() {
                diag.add_error_with_entity(
                    "reference",
                    &format!("Current injection references unknown {}", injection.node),
                    &injection.group.id.to_string(),
                );
            }
            check_variances(diag, &injection.group);
        }
    }
}

fn check_variances(diag: &mut Diagnostics, group: &PhasorGroup) {
    let non_positive = group
        .phases
        .iter()
        .chain(group.positive_sequence.iter())
        .any(|p| p.variance <= 0.0 || !p.variance.is_finite());
    if non_positive {
        diag.add_validation_warning(
            &group.id.to_string(),
            "Measurement variance is not positive; the configured floor will apply",
        );
    }
}

/// Element counts of a network model
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_nodes: usize,
    pub num_lines: usize,
    pub num_transformers: usize,
    pub num_shunts: usize,
    pub num_switches: usize,
    pub num_closed_switches: usize,
    pub num_voltage_groups: usize,
    pub num_current_flows: usize,
    pub num_current_injections: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} lines, {} transformers, {} shunts, {}/{} switches closed, {} voltage / {} flow / {} injection phasor groups",
            self.num_nodes,
            self.num_lines,
            self.num_transformers,
            self.num_shunts,
            self.num_closed_switches,
            self.num_switches,
            self.num_voltage_groups,
            self.num_current_flows,
            self.num_current_injections
        )
    }
}

impl Node {
    /// Human-readable label for the node.
    pub fn label(&self) -> &str {
        &self.name
    }
}
