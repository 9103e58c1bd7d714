//! Observability classification and cycle-local index assignment.
//!
//! [`classify`] marks every node as directly observed, indirectly observed
//! or unobserved, validates every measurement reference against the model,
//! and returns an [`IndexAssignment`]: the immutable row/column numbering
//! that every matrix builder of the cycle consumes.

use lse_core::{
    Branch, EdgeIndex, InjectionDirection, LseError, LseResult, NetworkModel, NodeIndex,
    Observability, PhaseMode, TerminalEnd,
};
use tracing::debug;

use super::resolver::TopologyPartition;

/// One column (or 3-column block) of the bus-indexed matrices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusColumn {
    /// Index into [`TopologyPartition::buses`]
    pub bus: usize,
    pub nodes: Vec<NodeIndex>,
    pub label: String,
}

/// A directly observed node, one row (block) of II.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoltageRow {
    pub node: NodeIndex,
    pub column: usize,
    pub label: String,
}

/// An included current-flow measurement, one row (block) of A, Y, Ys and K.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRow {
    /// Index into `NetworkModel::current_flows`
    pub flow: usize,
    pub edge: EdgeIndex,
    /// Branch terminal at which the current is measured
    pub end: TerminalEnd,
    /// Column of the bus the current leaves
    pub leaving: Option<usize>,
    /// Column of the bus the current enters
    pub entering: Option<usize>,
    pub label: String,
}

/// An included current-injection measurement, one row (block) of Ysh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRow {
    /// Index into `NetworkModel::current_injections`
    pub injection: usize,
    pub edge: EdgeIndex,
    pub column: usize,
    pub direction: InjectionDirection,
    pub label: String,
}

/// Row and column numbering shared by every builder of one cycle.
#[derive(Debug, Clone)]
pub struct IndexAssignment {
    mode: PhaseMode,
    columns: Vec<BusColumn>,
    node_columns: Vec<Option<usize>>,
    voltage_rows: Vec<VoltageRow>,
    flow_rows: Vec<FlowRow>,
    injection_rows: Vec<InjectionRow>,
}

impl IndexAssignment {
    pub fn mode(&self) -> PhaseMode {
        self.mode
    }

    /// Rows/columns per entity: 1 or 3.
    pub fn width(&self) -> usize {
        self.mode.width()
    }

    pub fn columns(&self) -> &[BusColumn] {
        &self.columns
    }

    pub fn voltage_rows(&self) -> &[VoltageRow] {
        &self.voltage_rows
    }

    pub fn flow_rows(&self) -> &[FlowRow] {
        &self.flow_rows
    }

    pub fn injection_rows(&self) -> &[InjectionRow] {
        &self.injection_rows
    }

    /// Matrix column count (buses × width).
    pub fn state_dimension(&self) -> usize {
        self.columns.len() * self.width()
    }

    /// Column of the observed bus containing `node`, if that bus is solvable.
    pub fn column_of(&self, node: NodeIndex) -> Option<usize> {
        self.node_columns.get(node.index()).copied().flatten()
    }

    /// Column labels expanded to matrix width.
    pub fn column_labels(&self) -> Vec<String> {
        expand(self.columns.iter().map(|c| c.label.as_str()), self.mode)
    }

    pub fn flow_labels(&self) -> Vec<String> {
        expand(self.flow_rows.iter().map(|r| r.label.as_str()), self.mode)
    }

    /// Keep columns and injection rows only.
    #[cfg(test)]
    pub(crate) fn retain_injections(&mut self) {
        self.voltage_rows.clear();
        self.flow_rows.clear();
    }
}

/// Repeat each label once per phase in three-phase mode.
pub(crate) fn expand<'a>(labels: impl Iterator<Item = &'a str>, mode: PhaseMode) -> Vec<String> {
    match mode {
        PhaseMode::PositiveSequence => labels.map(str::to_string).collect(),
        PhaseMode::ThreePhase => labels
            .flat_map(|l| lse_core::phase::PHASE_LABELS.iter().map(move |p| format!("{l}.{p}")))
            .collect(),
    }
}

struct ValidFlow {
    edge: EdgeIndex,
    from: NodeIndex,
    to: NodeIndex,
    end: TerminalEnd,
}

fn validate_flow(model: &NetworkModel, index: usize) -> LseResult<ValidFlow> {
    let flow = &model.current_flows[index];
    let edge = model
        .branch_index(flow.branch)
        .ok_or(LseError::UnknownBranch(flow.branch))?;
    let from = model
        .node_index(flow.from_node)
        .ok_or(LseError::UnknownNode(flow.from_node))?;
    let to = model
        .node_index(flow.to_node)
        .ok_or(LseError::UnknownNode(flow.to_node))?;

    let branch = &model.graph[edge];
    if !branch.is_series() {
        return Err(LseError::BranchKindMismatch {
            branch: flow.branch,
            expected: "line or transformer",
        });
    }

    let mismatch = LseError::TerminalMismatch {
        branch: flow.branch,
        from: flow.from_node,
        to: flow.to_node,
    };
    let (a, b) = model.graph.edge_endpoints(edge).ok_or(mismatch)?;
    let end = if (a, b) == (from, to) {
        TerminalEnd::From
    } else if (b, a) == (from, to) {
        TerminalEnd::To
    } else {
        return Err(LseError::TerminalMismatch {
            branch: flow.branch,
            from: flow.from_node,
            to: flow.to_node,
        });
    };

    if branch.in_service() && branch.series_admittance(end).is_none() {
        return Err(LseError::ZeroImpedance(flow.branch));
    }

    Ok(ValidFlow { edge, from, to, end })
}

fn validate_injection(model: &NetworkModel, index: usize) -> LseResult<(EdgeIndex, NodeIndex)> {
    let injection = &model.current_injections[index];
    let edge = model
        .branch_index(injection.shunt)
        .ok_or(LseError::UnknownBranch(injection.shunt))?;
    let node = model
        .node_index(injection.node)
        .ok_or(LseError::UnknownNode(injection.node))?;

    if !matches!(model.graph[edge], Branch::Shunt(_)) {
        return Err(LseError::BranchKindMismatch {
            branch: injection.shunt,
            expected: "shunt compensator",
        });
    }
    if model.graph.edge_endpoints(edge).map(|(a, _)| a) != Some(node) {
        return Err(LseError::TerminalMismatch {
            branch: injection.shunt,
            from: injection.node,
            to: injection.node,
        });
    }
    Ok((edge, node))
}

/// Classify node observability and number the rows and columns of this cycle.
///
/// The solvable island is every bus with a directly observed node, plus any
/// bus one in-service series branch away whose current is metered from the
/// measured side. Columns follow partition order restricted to the island.
///
/// # Errors
///
/// Any measurement that references a missing node or branch, a branch of
/// the wrong kind, or terminals that are not the branch endpoints aborts
/// the cycle with a model-consistency error.
pub fn classify(
    model: &mut NetworkModel,
    partition: &TopologyPartition,
) -> LseResult<IndexAssignment> {
    let mode = model.phase_mode;
    let node_count = model.graph.node_count();

    // every reference is checked before any node flag is written
    let flows = (0..model.current_flows.len())
        .map(|i| validate_flow(model, i))
        .collect::<LseResult<Vec<_>>>()?;
    let injections = (0..model.current_injections.len())
        .map(|i| validate_injection(model, i))
        .collect::<LseResult<Vec<_>>>()?;

    let mut direct = vec![false; node_count];
    let mut measured = vec![false; partition.len()];
    for idx in model.graph.node_indices() {
        let bus = partition
            .bus_of(idx)
            .ok_or(LseError::UnassignedNode(model.graph[idx].id))?;
        let observed = model.graph[idx]
            .voltage
            .as_ref()
            .is_some_and(|group| group.is_usable(mode));
        direct[idx.index()] = observed;
        measured[bus] |= observed;
    }

    for idx in model.graph.node_indices() {
        let state = if direct[idx.index()] {
            Observability::DirectlyObserved
        } else if partition.bus_of(idx).is_some_and(|b| measured[b]) {
            Observability::IndirectlyObserved
        } else {
            Observability::Unobserved
        };
        model.graph[idx].observability = state;
    }
    let model: &NetworkModel = model;

    let flow_candidate = |i: usize, flow: &ValidFlow| {
        model.graph[flow.edge].in_service()
            && model.current_flows[i].group.is_usable(mode)
            && !partition.same_bus(flow.from, flow.to)
    };

    let mut island = measured.clone();
    for (i, flow) in flows.iter().enumerate() {
        if !flow_candidate(i, flow) {
            continue;
        }
        if let (Some(from_bus), Some(to_bus)) =
            (partition.bus_of(flow.from), partition.bus_of(flow.to))
        {
            if measured[from_bus] {
                island[to_bus] = true;
            }
        }
    }

    let mut bus_columns = vec![None; partition.len()];
    let mut columns = Vec::new();
    for bus in partition.buses() {
        if !island[bus.index] {
            continue;
        }
        bus_columns[bus.index] = Some(columns.len());
        let label = bus
            .nodes
            .iter()
            .map(|&n| model.graph[n].label())
            .collect::<Vec<_>>()
            .join("+");
        columns.push(BusColumn {
            bus: bus.index,
            nodes: bus.nodes.clone(),
            label,
        });
    }

    let node_columns: Vec<Option<usize>> = (0..node_count)
        .map(|i| partition.bus_of(NodeIndex::new(i)).and_then(|b| bus_columns[b]))
        .collect();

    let voltage_rows: Vec<VoltageRow> = model
        .graph
        .node_indices()
        .filter(|idx| direct[idx.index()])
        .filter_map(|idx| {
            let node = &model.graph[idx];
            node_columns[idx.index()].map(|column| VoltageRow {
                node: idx,
                column,
                label: node
                    .voltage
                    .as_ref()
                    .map_or_else(|| node.name.clone(), |g| g.name.clone()),
            })
        })
        .collect();

    let flow_rows: Vec<FlowRow> = flows
        .iter()
        .enumerate()
        .filter(|&(i, flow)| flow_candidate(i, flow))
        .filter_map(|(i, flow)| {
            let leaving = node_columns[flow.from.index()];
            let entering = node_columns[flow.to.index()];
            (leaving.is_some() || entering.is_some()).then(|| FlowRow {
                flow: i,
                edge: flow.edge,
                end: flow.end,
                leaving,
                entering,
                label: model.current_flows[i].group.name.clone(),
            })
        })
        .collect();

    let injection_rows: Vec<InjectionRow> = injections
        .iter()
        .enumerate()
        .filter_map(|(i, &(edge, node))| {
            let injection = &model.current_injections[i];
            let usable = model.graph[edge].in_service() && injection.group.is_usable(mode);
            let column = node_columns[node.index()].filter(|_| usable)?;
            Some(InjectionRow {
                injection: i,
                edge,
                column,
                direction: injection.direction,
                label: injection.group.name.clone(),
            })
        })
        .collect();

    debug!(
        mode = mode.as_str(),
        buses = partition.len(),
        observed_buses = columns.len(),
        voltage_rows = voltage_rows.len(),
        flow_rows = flow_rows.len(),
        injection_rows = injection_rows.len(),
        "observability classified"
    );

    Ok(IndexAssignment {
        mode,
        columns,
        node_columns,
        voltage_rows,
        flow_rows,
        injection_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use crate::topology::resolve_full;
    use lse_core::{BranchId, CalibrationSetting, NodeId};

    #[test]
    fn single_line_numbers_both_buses() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let partition = resolve_full(&model).unwrap();
        let assignment = classify(&mut model, &partition).unwrap();
        assert_eq!(assignment.columns().len(), 2);
        assert_eq!(assignment.voltage_rows().len(), 2);
        let row = &assignment.flow_rows()[0];
        assert_eq!((row.leaving, row.entering), (Some(0), Some(1)));
        assert_eq!(row.end, TerminalEnd::From);
    }

    #[test]
    fn metered_line_extends_island_by_one_hop() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let n2 = model.node_index(NodeId::new(2)).unwrap();
        model.graph[n2].voltage = None;
        let partition = resolve_full(&model).unwrap();
        let assignment = classify(&mut model, &partition).unwrap();
        assert_eq!(assignment.columns().len(), 2);
        assert_eq!(assignment.voltage_rows().len(), 1);
        assert_eq!(model.graph[n2].observability, Observability::Unobserved);
    }

    #[test]
    fn inactive_flow_is_not_included() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        model.current_flows[0].group.set_calibration(CalibrationSetting::Inactive);
        let partition = resolve_full(&model).unwrap();
        let assignment = classify(&mut model, &partition).unwrap();
        assert!(assignment.flow_rows().is_empty());
    }

    #[test]
    fn flow_on_breaker_is_a_kind_mismatch() {
        let mut model = test_utils::two_node_switch_model(true);
        model.add_current_flow(test_utils::flow_group(
            50,
            BranchId::new(1),
            NodeId::new(1),
            NodeId::new(2),
            0.5,
        ));
        let partition = resolve_full(&model).unwrap();
        let err = classify(&mut model, &partition).unwrap_err();
        assert!(matches!(err, LseError::BranchKindMismatch { .. }));
    }

    #[test]
    fn reversed_terminals_measure_the_to_end() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        let flow = &mut model.current_flows[0];
        std::mem::swap(&mut flow.from_node, &mut flow.to_node);
        let partition = resolve_full(&model).unwrap();
        let assignment = classify(&mut model, &partition).unwrap();
        let row = &assignment.flow_rows()[0];
        assert_eq!(row.end, TerminalEnd::To);
        assert_eq!((row.leaving, row.entering), (Some(1), Some(0)));
    }

    #[test]
    fn unknown_terminal_node_is_reported() {
        let mut model = test_utils::single_line_model(PhaseMode::PositiveSequence);
        model.current_flows[0].to_node = NodeId::new(77);
        let partition = resolve_full(&model).unwrap();
        let err = classify(&mut model, &partition).unwrap_err();
        assert!(matches!(err, LseError::UnknownNode(id) if id == NodeId::new(77)));
    }

    #[test]
    fn failed_classification_leaves_observability_untouched() {
        let mut model = test_utils::substation_model(PhaseMode::PositiveSequence);
        model.current_injections[0].shunt = BranchId::new(999);
        let partition = resolve_full(&model).unwrap();
        let err = classify(&mut model, &partition).unwrap_err();
        assert!(matches!(err, LseError::UnknownBranch(_)));
        assert!(model
            .graph
            .node_weights()
            .all(|n| n.observability == Observability::Unobserved));
    }

    #[test]
    fn three_phase_labels_expand_per_phase() {
        let mut model = test_utils::single_line_model(PhaseMode::ThreePhase);
        let partition = resolve_full(&model).unwrap();
        let assignment = classify(&mut model, &partition).unwrap();
        assert_eq!(assignment.state_dimension(), 6);
        assert_eq!(assignment.column_labels()[1], "N1.B");
    }
}
