//! Small hand-built networks shared by unit and integration tests.
//!
//! Measurement values are generated from known bus voltages with the
//! positive-sequence branch model, so a positive-sequence estimate over any
//! of these fixtures reproduces the voltages with zero residual.

use lse_core::{
    Branch, BranchId, CurrentFlowPhasorGroup, CurrentInjectionPhasorGroup, InjectionDirection,
    Kilovolts, NetworkModel, Node, NodeId, PhaseMode, Phasor, PhasorGroup, PhasorGroupId, Radians,
    ShuntCompensator, SwitchingDevice, TransmissionLine, Transformer,
};
use num_complex::Complex64;

pub const VARIANCE: f64 = 1e-4;

fn phasor(value: Complex64) -> Phasor {
    Phasor::new(value.norm(), Radians(value.arg())).with_variance(VARIANCE)
}

/// Balanced three-phase group whose phase A (and positive sequence) is `value`.
pub fn group(id: usize, name: &str, value: Complex64) -> PhasorGroup {
    PhasorGroup::balanced(PhasorGroupId::new(id), name, phasor(value))
}

pub fn flow_group(
    id: usize,
    branch: BranchId,
    from: NodeId,
    to: NodeId,
    magnitude: f64,
) -> CurrentFlowPhasorGroup {
    CurrentFlowPhasorGroup {
        group: group(id, &format!("I{id}"), Complex64::new(magnitude, 0.0)),
        branch,
        from_node: from,
        to_node: to,
    }
}

fn node(id: usize, name: &str) -> Node {
    Node::new(NodeId::new(id), name, Kilovolts(230.0))
}

/// Bus voltages used by [`single_line_model`].
pub fn single_line_voltages() -> (Complex64, Complex64) {
    (Complex64::from_polar(1.0, 0.0), Complex64::from_polar(0.98, -0.05))
}

/// Current at the from end of a pi-model line.
pub fn line_current(line: &TransmissionLine, from: Complex64, to: Complex64) -> Complex64 {
    let y = line.impedance.as_complex().inv();
    y * (from - to) + Complex64::new(0.0, line.charging_susceptance / 2.0) * from
}

/// N1 and N2 joined by breaker `Branch#1`; only N1 carries a voltage group.
pub fn two_node_switch_model(closed: bool) -> NetworkModel {
    let mut model = NetworkModel::new(PhaseMode::PositiveSequence);
    let n1 = model.add_node(node(1, "N1").with_voltage(group(1, "V1", Complex64::new(1.0, 0.0))));
    let n2 = model.add_node(node(2, "N2"));
    let mut breaker = SwitchingDevice::breaker(BranchId::new(1), "CB1");
    breaker.closed = closed;
    model.add_branch(n1, n2, Branch::Switch(breaker));
    model
}

/// N1 and N2 joined by line `Branch#10`, both metered, with one current flow at N1.
pub fn single_line_model(mode: PhaseMode) -> NetworkModel {
    let (v1, v2) = single_line_voltages();
    let mut model = NetworkModel::new(mode);
    let n1 = model.add_node(node(1, "N1").with_voltage(group(1, "V1", v1)));
    let n2 = model.add_node(node(2, "N2").with_voltage(group(2, "V2", v2)));

    let line = TransmissionLine::new(BranchId::new(10), "L1-2", 0.01, 0.1).with_charging(0.02);
    let current = line_current(&line, v1, v2);
    model.add_branch(n1, n2, Branch::Line(line));
    model.add_current_flow(CurrentFlowPhasorGroup {
        group: group(100, "I1-2", current),
        branch: BranchId::new(10),
        from_node: NodeId::new(1),
        to_node: NodeId::new(2),
    });
    model
}

/// Bus voltages of [`substation_model`]: substations A, B and the
/// transformer secondary C.
pub fn substation_voltages() -> [Complex64; 3] {
    [
        Complex64::from_polar(1.02, 0.0),
        Complex64::from_polar(1.00, -0.04),
        Complex64::from_polar(0.97, -0.09),
    ]
}

pub const TRANSFORMER_TAP: f64 = 1.025;
pub const SHUNT_SUSCEPTANCE: f64 = 0.15;

/// Two switched substations, a line, a transformer and a metered capacitor.
///
/// ```text
///  A1 ─CB1─ A2 ──L10── B1 ─DS2─ B2 ──T20── C1
///  │
///  S30 (capacitor, injection metered)
/// ```
///
/// Voltage groups on A1, B1 and C1; current flows on L10 at A2 and on T20
/// at B2.
pub fn substation_model(mode: PhaseMode) -> NetworkModel {
    let [va, vb, vc] = substation_voltages();
    let mut model = NetworkModel::new(mode);

    let a1 = model.add_node(node(1, "A1").with_voltage(group(1, "VA1", va)));
    let a2 = model.add_node(node(2, "A2"));
    let b1 = model.add_node(node(3, "B1").with_voltage(group(3, "VB1", vb)));
    let b2 = model.add_node(node(4, "B2"));
    let c1 = model.add_node(
        Node::new(NodeId::new(5), "C1", Kilovolts(115.0)).with_voltage(group(5, "VC1", vc)),
    );

    model.add_branch(a1, a2, Branch::Switch(SwitchingDevice::breaker(BranchId::new(1), "CB1")));
    model.add_branch(b1, b2, Branch::Switch(SwitchingDevice::switch(BranchId::new(2), "DS2")));

    let line = TransmissionLine::new(BranchId::new(10), "A-B", 0.005, 0.05).with_charging(0.04);
    let line_i = line_current(&line, va, vb);
    model.add_branch(a2, b1, Branch::Line(line));

    let tx = Transformer::new(BranchId::new(20), "T-BC", 0.0, 0.08)
        .with_turns_ratio(TRANSFORMER_TAP, Radians::ZERO);
    let t = tx.turns_ratio;
    let y = tx.impedance.as_complex().inv();
    let tx_i = y * (vb / t.norm_sqr() - vc / t.conj());
    model.add_branch(b2, c1, Branch::Transformer(tx));

    model.add_shunt(a1, ShuntCompensator::new(BranchId::new(30), "Cap-A", SHUNT_SUSCEPTANCE));
    let shunt_i = Complex64::new(0.0, SHUNT_SUSCEPTANCE) * va;

    model.add_current_flow(CurrentFlowPhasorGroup {
        group: group(102, "I-A2-B1", line_i),
        branch: BranchId::new(10),
        from_node: NodeId::new(2),
        to_node: NodeId::new(3),
    });
    model.add_current_flow(CurrentFlowPhasorGroup {
        group: group(104, "I-B2-C1", tx_i),
        branch: BranchId::new(20),
        from_node: NodeId::new(4),
        to_node: NodeId::new(5),
    });
    model.add_current_injection(CurrentInjectionPhasorGroup {
        group: group(130, "I-Cap-A", shunt_i),
        shunt: BranchId::new(30),
        node: NodeId::new(1),
        direction: InjectionDirection::IntoShunt,
    });
    model
}
