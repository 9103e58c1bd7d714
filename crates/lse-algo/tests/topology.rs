use std::collections::{HashSet, VecDeque};

use lse_algo::{
    classify, resolve_full, test_utils, RebuildKind, TopologyPartition, TopologyResolver,
};
use lse_core::{
    Branch, BranchId, Kilovolts, NetworkModel, Node, NodeId, NodeIndex, Observability, PhaseMode,
    SwitchingDevice, TransmissionLine,
};
use petgraph::visit::EdgeRef;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random substation-style network: every node has one line, plus a
/// random set of switching devices in random states.
fn random_network(rng: &mut StdRng, nodes: usize, switches: usize) -> NetworkModel {
    let mut model = NetworkModel::new(PhaseMode::PositiveSequence);
    let idx: Vec<NodeIndex> = (0..nodes)
        .map(|i| model.add_node(Node::new(NodeId::new(i + 1), format!("N{i}"), Kilovolts(138.0))))
        .collect();
    for i in 0..nodes {
        let j = (i + 1) % nodes;
        let line = TransmissionLine::new(BranchId::new(1000 + i), format!("L{i}"), 0.01, 0.1);
        model.add_branch(idx[i], idx[j], Branch::Line(line));
    }
    for s in 0..switches {
        let a = rng.gen_range(0..nodes);
        let b = rng.gen_range(0..nodes);
        let mut device = SwitchingDevice::breaker(BranchId::new(s + 1), format!("CB{s}"));
        device.closed = rng.gen_bool(0.5);
        model.add_branch(idx[a], idx[b], Branch::Switch(device));
    }
    model
}

/// Nodes reachable from `start` over closed switching devices.
fn reachable(model: &NetworkModel, start: NodeIndex) -> HashSet<NodeIndex> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        for edge in model.graph.edges(node) {
            if matches!(edge.weight(), Branch::Switch(d) if d.closed) {
                let other = if edge.source() == node { edge.target() } else { edge.source() };
                queue.push_back(other);
            }
        }
    }
    seen
}

fn assert_partition_matches_connectivity(model: &NetworkModel, partition: &TopologyPartition) {
    let mut count = vec![0usize; model.graph.node_count()];
    for bus in partition.buses() {
        for node in &bus.nodes {
            count[node.index()] += 1;
        }
    }
    assert!(count.iter().all(|&c| c == 1), "every node in exactly one bus");

    for a in model.graph.node_indices() {
        let component = reachable(model, a);
        for b in model.graph.node_indices() {
            assert_eq!(
                partition.same_bus(a, b),
                component.contains(&b),
                "nodes {} and {}",
                a.index(),
                b.index()
            );
        }
    }
}

#[test]
fn partition_equals_closed_switch_connectivity() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..20 {
        let model = random_network(&mut rng, 12, 10);
        let partition = resolve_full(&model).unwrap();
        assert_partition_matches_connectivity(&model, &partition);
    }
}

#[test]
fn resolution_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(11);
    let model = random_network(&mut rng, 15, 12);
    let first = resolve_full(&model).unwrap();
    let second = resolve_full(&model).unwrap();
    assert_eq!(first, second);

    let mut resolver = TopologyResolver::new();
    let cached = resolver.resolve(&model).unwrap().clone();
    let reused = resolver.resolve(&model).unwrap().clone();
    assert_eq!(resolver.last_rebuild(), RebuildKind::Reused);
    assert_eq!(cached, reused);
    assert_eq!(cached, first);
}

#[test]
fn incremental_rebuild_matches_full_rebuild() {
    let mut rng = StdRng::seed_from_u64(23);
    let mut model = random_network(&mut rng, 16, 14);
    let mut resolver = TopologyResolver::new();
    resolver.resolve(&model).unwrap();

    for _ in 0..30 {
        let toggles = rng.gen_range(1..=3);
        for _ in 0..toggles {
            let id = BranchId::new(rng.gen_range(1..=14));
            let edge = model.branch_index(id).unwrap();
            let closed = matches!(&model.graph[edge], Branch::Switch(d) if d.closed);
            model.set_switch_state(id, !closed).unwrap();
        }
        let incremental = resolver.resolve(&model).unwrap().clone();
        assert_eq!(incremental, resolve_full(&model).unwrap());
        assert_partition_matches_connectivity(&model, &incremental);
    }
}

#[test]
fn adding_a_branch_forces_full_rebuild() {
    let mut model = test_utils::two_node_switch_model(true);
    let mut resolver = TopologyResolver::new();
    resolver.resolve(&model).unwrap();

    let n3 = model.add_node(Node::new(NodeId::new(3), "N3", Kilovolts(230.0)));
    let n2 = model.node_index(NodeId::new(2)).unwrap();
    model.add_branch(n2, n3, Branch::Switch(SwitchingDevice::switch(BranchId::new(2), "DS2")));
    let partition = resolver.resolve(&model).unwrap();
    assert_eq!(partition.len(), 1);
    assert_eq!(resolver.last_rebuild(), RebuildKind::Full);
}

#[test]
fn two_node_switch_scenario() {
    let mut model = test_utils::two_node_switch_model(true);
    let n1 = model.node_index(NodeId::new(1)).unwrap();
    let n2 = model.node_index(NodeId::new(2)).unwrap();
    let mut resolver = TopologyResolver::new();

    let partition = resolver.resolve(&model).unwrap();
    assert_eq!(partition.len(), 1);
    assert_eq!(partition.buses()[0].nodes, vec![n1, n2]);
    classify(&mut model, partition).unwrap();
    assert_eq!(model.graph[n1].observability, Observability::DirectlyObserved);
    assert_eq!(model.graph[n2].observability, Observability::IndirectlyObserved);

    model.set_switch_state(BranchId::new(1), false).unwrap();
    let partition = resolver.resolve(&model).unwrap();
    assert_eq!(partition.len(), 2);
    assert!(resolver.topology_changed());
    let partition = resolver.partition().unwrap();
    classify(&mut model, partition).unwrap();
    assert_eq!(model.graph[n1].observability, Observability::DirectlyObserved);
    assert_eq!(model.graph[n2].observability, Observability::Unobserved);
}

#[test]
fn split_node_with_own_measurement_stays_observed() {
    let mut model = test_utils::two_node_switch_model(false);
    let n2 = model.node_index(NodeId::new(2)).unwrap();
    let v2 = test_utils::group(2, "V2", num_complex::Complex64::new(1.0, 0.0));
    model.graph[n2].voltage = Some(v2);
    let partition = resolve_full(&model).unwrap();
    let assignment = classify(&mut model, &partition).unwrap();
    assert_eq!(model.graph[n2].observability, Observability::DirectlyObserved);
    assert_eq!(assignment.columns().len(), 2);
}

#[test]
fn substation_buses_follow_first_member_order() {
    let model = test_utils::substation_model(PhaseMode::PositiveSequence);
    let partition = resolve_full(&model).unwrap();
    let sizes: Vec<usize> = partition.buses().iter().map(|b| b.nodes.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    for (i, bus) in partition.buses().iter().enumerate() {
        assert_eq!(bus.index, i);
        assert!(bus.nodes.windows(2).all(|w| w[0] < w[1]));
    }
}
