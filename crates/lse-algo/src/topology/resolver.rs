//! Switching-topology resolution.
//!
//! Nodes joined by closed switching devices fuse into one observed bus. The
//! partition is the set of connected components of the subgraph made of
//! closed [`Branch::Switch`] edges; every other branch kind is ignored here.
//!
//! [`TopologyResolver`] caches the last switching snapshot. When devices
//! change between cycles only the buses touching a changed device are
//! re-unioned; the rest of the partition is carried over unchanged.

use lse_core::{Branch, LseError, LseResult, NetworkModel};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A maximal set of nodes joined by closed switching devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedBus {
    /// Position in [`TopologyPartition::buses`]
    pub index: usize,
    /// Member nodes, ascending by graph index
    pub nodes: Vec<NodeIndex>,
}

/// Partition of every node into exactly one observed bus.
///
/// Canonical form: members ascend by node index and buses are ordered by
/// their first member, so equal groupings compare equal regardless of how
/// they were computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyPartition {
    buses: Vec<ObservedBus>,
    node_to_bus: Vec<usize>,
}

impl TopologyPartition {
    fn from_groups(mut groups: Vec<Vec<NodeIndex>>, node_count: usize) -> Self {
        for group in groups.iter_mut() {
            group.sort_unstable();
        }
        groups.retain(|g| !g.is_empty());
        groups.sort_unstable_by_key(|g| g[0]);

        let mut node_to_bus = vec![usize::MAX; node_count];
        let buses = groups
            .into_iter()
            .enumerate()
            .map(|(index, nodes)| {
                for node in &nodes {
                    node_to_bus[node.index()] = index;
                }
                ObservedBus { index, nodes }
            })
            .collect();
        Self { buses, node_to_bus }
    }

    pub fn buses(&self) -> &[ObservedBus] {
        &self.buses
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    /// Bus containing `node`.
    pub fn bus_of(&self, node: NodeIndex) -> Option<usize> {
        self.node_to_bus
            .get(node.index())
            .copied()
            .filter(|&b| b != usize::MAX)
    }

    pub fn same_bus(&self, a: NodeIndex, b: NodeIndex) -> bool {
        match (self.bus_of(a), self.bus_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn check_complete(&self, model: &NetworkModel) -> LseResult<()> {
        for idx in model.graph.node_indices() {
            if self.bus_of(idx).is_none() {
                return Err(LseError::UnassignedNode(model.graph[idx].id));
            }
        }
        Ok(())
    }
}

fn is_closed_switch(branch: &Branch) -> bool {
    matches!(branch, Branch::Switch(device) if device.closed)
}

/// Every node must terminate at least one branch.
fn check_in_topology(model: &NetworkModel) -> LseResult<()> {
    for idx in model.graph.node_indices() {
        if model.graph.edges(idx).next().is_none() {
            return Err(LseError::NodeNotInTopology(model.graph[idx].id));
        }
    }
    Ok(())
}

/// Compute the partition from scratch.
pub fn resolve_full(model: &NetworkModel) -> LseResult<TopologyPartition> {
    check_in_topology(model)?;

    let node_count = model.graph.node_count();
    let mut uf = UnionFind::<usize>::new(node_count);
    for edge in model.graph.edge_references() {
        if is_closed_switch(edge.weight()) {
            uf.union(edge.source().index(), edge.target().index());
        }
    }

    let mut by_root: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
    for (node, root) in uf.into_labeling().into_iter().enumerate() {
        by_root.entry(root).or_default().push(NodeIndex::new(node));
    }

    let partition = TopologyPartition::from_groups(by_root.into_values().collect(), node_count);
    partition.check_complete(model)?;
    Ok(partition)
}

/// Re-union only the buses that contain an endpoint of a changed device.
///
/// An unchanged closed switch always joins two nodes of the same previous
/// bus, so unaffected buses cannot gain or lose members.
fn resolve_incremental(
    model: &NetworkModel,
    previous: &TopologyPartition,
    changed: &[EdgeIndex],
) -> LseResult<TopologyPartition> {
    let mut affected_buses = BTreeSet::new();
    for &edge in changed {
        if let Some((a, b)) = model.graph.edge_endpoints(edge) {
            affected_buses.extend(previous.bus_of(a));
            affected_buses.extend(previous.bus_of(b));
        }
    }

    let node_count = model.graph.node_count();
    let mut groups: Vec<Vec<NodeIndex>> = previous
        .buses
        .iter()
        .filter(|bus| !affected_buses.contains(&bus.index))
        .map(|bus| bus.nodes.clone())
        .collect();

    let affected: Vec<NodeIndex> = affected_buses
        .iter()
        .flat_map(|&b| previous.buses[b].nodes.iter().copied())
        .collect();

    let mut uf = UnionFind::<usize>::new(node_count);
    for &node in &affected {
        for edge in model.graph.edges(node) {
            if is_closed_switch(edge.weight()) {
                uf.union(edge.source().index(), edge.target().index());
            }
        }
    }

    let mut by_root: BTreeMap<usize, Vec<NodeIndex>> = BTreeMap::new();
    for node in affected {
        by_root.entry(uf.find_mut(node.index())).or_default().push(node);
    }
    groups.extend(by_root.into_values());

    let partition = TopologyPartition::from_groups(groups, node_count);
    partition.check_complete(model)?;
    Ok(partition)
}

/// How the last call to [`TopologyResolver::resolve`] produced its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildKind {
    /// No switching device changed
    Reused,
    /// Only buses touching `changed` devices were recomputed
    Incremental { changed: usize },
    /// First resolution, or the node/branch set itself changed
    Full,
}

#[derive(Debug)]
struct Snapshot {
    node_count: usize,
    edge_count: usize,
    switches: Vec<(EdgeIndex, bool)>,
    partition: TopologyPartition,
}

impl Snapshot {
    fn same_shape(&self, model: &NetworkModel, switches: &[(EdgeIndex, bool)]) -> bool {
        self.node_count == model.graph.node_count()
            && self.edge_count == model.graph.edge_count()
            && self.switches.len() == switches.len()
            && self
                .switches
                .iter()
                .zip(switches)
                .all(|((a, _), (b, _))| a == b)
    }

    fn changed_devices(&self, switches: &[(EdgeIndex, bool)]) -> Vec<EdgeIndex> {
        self.switches
            .iter()
            .zip(switches)
            .filter(|((_, old), (_, new))| old != new)
            .map(|(_, &(edge, _))| edge)
            .collect()
    }
}

/// Stateful resolver that reuses the previous partition across cycles.
#[derive(Debug)]
pub struct TopologyResolver {
    snapshot: Option<Snapshot>,
    last: RebuildKind,
}

impl Default for TopologyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyResolver {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            last: RebuildKind::Full,
        }
    }

    /// Partition for the model's current switching state.
    pub fn resolve(&mut self, model: &NetworkModel) -> LseResult<&TopologyPartition> {
        let switches = model.switch_states();

        let (kind, partition) = match self.snapshot.take() {
            Some(previous) if previous.same_shape(model, &switches) => {
                let changed = previous.changed_devices(&switches);
                if changed.is_empty() {
                    (RebuildKind::Reused, previous.partition)
                } else {
                    let partition = resolve_incremental(model, &previous.partition, &changed)?;
                    (
                        RebuildKind::Incremental {
                            changed: changed.len(),
                        },
                        partition,
                    )
                }
            }
            _ => (RebuildKind::Full, resolve_full(model)?),
        };

        match kind {
            RebuildKind::Reused => {}
            RebuildKind::Incremental { changed } => info!(
                changed,
                buses = partition.len(),
                "switching topology changed; incremental rebuild"
            ),
            RebuildKind::Full => debug!(
                nodes = model.graph.node_count(),
                buses = partition.len(),
                "full topology rebuild"
            ),
        }

        self.last = kind;
        let snapshot = self.snapshot.insert(Snapshot {
            node_count: model.graph.node_count(),
            edge_count: model.graph.edge_count(),
            switches,
            partition,
        });
        Ok(&snapshot.partition)
    }

    pub fn last_rebuild(&self) -> RebuildKind {
        self.last
    }

    /// Whether the last `resolve` produced a different switching state than the one before.
    pub fn topology_changed(&self) -> bool {
        self.last != RebuildKind::Reused
    }

    /// Partition from the last successful `resolve`.
    pub fn partition(&self) -> Option<&TopologyPartition> {
        self.snapshot.as_ref().map(|s| &s.partition)
    }

    /// Drop the cached snapshot; the next `resolve` rebuilds in full.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }
}
