//! Switching topology and observability.
//!
//! - [`resolver`]: partition of nodes into observed buses, cached across cycles
//! - [`observability`]: node classification and the cycle's [`IndexAssignment`]

pub mod observability;
pub mod resolver;

pub use observability::{
    classify, BusColumn, FlowRow, IndexAssignment, InjectionRow, VoltageRow,
};
pub use resolver::{resolve_full, ObservedBus, RebuildKind, TopologyPartition, TopologyResolver};
