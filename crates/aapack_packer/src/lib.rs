//! The AAPack clustering engine.
//!
//! Packing groups the primitive cells of a netlist into clusters that each
//! fit one [`ClusterTemplate`](aapack_arch::ClusterTemplate). Clusters are
//! grown greedily from seed cells: a [`CellSelector`] ranks candidates by how
//! many nets they absorb, a [`BelSelector`] ranks the BELs a candidate could
//! take, and a list of [`PackRule`]s accepts, rejects or conditionally
//! accepts each placement. The [`Packer`] drives the search with
//! checkpointed state so any decision can be undone.

#![warn(missing_docs)]

pub mod bel_selector;
pub mod carry;
pub mod cell_selector;
pub mod cluster;
pub mod cost;
pub mod design;
pub mod forced;
pub mod ids;
pub mod packer;
pub mod report;
pub mod rules;
pub mod seed;
pub mod transactional;

#[cfg(test)]
mod fixtures;

pub use bel_selector::{BelSelector, ShortestRouteBelSelector};
pub use carry::{find_carry_chains, CarryChain, CarryChainGroup, CarryChains};
pub use cell_selector::{CellSelector, ExposedNetsCellSelector, GainWeights};
pub use cluster::{Cluster, ClusterView};
pub use cost::ClusterCostCalculator;
pub use design::{NetKind, PackCell, PackDesign, PackNet, PackPin};
pub use ids::{CarryChainId, CarryGroupId, CellId, ClusterId, NetId, PinId};
pub use packer::Packer;
pub use report::PackReport;
pub use rules::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
pub use seed::{HighestInputSeedSelector, SeedSelector};
pub use transactional::TransactionalMap;
