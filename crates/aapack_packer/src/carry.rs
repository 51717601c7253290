//! Carry chains and carry-chain groups.
//!
//! A [`CarryChain`] is the set of cells linked through dedicated carry pins.
//! Its `packed_cells` counter is changed only by the carry-chain validity rule
//! (paired increments and decrements on its own checkpoint stack) and by the
//! rule factory when a cluster is committed. A [`CarryChainGroup`] collects
//! the cells of chains that ended up in neighbouring clusters; each cluster of
//! the group gets its own index.

use crate::design::{CarryConnection, PackDesign};
use crate::ids::{CarryChainId, CarryGroupId, CellId};
use aapack_arch::CellLibrary;
use aapack_common::Arena;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cells connected through carry links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarryChain {
    /// Member cells in ID order.
    pub cells: Vec<CellId>,
    /// Number of members counted as packed.
    pub packed_cells: u32,
}

impl CarryChain {
    /// Returns `true` once some but not all members are packed.
    pub fn is_partially_placed(&self) -> bool {
        self.packed_cells > 0 && (self.packed_cells as usize) < self.cells.len()
    }
}

/// Cells of carry chains spanning several clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarryChainGroup {
    /// Member cells.
    pub members: Vec<CellId>,
    next_index: u32,
}

impl CarryChainGroup {
    /// Hands out an index not used before in this group.
    pub fn unique_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// Arena storage for chains and groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarryChains {
    chains: Arena<CarryChainId, CarryChain>,
    groups: Arena<CarryGroupId, CarryChainGroup>,
}

impl CarryChains {
    /// Adds a chain with no packed cells.
    pub fn add_chain(&mut self, cells: Vec<CellId>) -> CarryChainId {
        self.chains.alloc(CarryChain {
            cells,
            packed_cells: 0,
        })
    }

    /// Returns a chain.
    pub fn chain(&self, id: CarryChainId) -> &CarryChain {
        &self.chains[id]
    }

    /// Iterates over all chains.
    pub fn chains(&self) -> impl Iterator<Item = (CarryChainId, &CarryChain)> {
        self.chains.iter()
    }

    /// Number of chains.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Counts one more member of `id` as packed.
    pub fn increment_packed(&mut self, id: CarryChainId) {
        self.chains[id].packed_cells += 1;
    }

    /// Undoes one [`increment_packed`](Self::increment_packed).
    ///
    /// # Panics
    ///
    /// Panics if the counter is already zero.
    pub fn decrement_packed(&mut self, id: CarryChainId) {
        let chain = &mut self.chains[id];
        chain.packed_cells = chain
            .packed_cells
            .checked_sub(1)
            .unwrap_or_else(|| panic!("carry chain {id} packed count underflow"));
    }

    /// Creates an empty group.
    pub fn new_group(&mut self) -> CarryGroupId {
        self.groups.alloc(CarryChainGroup::default())
    }

    /// Returns a group.
    pub fn group(&self, id: CarryGroupId) -> &CarryChainGroup {
        &self.groups[id]
    }

    /// Returns a mutable reference to a group.
    pub fn group_mut(&mut self, id: CarryGroupId) -> &mut CarryChainGroup {
        &mut self.groups[id]
    }
}

/// Discovers carry chains from the library's carry pins.
///
/// Every net driven from a carry-out pin into a carry-in pin of another cell
/// becomes a [`CarryConnection`] on both cells; linked cells are merged with
/// union-find and each resulting component becomes one [`CarryChain`].
/// Returns the number of chains created.
///
/// Earlier results, including carry groups, are discarded first, so running
/// discovery again yields the same chains.
pub fn find_carry_chains(design: &mut PackDesign, library: &CellLibrary) -> usize {
    design.carry = CarryChains::default();
    let ids: Vec<CellId> = design.cells().map(|c| c.id).collect();
    for id in ids {
        let cell = design.cell_mut(id);
        cell.carry_chain = None;
        cell.carry_group = None;
        cell.carry_index = None;
        cell.sink_carry.clear();
        cell.source_carry.clear();
    }

    let mut links = Vec::new();
    for net in design.nets() {
        let Some(source) = net.source else { continue };
        let source_pin = design.pin(source);
        let source_lib = library.cell(design.cell(source_pin.cell).lib);
        if !source_lib.carry_out_pins.contains(&source_pin.name) {
            continue;
        }
        for sink in net.sinks() {
            let sink_pin = design.pin(sink);
            if sink_pin.cell == source_pin.cell {
                continue;
            }
            let sink_lib = library.cell(design.cell(sink_pin.cell).lib);
            if sink_lib.carry_in_pins.contains(&sink_pin.name) {
                links.push((source, sink_pin.cell, sink, source_pin.cell));
            }
        }
    }

    let mut components = UnionFind::<usize>::new(design.cell_count());
    for &(source, sink_cell, sink, source_cell) in &links {
        design.cell_mut(source_cell).sink_carry.push(CarryConnection {
            cluster_pin: source,
            end_pin: sink,
            end_cell: sink_cell,
        });
        design.cell_mut(sink_cell).source_carry.push(CarryConnection {
            cluster_pin: sink,
            end_pin: source,
            end_cell: source_cell,
        });
        components.union(source_cell.as_raw() as usize, sink_cell.as_raw() as usize);
    }

    let mut chains: BTreeMap<usize, Vec<CellId>> = BTreeMap::new();
    for &(_, sink_cell, _, source_cell) in &links {
        for cell in [source_cell, sink_cell] {
            let root = components.find(cell.as_raw() as usize);
            let members = chains.entry(root).or_default();
            if !members.contains(&cell) {
                members.push(cell);
            }
        }
    }

    let count = chains.len();
    for (_, mut cells) in chains {
        cells.sort();
        let id = design.carry.add_chain(cells.clone());
        for cell in cells {
            design.cell_mut(cell).carry_chain = Some(id);
        }
    }
    count
}
