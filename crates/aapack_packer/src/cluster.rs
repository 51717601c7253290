//! Candidate and committed clusters.

use crate::design::PackDesign;
use crate::ids::{CarryGroupId, CellId, ClusterId};
use aapack_arch::{BelId, CellLibrary, ClusterTemplate, TemplateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A group of cells bound to one cluster template.
///
/// `placement` maps every occupied BEL (anchor and extra BELs) to its cell;
/// `locations` maps each cell to its anchor. The placement map is the only
/// record of BEL occupancy and is mutated by the packer alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster ID.
    pub id: ClusterId,
    /// Name, taken from the seed cell.
    pub name: String,
    /// Template the cluster is built on.
    pub template: TemplateId,
    /// Cost assigned when the cluster was scored.
    pub cost: f64,
    /// Carry group of the chain cells in this cluster.
    pub carry_group: Option<CarryGroupId>,
    /// Index of this cluster within its carry group.
    pub carry_index: Option<u32>,
    placement: BTreeMap<BelId, CellId>,
    locations: BTreeMap<CellId, BelId>,
}

impl Cluster {
    /// Creates an empty cluster.
    pub fn new(id: ClusterId, name: impl Into<String>, template: TemplateId) -> Self {
        Self {
            id,
            name: name.into(),
            template,
            cost: 0.0,
            carry_group: None,
            carry_index: None,
            placement: BTreeMap::new(),
            locations: BTreeMap::new(),
        }
    }

    /// Places `cell` with its anchor first in `bels`.
    ///
    /// # Panics
    ///
    /// Panics if `bels` is empty or any BEL is already occupied.
    pub fn add_cell(&mut self, cell: CellId, bels: &[BelId]) {
        assert!(
            bels.iter().all(|b| !self.placement.contains_key(b)),
            "BEL already occupied"
        );
        self.locations.insert(cell, bels[0]);
        for &bel in bels {
            self.placement.insert(bel, cell);
        }
    }

    /// Removes `cell` and frees all of its BELs.
    pub fn remove_cell(&mut self, cell: CellId) {
        if self.locations.remove(&cell).is_some() {
            self.placement.retain(|_, c| *c != cell);
        }
    }

    /// Returns `true` if some cell occupies `bel`.
    pub fn is_bel_occupied(&self, bel: BelId) -> bool {
        self.placement.contains_key(&bel)
    }

    /// Cell occupying `bel`.
    pub fn cell_at_bel(&self, bel: BelId) -> Option<CellId> {
        self.placement.get(&bel).copied()
    }

    /// Anchor of `cell`, if it is in this cluster.
    pub fn location_of(&self, cell: CellId) -> Option<BelId> {
        self.locations.get(&cell).copied()
    }

    /// Returns `true` if `cell` is in this cluster.
    pub fn contains(&self, cell: CellId) -> bool {
        self.locations.contains_key(&cell)
    }

    /// Cells in ID order.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.locations.keys().copied()
    }

    /// `(anchor, cell)` pairs in cell order.
    pub fn anchors(&self) -> impl Iterator<Item = (BelId, CellId)> + '_ {
        self.locations.iter().map(|(&c, &b)| (b, c))
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.locations.len()
    }

    /// Number of occupied BELs.
    pub fn occupied_bel_count(&self) -> usize {
        self.placement.len()
    }

    /// Returns `true` when every BEL of `template` is occupied.
    pub fn is_full(&self, template: &ClusterTemplate) -> bool {
        self.placement.len() >= template.bel_count()
    }
}

/// Read-only view of a candidate cluster with the data needed to cost it.
#[derive(Clone, Copy)]
pub struct ClusterView<'a> {
    /// The netlist.
    pub design: &'a PackDesign,
    /// Library cell definitions.
    pub library: &'a CellLibrary,
    /// Template of `cluster`.
    pub template: &'a ClusterTemplate,
    /// The cluster under construction.
    pub cluster: &'a Cluster,
}
