//! Packing netlist: cells, pins and nets plus per-cell packing state.
//!
//! [`PackDesign`] is the central data structure of a packing run. Besides the
//! connectivity it owns the committed clusters and the carry chains, so every
//! cross reference (cell to cluster, cell to chain) is a typed ID into one of
//! its arenas.

use crate::carry::CarryChains;
use crate::cluster::Cluster;
use crate::ids::{CarryChainId, CarryGroupId, CellId, ClusterId, NetId, PinId};
use aapack_arch::{BelId, LibCellId, PinDirection};
use aapack_common::{Arena, Ident};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Property holding the logical RAM a LUT-RAM cell belongs to.
pub const RAM_GROUP_PROPERTY: &str = "$RAMGROUP";

/// Property listing the LUT columns a LUT-RAM cell may occupy (e.g. `"ABC"`).
pub const RAM_POSITION_PROPERTY: &str = "$RAMPOSITION";

/// What drives a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetKind {
    /// Ordinary logic signal.
    Signal,
    /// Global clock.
    Clock,
    /// Constant one.
    Vcc,
    /// Constant zero.
    Gnd,
}

/// A net connecting a source pin to its sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackNet {
    /// Net ID.
    pub id: NetId,
    /// Net name.
    pub name: String,
    /// Signal kind.
    pub kind: NetKind,
    /// All pins on the net, source included.
    pub pins: Vec<PinId>,
    /// The driving pin, if connected.
    pub source: Option<PinId>,
}

impl PackNet {
    /// Returns `true` for clock nets.
    pub fn is_clock(&self) -> bool {
        self.kind == NetKind::Clock
    }

    /// Returns `true` for VCC and GND nets.
    pub fn is_static(&self) -> bool {
        matches!(self.kind, NetKind::Vcc | NetKind::Gnd)
    }

    /// Number of pins on the net.
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Pins other than the source.
    pub fn sinks(&self) -> impl Iterator<Item = PinId> + '_ {
        self.pins
            .iter()
            .copied()
            .filter(move |&p| Some(p) != self.source)
    }
}

/// A pin on a cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackPin {
    /// Pin ID.
    pub id: PinId,
    /// Library pin name.
    pub name: Ident,
    /// Input or output.
    pub direction: PinDirection,
    /// Owning cell.
    pub cell: CellId,
    /// Connected net.
    pub net: Option<NetId>,
}

impl PackPin {
    /// Returns `true` for input pins.
    pub fn is_input(&self) -> bool {
        self.direction == PinDirection::Input
    }
}

/// A dedicated carry link between a pin on this cell and a pin on a
/// neighbouring chain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryConnection {
    /// The pin on this cell.
    pub cluster_pin: PinId,
    /// The pin on the other cell.
    pub end_pin: PinId,
    /// The other cell.
    pub end_cell: CellId,
}

/// A netlist primitive and its packing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackCell {
    /// Cell ID.
    pub id: CellId,
    /// Instance name.
    pub name: String,
    /// Library type.
    pub lib: LibCellId,
    /// Pins, in library order.
    pub pins: Vec<PinId>,
    /// Instance properties (`$RAMGROUP`, `$RAMPOSITION`, ...).
    pub properties: BTreeMap<String, String>,
    /// Site-wide configuration values this cell imposes on its site.
    pub site_properties: BTreeMap<String, String>,
    /// `false` for cells the packer leaves alone.
    pub packable: bool,
    /// `false` while the cell is tentatively or permanently in a cluster, or
    /// has been ruled out for the current cluster.
    pub valid: bool,
    /// Owning cluster.
    pub cluster: Option<ClusterId>,
    /// Anchor BEL in the owning cluster's template.
    pub location: Option<BelId>,
    /// Carry chain the cell belongs to.
    pub carry_chain: Option<CarryChainId>,
    /// Carry-chain group assigned at commit.
    pub carry_group: Option<CarryGroupId>,
    /// Position of the cell's cluster within its carry group.
    pub carry_index: Option<u32>,
    /// Carry links driven by this cell.
    pub sink_carry: Vec<CarryConnection>,
    /// Carry links feeding this cell.
    pub source_carry: Vec<CarryConnection>,
}

impl PackCell {
    /// Returns the named instance property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All carry links of the cell, sinks first.
    pub fn carry_connections(&self) -> impl Iterator<Item = &CarryConnection> {
        self.sink_carry.iter().chain(self.source_carry.iter())
    }
}

/// The netlist being packed, with committed clusters and carry chains.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PackDesign {
    /// Design name.
    pub name: String,
    cells: Arena<CellId, PackCell>,
    pins: Arena<PinId, PackPin>,
    nets: Arena<NetId, PackNet>,
    clusters: Arena<ClusterId, Cluster>,
    /// Carry chains and groups.
    pub carry: CarryChains,
    #[serde(skip)]
    cell_by_name: HashMap<String, CellId>,
    #[serde(skip)]
    net_by_name: HashMap<String, NetId>,
}

impl PackDesign {
    /// Creates an empty design.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a packable cell with no pins.
    pub fn add_cell(&mut self, name: impl Into<String>, lib: LibCellId) -> CellId {
        let id = self.cells.next_id();
        let name = name.into();
        self.cell_by_name.insert(name.clone(), id);
        self.cells.alloc(PackCell {
            id,
            name,
            lib,
            pins: Vec::new(),
            properties: BTreeMap::new(),
            site_properties: BTreeMap::new(),
            packable: true,
            valid: true,
            cluster: None,
            location: None,
            carry_chain: None,
            carry_group: None,
            carry_index: None,
            sink_carry: Vec::new(),
            source_carry: Vec::new(),
        })
    }

    /// Adds an unconnected pin to `cell`.
    pub fn add_pin(&mut self, cell: CellId, name: Ident, direction: PinDirection) -> PinId {
        let id = self.pins.next_id();
        self.pins.alloc(PackPin {
            id,
            name,
            direction,
            cell,
            net: None,
        });
        self.cells[cell].pins.push(id);
        id
    }

    /// Adds a net with no pins.
    pub fn add_net(&mut self, name: impl Into<String>, kind: NetKind) -> NetId {
        let id = self.nets.next_id();
        let name = name.into();
        self.net_by_name.insert(name.clone(), id);
        self.nets.alloc(PackNet {
            id,
            name,
            kind,
            pins: Vec::new(),
            source: None,
        })
    }

    /// Connects `pin` to `net`. An output pin becomes the net's source.
    pub fn connect(&mut self, pin: PinId, net: NetId) {
        self.pins[pin].net = Some(net);
        let is_output = self.pins[pin].direction == PinDirection::Output;
        let net = &mut self.nets[net];
        net.pins.push(pin);
        if is_output {
            net.source = Some(pin);
        }
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &PackCell {
        &self.cells[id]
    }

    /// Returns a mutable reference to the cell with the given ID.
    pub fn cell_mut(&mut self, id: CellId) -> &mut PackCell {
        &mut self.cells[id]
    }

    /// Returns the pin with the given ID.
    pub fn pin(&self, id: PinId) -> &PackPin {
        &self.pins[id]
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &PackNet {
        &self.nets[id]
    }

    /// Iterates over all cells.
    pub fn cells(&self) -> impl Iterator<Item = &PackCell> {
        self.cells.values()
    }

    /// Iterates over all nets.
    pub fn nets(&self) -> impl Iterator<Item = &PackNet> {
        self.nets.values()
    }

    /// Number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Looks up a cell by instance name.
    pub fn find_cell(&self, name: &str) -> Option<CellId> {
        self.cell_by_name.get(name).copied()
    }

    /// Looks up a net by name.
    pub fn find_net(&self, name: &str) -> Option<NetId> {
        self.net_by_name.get(name).copied()
    }

    /// Returns the pin of `cell` with the given library name.
    pub fn pin_named(&self, cell: CellId, name: Ident) -> Option<PinId> {
        self.cells[cell]
            .pins
            .iter()
            .copied()
            .find(|&p| self.pins[p].name == name)
    }

    /// Net on the named pin of `cell`, if connected.
    pub fn net_on(&self, cell: CellId, pin_name: Ident) -> Option<NetId> {
        self.pin(self.pin_named(cell, pin_name)?).net
    }

    /// Cell driving `net`, if any.
    pub fn source_cell(&self, net: NetId) -> Option<CellId> {
        self.nets[net].source.map(|p| self.pins[p].cell)
    }

    /// Stores a committed cluster, keeping the ID it was built with.
    ///
    /// # Panics
    ///
    /// Panics if the cluster's ID is not the next free cluster ID.
    pub fn add_cluster(&mut self, cluster: Cluster) -> ClusterId {
        assert_eq!(
            cluster.id,
            self.clusters.next_id(),
            "cluster committed out of order"
        );
        self.clusters.alloc(cluster)
    }

    /// ID the next committed cluster will receive.
    pub fn next_cluster_id(&self) -> ClusterId {
        self.clusters.next_id()
    }

    /// Returns a committed cluster.
    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id]
    }

    /// Returns a mutable reference to a committed cluster.
    pub fn cluster_mut(&mut self, id: ClusterId) -> &mut Cluster {
        &mut self.clusters[id]
    }

    /// Iterates over committed clusters.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Number of committed clusters.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Drops every committed cluster. Cell bindings are left to the caller.
    pub fn clear_clusters(&mut self) {
        self.clusters = Arena::new();
    }

    /// Puts `cell` into carry group `group` at `index`.
    pub fn assign_carry_group(&mut self, cell: CellId, group: CarryGroupId, index: u32) {
        let c = &mut self.cells[cell];
        c.carry_group = Some(group);
        c.carry_index = Some(index);
        self.carry.group_mut(group).members.push(cell);
    }

    /// Moves every member of `other` into `target`, translating indices
    /// through `index_map`. Indices missing from the map get fresh indices of
    /// `target`, shared by all members that had the same old index.
    pub fn absorb_carry_group(
        &mut self,
        target: CarryGroupId,
        other: CarryGroupId,
        index_map: &HashMap<u32, u32>,
    ) {
        if target == other {
            return;
        }
        let members = std::mem::take(&mut self.carry.group_mut(other).members);
        let mut remap = index_map.clone();
        for cell in members {
            let old = self.cells[cell].carry_index.unwrap_or(0);
            let new = *remap
                .entry(old)
                .or_insert_with(|| self.carry.group_mut(target).unique_index());
            self.assign_carry_group(cell, target, new);
        }
    }

    /// Rebuilds the name lookup indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.cell_by_name = self
            .cells
            .iter()
            .map(|(id, c)| (c.name.clone(), id))
            .collect();
        self.net_by_name = self
            .nets
            .iter()
            .map(|(id, n)| (n.name.clone(), id))
            .collect();
    }
}
