//! Library cell types and how they map onto template BELs.

use crate::ids::{BelId, LibCellId};
use crate::template::ClusterTemplate;
use crate::types::{Bel, BelKind};
use aapack_common::{Arena, Ident};
use std::collections::HashMap;

/// A primitive cell type (`LUT6`, `CARRY4`, `FF_INIT`, ...).
#[derive(Debug, Clone)]
pub struct LibraryCell {
    /// ID within the library.
    pub id: LibCellId,
    /// Type name.
    pub name: String,
    /// BEL kinds the cell may be anchored on.
    pub anchors: Vec<BelKind>,
    /// Other BELs of the anchor's site the cell occupies as well.
    pub extra_bels: Vec<String>,
    /// Per-BEL-kind mapping from cell pin to BEL pins. BEL kinds without an
    /// entry map each cell pin onto the BEL pin of the same name.
    pub pin_map: HashMap<BelKind, HashMap<Ident, Vec<Ident>>>,
    /// `true` for VCC/GND drivers.
    pub constant_source: bool,
    /// Output pins that drive the next cell of a carry chain.
    pub carry_out_pins: Vec<Ident>,
    /// Input pins fed by the previous cell of a carry chain.
    pub carry_in_pins: Vec<Ident>,
}

impl LibraryCell {
    /// Creates a library cell anchored on the given BEL kinds.
    pub fn new(name: impl Into<String>, anchors: Vec<BelKind>) -> Self {
        Self {
            id: LibCellId::from_raw(0),
            name: name.into(),
            anchors,
            extra_bels: Vec::new(),
            pin_map: HashMap::new(),
            constant_source: false,
            carry_out_pins: Vec::new(),
            carry_in_pins: Vec::new(),
        }
    }

    /// Anchor BELs of `template` that accept this cell, in BEL order.
    pub fn possible_anchors(&self, template: &ClusterTemplate) -> Vec<BelId> {
        template
            .bels()
            .filter(|bel| self.anchors.contains(&bel.kind))
            .map(|bel| bel.id)
            .collect()
    }

    /// BELs occupied when anchored at `anchor`, anchor first.
    ///
    /// Returns `None` if the anchor's site lacks one of the extra BELs.
    pub fn required_bels(&self, template: &ClusterTemplate, anchor: BelId) -> Option<Vec<BelId>> {
        let site = template.bel(anchor).site_index;
        let mut bels = vec![anchor];
        for name in &self.extra_bels {
            bels.push(template.find_bel(site, name)?);
        }
        Some(bels)
    }

    /// BEL pins a cell pin maps to when the cell sits on `bel`.
    pub fn possible_bel_pins(&self, bel: &Bel, cell_pin: Ident) -> Vec<Ident> {
        match self.pin_map.get(&bel.kind) {
            Some(map) => map.get(&cell_pin).cloned().unwrap_or_default(),
            None if bel.pin_direction(cell_pin).is_some() => vec![cell_pin],
            None => Vec::new(),
        }
    }

    /// BEL pins a cell pin may map to on any BEL of `kind`, without checking
    /// that the BEL has them. Unmapped pins keep their own name.
    pub fn bel_pins_on_kind(&self, kind: &BelKind, cell_pin: Ident) -> Vec<Ident> {
        match self.pin_map.get(kind) {
            Some(map) => map.get(&cell_pin).cloned().unwrap_or_default(),
            None => vec![cell_pin],
        }
    }

    /// Returns `true` if `pin` starts or continues a carry link.
    pub fn is_carry_pin(&self, pin: Ident) -> bool {
        self.carry_out_pins.contains(&pin) || self.carry_in_pins.contains(&pin)
    }
}

/// The set of library cell types known to the packer.
#[derive(Debug, Default)]
pub struct CellLibrary {
    cells: Arena<LibCellId, LibraryCell>,
    by_name: HashMap<String, LibCellId>,
}

impl CellLibrary {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell type and returns its ID.
    pub fn add(&mut self, mut cell: LibraryCell) -> LibCellId {
        let id = self.cells.next_id();
        cell.id = id;
        self.by_name.insert(cell.name.clone(), id);
        self.cells.alloc(cell)
    }

    /// Returns the cell type with the given ID.
    pub fn cell(&self, id: LibCellId) -> &LibraryCell {
        &self.cells[id]
    }

    /// Looks up a cell type by name.
    pub fn find(&self, name: &str) -> Option<LibCellId> {
        self.by_name.get(name).copied()
    }

    /// Iterates over all cell types.
    pub fn cells(&self) -> impl Iterator<Item = &LibraryCell> {
        self.cells.values()
    }
}
