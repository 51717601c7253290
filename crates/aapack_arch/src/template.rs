//! Cluster templates: the BELs of one placeable cluster type and the
//! connections among them.

use crate::ids::{BelId, TemplateId};
use crate::types::{Bel, BelKind, BelPinRef, ClusterConnection, DirectConnection};
use aapack_common::{Arena, Ident};
use std::collections::{HashMap, HashSet};

/// A placeable cluster type (for example one slice tile) and its resources.
///
/// Connections are stored in both directions so the BEL selector can ask for
/// the sinks of a source pin and the sources of a sink pin.
#[derive(Debug, Clone)]
pub struct ClusterTemplate {
    /// ID within the device.
    pub id: TemplateId,
    /// Cluster type name.
    pub name: String,
    /// Number of clusters of this type available on the device.
    pub instances: u32,
    /// Number of distinct external nets the cluster inputs can receive.
    pub input_capacity: u32,
    bels: Arena<BelId, Bel>,
    bel_index: HashMap<(u32, String), BelId>,
    sinks_of_source: HashMap<BelPinRef, Vec<ClusterConnection>>,
    sources_of_sink: HashMap<BelPinRef, Vec<ClusterConnection>>,
    direct_sinks: Vec<DirectConnection>,
    direct_sources: Vec<DirectConnection>,
    fabric_pins: HashSet<BelPinRef>,
}

impl ClusterTemplate {
    /// Creates an empty template. The ID is assigned by
    /// [`Device::add_template`](crate::Device::add_template).
    pub fn new(name: impl Into<String>, instances: u32) -> Self {
        Self {
            id: TemplateId::from_raw(0),
            name: name.into(),
            instances,
            input_capacity: u32::MAX,
            bels: Arena::new(),
            bel_index: HashMap::new(),
            sinks_of_source: HashMap::new(),
            sources_of_sink: HashMap::new(),
            direct_sinks: Vec::new(),
            direct_sources: Vec::new(),
            fabric_pins: HashSet::new(),
        }
    }

    /// Adds a BEL in site `site_index` and returns its ID.
    pub fn add_bel(
        &mut self,
        kind: BelKind,
        site_index: u32,
        sources: Vec<Ident>,
        sinks: Vec<Ident>,
    ) -> BelId {
        let id = self.bels.next_id();
        self.bel_index.insert((site_index, kind.name.clone()), id);
        self.bels.alloc(Bel {
            id,
            kind,
            site_index,
            sources,
            sinks,
        })
    }

    /// Records a connection from `source` to `sink` in both lookup tables.
    pub fn add_connection(
        &mut self,
        source: BelPinRef,
        sink: BelPinRef,
        within_site: bool,
        distance: u32,
    ) {
        self.sinks_of_source
            .entry(source)
            .or_default()
            .push(ClusterConnection {
                pin: sink,
                within_site,
                distance,
            });
        self.sources_of_sink
            .entry(sink)
            .or_default()
            .push(ClusterConnection {
                pin: source,
                within_site,
                distance,
            });
    }

    /// Adds a direct connection leaving the cluster from one of its source pins.
    pub fn add_direct_sink(&mut self, connection: DirectConnection) {
        self.direct_sinks.push(connection);
    }

    /// Adds a direct connection entering the cluster at one of its sink pins.
    pub fn add_direct_source(&mut self, connection: DirectConnection) {
        self.direct_sources.push(connection);
    }

    /// Marks a BEL pin as reachable from general interconnect: a source pin
    /// drives the fabric, a sink pin can be driven from it.
    pub fn add_fabric_pin(&mut self, pin: BelPinRef) {
        self.fabric_pins.insert(pin);
    }

    /// Returns `true` if `pin` connects to general interconnect.
    pub fn uses_fabric(&self, pin: BelPinRef) -> bool {
        self.fabric_pins.contains(&pin)
    }

    /// Returns the BEL with the given ID.
    pub fn bel(&self, id: BelId) -> &Bel {
        &self.bels[id]
    }

    /// Iterates over all BELs in ID order.
    pub fn bels(&self) -> impl Iterator<Item = &Bel> {
        self.bels.values()
    }

    /// Number of BELs in the template.
    pub fn bel_count(&self) -> usize {
        self.bels.len()
    }

    /// Looks up a BEL by site index and name.
    pub fn find_bel(&self, site_index: u32, name: &str) -> Option<BelId> {
        self.bel_index.get(&(site_index, name.to_string())).copied()
    }

    /// All BELs of the given kind, in ID order.
    pub fn bels_of_kind<'a>(&'a self, kind: &'a BelKind) -> impl Iterator<Item = BelId> + 'a {
        self.bels
            .values()
            .filter(move |bel| &bel.kind == kind)
            .map(|bel| bel.id)
    }

    /// Connections driven by a source BEL pin.
    pub fn sinks_of_source(&self, source: BelPinRef) -> &[ClusterConnection] {
        self.sinks_of_source
            .get(&source)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Connections feeding a sink BEL pin.
    pub fn sources_of_sink(&self, sink: BelPinRef) -> &[ClusterConnection] {
        self.sources_of_sink.get(&sink).map_or(&[][..], Vec::as_slice)
    }

    /// Direct connections leaving the cluster.
    pub fn direct_sinks(&self) -> &[DirectConnection] {
        &self.direct_sinks
    }

    /// Direct connections entering the cluster.
    pub fn direct_sources(&self) -> &[DirectConnection] {
        &self.direct_sources
    }

    /// Total number of BEL pins, the denominator of pin utilization.
    pub fn total_pin_count(&self) -> usize {
        self.bels.values().map(Bel::pin_count).sum()
    }
}
