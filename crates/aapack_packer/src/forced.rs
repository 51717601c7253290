//! Placements implied by the template's wiring.
//!
//! Once a cell is bound, each neighbour it shares a net with either can reach
//! it through general interconnect, or must sit on one of the BELs the
//! template wires to the bound pin. The queries here answer which: `None`
//! when the fabric (or a direct connection out of the cluster) can carry the
//! signal, otherwise the free BELs the neighbour could take. An empty set
//! means the neighbour cannot be reached at all; a single BEL forces it.

use crate::cluster::ClusterView;
use crate::ids::PinId;
use aapack_arch::{BelId, BelPinRef, Device, LibraryCell};
use aapack_common::Ident;
use std::collections::BTreeSet;

/// Whether `pin` of `lib` can be driven from general interconnect on any of
/// its anchor kinds.
fn driven_by_fabric(device: &Device, lib: &LibraryCell, pin: Ident) -> bool {
    lib.anchors.iter().any(|kind| {
        lib.bel_pins_on_kind(kind, pin)
            .into_iter()
            .any(|bel_pin| device.kind_pin_uses_fabric(kind, bel_pin))
    })
}

/// BELs the cell of `sink` may take given that `source` is already bound.
pub fn possible_sink_bels(
    view: &ClusterView<'_>,
    device: &Device,
    source: PinId,
    sink: PinId,
) -> Option<BTreeSet<BelId>> {
    let design = view.design;
    let source_pin = design.pin(source);
    let sink_pin = design.pin(sink);
    let source_cell = design.cell(source_pin.cell);
    let source_lib = view.library.cell(source_cell.lib);
    let sink_lib = view.library.cell(design.cell(sink_pin.cell).lib);

    let source_bel = view.template.bel(source_cell.location?);
    let bel_pin = *source_lib
        .possible_bel_pins(source_bel, source_pin.name)
        .first()?;
    let bel_pin = BelPinRef::new(source_bel.id, bel_pin);

    let leaves_cluster = view.template.direct_sinks().iter().any(|dc| {
        dc.cluster_pin == bel_pin
            && sink_lib
                .bel_pins_on_kind(&dc.end_bel, sink_pin.name)
                .contains(&dc.end_pin)
    });
    if leaves_cluster {
        return None;
    }
    if view.template.uses_fabric(bel_pin) && driven_by_fabric(device, sink_lib, sink_pin.name) {
        return None;
    }

    let bels = view
        .template
        .sinks_of_source(bel_pin)
        .iter()
        .filter(|conn| !view.cluster.is_bel_occupied(conn.pin.bel))
        .filter(|conn| {
            let bel = view.template.bel(conn.pin.bel);
            sink_lib.anchors.contains(&bel.kind)
                && sink_lib
                    .possible_bel_pins(bel, sink_pin.name)
                    .contains(&conn.pin.pin)
        })
        .map(|conn| conn.pin.bel)
        .collect();
    Some(bels)
}

/// BELs the cell of `source` may take given that `sink` is already bound.
pub fn possible_source_bels(
    view: &ClusterView<'_>,
    device: &Device,
    sink: PinId,
    source: PinId,
) -> Option<BTreeSet<BelId>> {
    let design = view.design;
    let sink_pin = design.pin(sink);
    let source_pin = design.pin(source);
    let sink_cell = design.cell(sink_pin.cell);
    let sink_lib = view.library.cell(sink_cell.lib);
    let source_lib = view.library.cell(design.cell(source_pin.cell).lib);

    let sink_bel = view.template.bel(sink_cell.location?);
    let bel_pins: Vec<BelPinRef> = sink_lib
        .possible_bel_pins(sink_bel, sink_pin.name)
        .into_iter()
        .map(|pin| BelPinRef::new(sink_bel.id, pin))
        .collect();
    if bel_pins.is_empty() {
        return None;
    }

    let enters_cluster = view.template.direct_sources().iter().any(|dc| {
        bel_pins.contains(&dc.cluster_pin)
            && source_lib
                .bel_pins_on_kind(&dc.end_bel, source_pin.name)
                .contains(&dc.end_pin)
    });
    if enters_cluster {
        return None;
    }
    if driven_by_fabric(device, source_lib, source_pin.name)
        && bel_pins.iter().any(|&pin| view.template.uses_fabric(pin))
    {
        return None;
    }

    let bels = bel_pins
        .iter()
        .flat_map(|&pin| view.template.sources_of_sink(pin))
        .filter(|conn| !view.cluster.is_bel_occupied(conn.pin.bel))
        .filter(|conn| {
            let bel = view.template.bel(conn.pin.bel);
            source_lib.anchors.contains(&bel.kind)
                && source_lib
                    .possible_bel_pins(bel, source_pin.name)
                    .contains(&conn.pin.pin)
        })
        .map(|conn| conn.pin.bel)
        .collect();
    Some(bels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    #[test]
    fn lut_output_forces_its_flip_flop() {
        let mut fx = Fixture::new();
        let lut = fx.lut("l", "LUT6");
        let ff = fx.ff("f");
        fx.wire(lut, "O6", &[(ff, "D")]);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, lut, "B6LUT");

        let o6 = fx.design.pin_named(lut, fx.pin("O6")).unwrap();
        let d = fx.design.pin_named(ff, fx.pin("D")).unwrap();
        let view = ClusterView {
            design: &fx.design,
            library: &fx.library,
            template: fx.device.template(fx.slicel),
            cluster: &cluster,
        };
        let bels = possible_sink_bels(&view, &fx.device, o6, d).unwrap();
        assert_eq!(bels.into_iter().collect::<Vec<_>>(), vec![fx.bel(fx.slicel, "BFF")]);
    }

    #[test]
    fn fabric_connections_force_nothing() {
        let mut fx = Fixture::new();
        let ff = fx.ff("f");
        let lut = fx.lut("l", "LUT6");
        fx.wire(ff, "Q", &[(lut, "A1")]);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, ff, "AFF");

        let q = fx.design.pin_named(ff, fx.pin("Q")).unwrap();
        let a1 = fx.design.pin_named(lut, fx.pin("A1")).unwrap();
        let view = ClusterView {
            design: &fx.design,
            library: &fx.library,
            template: fx.device.template(fx.slicel),
            cluster: &cluster,
        };
        assert!(possible_sink_bels(&view, &fx.device, q, a1).is_none());
    }

    #[test]
    fn carry_links_leave_the_cluster() {
        let mut fx = Fixture::new();
        let c0 = fx.carry("c0");
        let c1 = fx.carry("c1");
        fx.link_carry(c0, c1);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, c1, "CARRY4");

        let cout = fx.design.pin_named(c0, fx.pin("COUT")).unwrap();
        let cin = fx.design.pin_named(c1, fx.pin("CIN")).unwrap();
        let view = ClusterView {
            design: &fx.design,
            library: &fx.library,
            template: fx.device.template(fx.slicel),
            cluster: &cluster,
        };
        assert!(possible_source_bels(&view, &fx.device, cin, cout).is_none());
    }

    #[test]
    fn occupied_driver_slot_leaves_no_choice() {
        let mut fx = Fixture::new();
        let lut = fx.lut("l", "LUT6");
        let blocker = fx.lut("b", "LUT6");
        let ff = fx.ff("f");
        fx.wire(lut, "O6", &[(ff, "D")]);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, ff, "CFF");
        fx.place(&mut cluster, blocker, "C6LUT");

        let o6 = fx.design.pin_named(lut, fx.pin("O6")).unwrap();
        let d = fx.design.pin_named(ff, fx.pin("D")).unwrap();
        let view = ClusterView {
            design: &fx.design,
            library: &fx.library,
            template: fx.device.template(fx.slicel),
            cluster: &cluster,
        };
        assert_eq!(possible_source_bels(&view, &fx.device, d, o6), Some(BTreeSet::new()));
    }
}
