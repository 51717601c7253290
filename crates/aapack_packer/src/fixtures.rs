//! Small slice device, cell library and netlist builder shared by the tests.

use crate::cluster::Cluster;
use crate::design::{NetKind, PackDesign};
use crate::ids::{CellId, ClusterId, NetId};
use crate::rules::{PackEnv, PackRuleFactory, RuleContext};
use aapack_arch::{
    BelCostTable, BelKind, BelPinRef, CellLibrary, ClusterTemplate, Device, DirectConnection,
    LibCellId, LibraryCell, PinDirection, SiteType, TemplateId,
};
use aapack_common::{Ident, Interner};

const LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

pub(crate) struct Fixture {
    pub interner: Interner,
    pub library: CellLibrary,
    pub device: Device,
    pub design: PackDesign,
    pub costs: BelCostTable,
    pub slicel: TemplateId,
    pub slicem: TemplateId,
    nets: usize,
}

fn lut6_kinds(site: SiteType) -> Vec<BelKind> {
    LETTERS
        .iter()
        .map(|l| BelKind::new(site, format!("{l}6LUT")))
        .collect()
}

fn lut5_kinds(site: SiteType) -> Vec<BelKind> {
    LETTERS
        .iter()
        .map(|l| BelKind::new(site, format!("{l}5LUT")))
        .collect()
}

fn ff_kinds(site: SiteType) -> Vec<BelKind> {
    LETTERS
        .iter()
        .map(|l| BelKind::new(site, format!("{l}FF")))
        .collect()
}

/// Pin names and directions of each fixture library type.
fn lib_pins(lib: &str) -> Vec<(String, PinDirection)> {
    let inputs = |names: &[&str]| -> Vec<(String, PinDirection)> {
        names
            .iter()
            .map(|n| (n.to_string(), PinDirection::Input))
            .collect()
    };
    let mut pins = match lib {
        "LUT6" | "SPRAM64" | "DPRAM64" | "SRL32" => {
            inputs(&["A1", "A2", "A3", "A4", "A5", "A6"])
        }
        "LUT5" | "SPRAM32" | "DPRAM32" | "SRL16" => inputs(&["A1", "A2", "A3", "A4", "A5"]),
        "FF_INIT" => inputs(&["D", "CK"]),
        "CARRY4" => inputs(&[
            "CIN", "CYINIT", "DI0", "DI1", "DI2", "DI3", "S0", "S1", "S2", "S3",
        ]),
        _ => Vec::new(),
    };
    let outputs: &[&str] = match lib {
        "LUT5" | "SPRAM32" | "DPRAM32" | "SRL16" => &["O5"],
        "FF_INIT" => &["Q"],
        "CARRY4" => &["COUT", "O0", "O1", "O2", "O3"],
        "VCC" | "GND" => &["O6"],
        _ => &["O6"],
    };
    pins.extend(outputs.iter().map(|n| (n.to_string(), PinDirection::Output)));
    pins
}

impl Fixture {
    pub fn new() -> Self {
        let interner = Interner::new();
        let mut device = Device::new("fixture");
        let slicel = device.add_template(Self::slice_template(&interner, SiteType::Slicel));
        let slicem = device.add_template(Self::slice_template(&interner, SiteType::Slicem));
        let library = Self::library(&interner);
        let mut costs = BelCostTable::new();
        for cell in library.cells() {
            for kind in &cell.anchors {
                let base = if kind.site_type == SiteType::Slicem { 1.25 } else { 1.0 };
                costs.insert(&cell.name, kind.clone(), base);
            }
        }
        Self {
            interner,
            library,
            device,
            design: PackDesign::new("top"),
            costs,
            slicel,
            slicem,
            nets: 0,
        }
    }

    fn slice_template(interner: &Interner, site: SiteType) -> ClusterTemplate {
        let pin = |n: &str| interner.get_or_intern(n);
        let pins = |names: &[&str]| names.iter().map(|n| pin(n)).collect::<Vec<Ident>>();
        let (pin_d, pin_cin, pin_cout) = (pin("D"), pin("CIN"), pin("COUT"));
        let mut t = ClusterTemplate::new(format!("{site}_TILE"), 4);
        let mut lut6 = Vec::new();
        let mut lut5 = Vec::new();
        let mut ffs = Vec::new();
        for l in LETTERS {
            lut6.push(t.add_bel(
                BelKind::new(site, format!("{l}6LUT")),
                0,
                pins(&["O6"]),
                pins(&["A1", "A2", "A3", "A4", "A5", "A6"]),
            ));
            lut5.push(t.add_bel(
                BelKind::new(site, format!("{l}5LUT")),
                0,
                pins(&["O5"]),
                pins(&["A1", "A2", "A3", "A4", "A5"]),
            ));
            ffs.push(t.add_bel(
                BelKind::new(site, format!("{l}FF")),
                0,
                pins(&["Q"]),
                pins(&["D", "CK"]),
            ));
        }
        let carry = t.add_bel(
            BelKind::new(site, "CARRY4"),
            0,
            pins(&["COUT", "O0", "O1", "O2", "O3"]),
            pins(&[
                "CIN", "CYINIT", "DI0", "DI1", "DI2", "DI3", "S0", "S1", "S2", "S3",
            ]),
        );

        for i in 0..4 {
            let o6 = BelPinRef::new(lut6[i], pin("O6"));
            let o5 = BelPinRef::new(lut5[i], pin("O5"));
            t.add_connection(o6, BelPinRef::new(ffs[i], pin("D")), true, 1);
            t.add_connection(o5, BelPinRef::new(ffs[i], pin("D")), true, 1);
            t.add_connection(o6, BelPinRef::new(carry, pin(&format!("S{i}"))), true, 1);
            t.add_connection(o5, BelPinRef::new(carry, pin(&format!("DI{i}"))), true, 1);
            t.add_connection(
                BelPinRef::new(carry, pin(&format!("O{i}"))),
                BelPinRef::new(ffs[i], pin("D")),
                true,
                1,
            );
        }
        for &src in lut6.iter().chain(&lut5).chain(&ffs) {
            let out = t.bel(src).sources[0];
            for &dst in lut6.iter().chain(&lut5) {
                for a in ["A1", "A2", "A3", "A4", "A5"] {
                    t.add_connection(
                        BelPinRef::new(src, out),
                        BelPinRef::new(dst, pin(a)),
                        false,
                        3,
                    );
                }
            }
        }
        // FF D is only reachable from inside the site.
        for &bel in lut6.iter().chain(&lut5).chain(&ffs).chain([&carry]) {
            let (sources, sinks) = (t.bel(bel).sources.clone(), t.bel(bel).sinks.clone());
            for pin in sources.into_iter().chain(sinks) {
                if pin != pin_d && pin != pin_cin && pin != pin_cout {
                    t.add_fabric_pin(BelPinRef::new(bel, pin));
                }
            }
        }
        for end_site in [SiteType::Slicel, SiteType::Slicem] {
            t.add_direct_sink(DirectConnection {
                cluster_pin: BelPinRef::new(carry, pin("COUT")),
                end_bel: BelKind::new(end_site, "CARRY4"),
                end_pin: pin("CIN"),
                end_site_index: 0,
                end_tile_offset: Some(1),
            });
            t.add_direct_source(DirectConnection {
                cluster_pin: BelPinRef::new(carry, pin("CIN")),
                end_bel: BelKind::new(end_site, "CARRY4"),
                end_pin: pin("COUT"),
                end_site_index: 0,
                end_tile_offset: Some(-1),
            });
        }
        t.input_capacity = 40;
        t
    }

    fn library(interner: &Interner) -> CellLibrary {
        let both = |f: fn(SiteType) -> Vec<BelKind>| {
            let mut kinds = f(SiteType::Slicel);
            kinds.extend(f(SiteType::Slicem));
            kinds
        };
        let mut lib = CellLibrary::new();
        lib.add(LibraryCell::new("LUT6", both(lut6_kinds)));
        lib.add(LibraryCell::new("LUT5", both(lut5_kinds)));
        lib.add(LibraryCell::new("FF_INIT", both(ff_kinds)));

        let mut carry = LibraryCell::new(
            "CARRY4",
            vec![
                BelKind::new(SiteType::Slicel, "CARRY4"),
                BelKind::new(SiteType::Slicem, "CARRY4"),
            ],
        );
        carry.carry_out_pins.push(interner.get_or_intern("COUT"));
        carry.carry_in_pins.push(interner.get_or_intern("CIN"));
        lib.add(carry);

        for ram in ["SPRAM64", "DPRAM64", "SRL32"] {
            lib.add(LibraryCell::new(ram, lut6_kinds(SiteType::Slicem)));
        }
        for ram in ["SPRAM32", "DPRAM32", "SRL16"] {
            let mut kinds = lut6_kinds(SiteType::Slicem);
            kinds.extend(lut5_kinds(SiteType::Slicem));
            lib.add(LibraryCell::new(ram, kinds));
        }
        for tie in ["VCC", "GND"] {
            let mut cell = LibraryCell::new(tie, both(lut6_kinds));
            cell.constant_source = true;
            lib.add(cell);
        }
        lib
    }

    pub fn pin(&self, name: &str) -> Ident {
        self.interner.get_or_intern(name)
    }

    pub fn lib(&self, name: &str) -> LibCellId {
        self.library
            .find(name)
            .unwrap_or_else(|| panic!("fixture has no library cell {name}"))
    }

    /// Adds a cell of library type `lib` with all of its pins.
    pub fn cell(&mut self, name: &str, lib: &str) -> CellId {
        let lib_id = self.lib(lib);
        let id = self.design.add_cell(name, lib_id);
        for (pin, dir) in lib_pins(lib) {
            let ident = self.interner.get_or_intern(&pin);
            self.design.add_pin(id, ident, dir);
        }
        id
    }

    pub fn lut(&mut self, name: &str, lib: &str) -> CellId {
        self.cell(name, lib)
    }

    pub fn ff(&mut self, name: &str) -> CellId {
        self.cell(name, "FF_INIT")
    }

    pub fn carry(&mut self, name: &str) -> CellId {
        self.cell(name, "CARRY4")
    }

    /// LUT-RAM cell with `$RAMGROUP` and `$RAMPOSITION` set.
    pub fn ram(&mut self, name: &str, lib: &str, group: &str, position: &str) -> CellId {
        let id = self.cell(name, lib);
        let props = &mut self.design.cell_mut(id).properties;
        props.insert(crate::design::RAM_GROUP_PROPERTY.to_string(), group.to_string());
        props.insert(
            crate::design::RAM_POSITION_PROPERTY.to_string(),
            position.to_string(),
        );
        id
    }

    fn next_net_name(&mut self) -> String {
        self.nets += 1;
        format!("n{}", self.nets)
    }

    /// Creates a signal net from `src.src_pin` to every `(cell, pin)` sink.
    pub fn wire(&mut self, src: CellId, src_pin: &str, sinks: &[(CellId, &str)]) -> NetId {
        let name = self.next_net_name();
        self.wire_kind(name, NetKind::Signal, Some((src, src_pin)), sinks)
    }

    pub fn wire_kind(
        &mut self,
        name: String,
        kind: NetKind,
        src: Option<(CellId, &str)>,
        sinks: &[(CellId, &str)],
    ) -> NetId {
        let net = self.design.add_net(name, kind);
        for &(cell, pin) in src.iter().chain(sinks) {
            let ident = self.pin(pin);
            let pin = self
                .design
                .pin_named(cell, ident)
                .unwrap_or_else(|| panic!("cell has no pin {}", self.interner.resolve(ident)));
            self.design.connect(pin, net);
        }
        net
    }

    pub fn link_carry(&mut self, from: CellId, to: CellId) -> NetId {
        self.wire(from, "COUT", &[(to, "CIN")])
    }

    /// A fresh candidate cluster on `template`.
    pub fn new_cluster(&self, template: TemplateId) -> Cluster {
        Cluster::new(self.design.next_cluster_id(), "cand", template)
    }

    pub fn bel(&self, template: TemplateId, name: &str) -> aapack_arch::BelId {
        self.device
            .template(template)
            .find_bel(0, name)
            .unwrap_or_else(|| panic!("fixture template has no BEL {name}"))
    }

    /// Places `cell` on `bel` of `cluster`, marking it clustered and invalid.
    pub fn place(&mut self, cluster: &mut Cluster, cell: CellId, bel: &str) {
        let bel = self.bel(cluster.template, bel);
        cluster.add_cell(cell, &[bel]);
        let c = self.design.cell_mut(cell);
        c.cluster = Some(cluster.id);
        c.location = Some(bel);
        c.valid = false;
    }

    /// Stores `cluster` as committed.
    pub fn commit(&mut self, cluster: Cluster) -> ClusterId {
        self.design.add_cluster(cluster)
    }

    pub fn env(&self) -> PackEnv<'_> {
        PackEnv {
            device: &self.device,
            library: &self.library,
            interner: &self.interner,
        }
    }

    /// Rule context over `cluster` that may mutate the design.
    pub fn ctx<'a>(&'a mut self, cluster: &'a Cluster) -> RuleContext<'a> {
        RuleContext {
            env: PackEnv {
                device: &self.device,
                library: &self.library,
                interner: &self.interner,
            },
            design: &mut self.design,
            cluster,
        }
    }

    /// Stores `cluster` and runs `factory`'s commit hook on it.
    pub fn commit_with(&mut self, cluster: Cluster, factory: &mut dyn PackRuleFactory) -> ClusterId {
        let id = self.design.add_cluster(cluster);
        let env = PackEnv {
            device: &self.device,
            library: &self.library,
            interner: &self.interner,
        };
        factory.commit_cluster(env, &mut self.design, id);
        id
    }
}
