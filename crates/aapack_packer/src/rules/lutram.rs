//! LUT-RAM placement: column restrictions, whole RAM groups and D-LUT pairing.
//!
//! A logical RAM is split into several LUT-RAM cells sharing a `$RAMGROUP`
//! property. `$RAMPOSITION` lists the LUT columns (`A` to `D`) a cell may use.
//! Three things are checked on each validate:
//!
//! * a RAM cell sits in a column its position string allows;
//! * once one cell of a group is in the cluster, every sibling must follow
//!   (Conditional on the free LUT BELs it could take);
//! * a slice using LUT-RAM in some column but not in its D LUT of the same
//!   size must receive a connected RAM cell that may sit in column D, since
//!   the D LUT drives the write address.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::design::{PackDesign, RAM_GROUP_PROPERTY, RAM_POSITION_PROPERTY};
use crate::ids::CellId;
use aapack_arch::{BelId, SiteType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// Library types handled as LUT-RAM.
pub const LUTRAM_TYPES: &[&str] = &["SPRAM32", "SPRAM64", "DPRAM32", "DPRAM64"];

#[derive(Debug, Default)]
struct RamGroups {
    groups: Vec<Vec<CellId>>,
    group_of: HashMap<CellId, usize>,
}

/// Factory for [`LutRamValidity`].
#[derive(Debug)]
pub struct LutRamValidityFactory {
    fanout_limit: usize,
    groups: Rc<RamGroups>,
}

impl LutRamValidityFactory {
    /// Creates the factory. Nets with more than `fanout_limit` pins are not
    /// followed when looking for D-column partners.
    pub fn new(fanout_limit: usize) -> Self {
        Self {
            fanout_limit,
            groups: Rc::new(RamGroups::default()),
        }
    }
}

impl PackRuleFactory for LutRamValidityFactory {
    fn name(&self) -> &'static str {
        "lutram_validity"
    }

    fn init(&mut self, env: PackEnv<'_>, design: &PackDesign) {
        let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
        let mut groups = RamGroups::default();
        for cell in design.cells() {
            let lib = env.library.cell(cell.lib);
            if !LUTRAM_TYPES.contains(&lib.name.as_str()) {
                continue;
            }
            let key = cell.property(RAM_GROUP_PROPERTY).unwrap_or(&cell.name);
            let next = by_name.len();
            let index = *by_name.entry(key.to_string()).or_insert(next);
            if index == groups.groups.len() {
                groups.groups.push(Vec::new());
            }
            groups.groups[index].push(cell.id);
            groups.group_of.insert(cell.id, index);
        }
        self.groups = Rc::new(groups);
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(LutRamValidity {
            fanout_limit: self.fanout_limit,
            groups: Rc::clone(&self.groups),
            base: LutRamState::default(),
            stack: Vec::new(),
        })
    }
}

#[derive(Debug, Clone)]
struct LutRamState {
    status: PackStatus,
    /// `(site, LUT size)` pairs holding LUT-RAM, `true` once the D LUT does.
    used_luts: BTreeMap<(u32, u8), bool>,
    incomplete: BTreeSet<usize>,
    conditionals: Conditionals,
}

impl Default for LutRamState {
    fn default() -> Self {
        Self {
            status: PackStatus::Valid,
            used_luts: BTreeMap::new(),
            incomplete: BTreeSet::new(),
            conditionals: Conditionals::new(),
        }
    }
}

/// Per-cluster LUT-RAM rule.
#[derive(Debug)]
pub struct LutRamValidity {
    fanout_limit: usize,
    groups: Rc<RamGroups>,
    base: LutRamState,
    stack: Vec<LutRamState>,
}

fn position(design: &PackDesign, cell: CellId) -> &str {
    design
        .cell(cell)
        .property(RAM_POSITION_PROPERTY)
        .unwrap_or_default()
}

impl LutRamValidity {
    fn current(&self) -> &LutRamState {
        self.stack.last().unwrap_or(&self.base)
    }

    /// Free SLICEM LUT BELs `cell` could take given its position string.
    fn possible_locations(&self, ctx: &RuleContext<'_>, cell: CellId) -> BTreeSet<BelId> {
        let columns = position(ctx.design, cell);
        let lib = ctx.env.library.cell(ctx.design.cell(cell).lib);
        let shallow = lib.name.ends_with("32");
        ctx.template()
            .bels()
            .filter(|bel| bel.site_type() == SiteType::Slicem)
            .filter(|bel| {
                bel.lut_slot().is_some_and(|slot| {
                    columns.contains(slot.letter) && (slot.size == 6 || shallow)
                })
            })
            .map(|bel| bel.id)
            .filter(|&b| !ctx.cluster.is_bel_occupied(b))
            .collect()
    }

    fn update(&self, ctx: &RuleContext<'_>, state: &mut LutRamState, rams: &[CellId]) -> PackStatus {
        for ram in rams {
            state.incomplete.insert(self.groups.group_of[ram]);
        }
        state.incomplete.retain(|&g| {
            !self.groups.groups[g]
                .iter()
                .all(|&c| ctx.design.cell(c).cluster.is_some())
        });

        for &ram in rams {
            let Some(slot) = ctx.bel_of(ram).and_then(|bel| bel.lut_slot().map(|s| (bel, s)))
            else {
                return PackStatus::Infeasible;
            };
            let (bel, slot) = slot;
            let used = state
                .used_luts
                .entry((bel.site_index, slot.size))
                .or_insert(false);
            if slot.letter == 'D' {
                *used = true;
            }
            if !position(ctx.design, ram).contains(slot.letter) {
                return PackStatus::Infeasible;
            }
        }
        PackStatus::Valid
    }

    fn check_siblings(&self, ctx: &RuleContext<'_>, state: &mut LutRamState) -> PackStatus {
        if state.incomplete.is_empty() {
            return PackStatus::Valid;
        }
        for &group in &state.incomplete {
            for &cell in &self.groups.groups[group] {
                if !ctx.design.cell(cell).valid {
                    continue;
                }
                let bels = self.possible_locations(ctx, cell);
                if bels.is_empty() {
                    return PackStatus::Infeasible;
                }
                state.conditionals.insert(cell, bels);
            }
        }
        PackStatus::Conditional
    }

    fn check_d_luts(&self, ctx: &RuleContext<'_>, state: &mut LutRamState) -> PackStatus {
        let template = ctx.template();
        let mut missing = BTreeSet::new();
        let mut needs_d = false;
        for (&(site, size), &has_d) in &state.used_luts {
            if has_d {
                continue;
            }
            needs_d = true;
            if let Some(bel) = template.find_bel(site, &format!("D{size}LUT")) {
                if !ctx.cluster.is_bel_occupied(bel) {
                    missing.insert(bel);
                }
            }
        }
        if !needs_d {
            return PackStatus::Valid;
        }
        if missing.is_empty() {
            return PackStatus::Infeasible;
        }

        let partners = self.connected_d_rams(ctx);
        if partners.is_empty() {
            return PackStatus::Infeasible;
        }
        for cell in partners {
            state
                .conditionals
                .entry(cell)
                .or_default()
                .extend(missing.iter().copied());
        }
        PackStatus::Conditional
    }

    /// Unpacked RAM cells allowed in column D that share a net with the
    /// cluster.
    fn connected_d_rams(&self, ctx: &RuleContext<'_>) -> BTreeSet<CellId> {
        let design = &*ctx.design;
        let mut found = BTreeSet::new();
        for cell in ctx.cluster.cells() {
            for &pin in &design.cell(cell).pins {
                let Some(net) = design.pin(pin).net.map(|n| design.net(n)) else {
                    continue;
                };
                if net.is_clock() || net.is_static() || net.pin_count() > self.fanout_limit {
                    continue;
                }
                for &other_pin in &net.pins {
                    let other = design.pin(other_pin).cell;
                    if other != cell
                        && self.groups.group_of.contains_key(&other)
                        && design.cell(other).valid
                        && position(design, other).contains('D')
                    {
                        found.insert(other);
                    }
                }
            }
        }
        found
    }
}

impl PackRule for LutRamValidity {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        let rams: Vec<CellId> = changed
            .iter()
            .copied()
            .filter(|c| self.groups.group_of.contains_key(c))
            .collect();
        let mut state = self.current().clone();
        if rams.is_empty() {
            let status = state.status;
            self.stack.push(state);
            return status;
        }

        state.conditionals.clear();
        let mut status = self.update(ctx, &mut state, &rams);
        if status == PackStatus::Valid {
            status = self.check_siblings(ctx, &mut state);
        }
        if status == PackStatus::Valid {
            status = self.check_d_luts(ctx, &mut state);
        }
        if status == PackStatus::Infeasible {
            state.conditionals.clear();
        }
        state.status = status;
        self.stack.push(state);
        status
    }

    fn conditionals(&self, _ctx: &RuleContext<'_>) -> Conditionals {
        self.current().conditionals.clone()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {
        self.stack.pop();
    }
}
