//! Carry-chain legality across clusters.
//!
//! Carry chains run through dedicated direct connections between vertically
//! adjacent tiles, so a chain split over several clusters constrains how
//! those clusters can be placed. Clusters holding cells of one chain form a
//! carry group; each cluster gets an index within the group, and clusters
//! joined by direct connections must agree on the neighbour they reach.
//!
//! Per validate the rule checks, in order:
//!
//! 1. a partially placed chain never strands an unclustered stretch between
//!    two clustered cells;
//! 2. all direct connections leaving the cluster towards one tile offset end
//!    in the same cluster;
//! 3. cells merged with earlier commits through shared direct connections
//!    follow (Conditional), and the packed count of each touched chain goes
//!    up by one per new cell;
//! 4. no two cells of one group with different indices share the cluster.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::design::{CarryConnection, PackDesign};
use crate::ids::{CarryChainId, CarryGroupId, CellId, ClusterId};
use crate::transactional::TransactionalMap;
use aapack_arch::{Bel, BelPinRef, DirectConnection};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

/// Tile offset to the cells reached through direct connections.
type SharedEnds = BTreeMap<i32, BTreeSet<CellId>>;

/// Cluster-side lookups shared by validation and commit.
struct ChainView<'a> {
    env: PackEnv<'a>,
    design: &'a PackDesign,
    cluster: &'a Cluster,
}

impl<'a> ChainView<'a> {
    /// BEL of a clustered cell, looking at the candidate first.
    fn bel_of(&self, cell: CellId) -> Option<&'a Bel> {
        let c = self.design.cell(cell);
        let cluster = c.cluster?;
        if cluster == self.cluster.id {
            let template = self.env.device.template(self.cluster.template);
            return self.cluster.location_of(cell).map(|b| template.bel(b));
        }
        let template = self.env.device.template(self.design.cluster(cluster).template);
        c.location.map(|b| template.bel(b))
    }

    /// Returns `true` if `direct` leaves through `cluster_pin` and may end on
    /// the far side of `link`.
    fn is_compatible(
        &self,
        direct: &DirectConnection,
        cluster_pin: BelPinRef,
        link: &CarryConnection,
    ) -> bool {
        if direct.cluster_pin != cluster_pin {
            return false;
        }
        let end = self.design.cell(link.end_cell);
        let lib = self.env.library.cell(end.lib);
        let end_pin = self.design.pin(link.end_pin).name;
        if end.cluster.is_none() {
            return lib.anchors.contains(&direct.end_bel)
                && lib
                    .bel_pins_on_kind(&direct.end_bel, end_pin)
                    .contains(&direct.end_pin);
        }
        self.bel_of(link.end_cell).is_some_and(|bel| {
            bel.kind == direct.end_bel
                && bel.site_index == direct.end_site_index
                && lib.possible_bel_pins(bel, end_pin).contains(&direct.end_pin)
        })
    }

    /// Groups the carry neighbours of `cells` by the tile offset of the
    /// direct connection reaching them.
    fn shared_ends(&self, cells: &[CellId]) -> SharedEnds {
        let template = self.env.device.template(self.cluster.template);
        let mut ends = SharedEnds::new();
        for &cell in cells {
            let Some(anchor) = self.cluster.location_of(cell) else { continue };
            let bel = template.bel(anchor);
            let c = self.design.cell(cell);
            let lib = self.env.library.cell(c.lib);
            let sides = [
                (&c.sink_carry, template.direct_sinks()),
                (&c.source_carry, template.direct_sources()),
            ];
            for (links, directs) in sides {
                for link in links {
                    let pin = self.design.pin(link.cluster_pin).name;
                    let Some(&bel_pin) = lib.possible_bel_pins(bel, pin).first() else {
                        continue;
                    };
                    let cluster_pin = BelPinRef::new(anchor, bel_pin);
                    let offset = directs
                        .iter()
                        .find(|d| self.is_compatible(d, cluster_pin, link))
                        .and_then(|d| d.end_tile_offset);
                    if let Some(offset) = offset {
                        ends.entry(offset).or_default().insert(link.end_cell);
                    }
                }
            }
        }
        ends
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Sinks,
    Sources,
}

/// Returns `false` if walking from the unclustered `start` along `dir`
/// reaches a clustered cell.
fn can_be_placed(design: &PackDesign, start: CellId, dir: Direction) -> bool {
    if design.cell(start).cluster.is_some() {
        return true;
    }
    let mut visited = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(cell) = queue.pop_front() {
        let c = design.cell(cell);
        let links = match dir {
            Direction::Sinks => &c.sink_carry,
            Direction::Sources => &c.source_carry,
        };
        for link in links {
            if !visited.insert(link.end_cell) {
                continue;
            }
            if design.cell(link.end_cell).cluster.is_some() {
                return false;
            }
            queue.push_back(link.end_cell);
        }
    }
    true
}

/// Factory for [`CarryChainValidity`]; maintains carry groups on commit.
#[derive(Debug, Default)]
pub struct CarryChainValidityFactory {
    /// Unclustered cell to the cells it was merged with by a commit.
    merged: Rc<HashMap<CellId, BTreeSet<CellId>>>,
}

impl CarryChainValidityFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells `cell` has been merged with, if any.
    pub fn merged_with(&self, cell: CellId) -> Option<&BTreeSet<CellId>> {
        self.merged.get(&cell)
    }

    /// Pulls the groups of cells reached through direct connections into
    /// `group` and gives every reached tile a consistent index.
    fn merge_shared_chains(
        &mut self,
        design: &mut PackDesign,
        cells: &[CellId],
        group: CarryGroupId,
        index: u32,
        ends: &SharedEnds,
    ) {
        let mut updates: BTreeMap<CarryGroupId, HashMap<u32, u32>> = BTreeMap::new();
        for &cell in cells {
            let c = design.cell(cell);
            if let (Some(g), Some(i)) = (c.carry_group, c.carry_index) {
                if g != group {
                    updates.entry(g).or_default().insert(i, index);
                }
            }
        }
        for set in ends.values() {
            let mut in_group = None;
            let mut outside = BTreeMap::new();
            for &cell in set {
                let c = design.cell(cell);
                match (c.carry_group, c.carry_index) {
                    (Some(g), Some(i)) if g == group => in_group = Some(i),
                    (Some(g), Some(i)) => {
                        outside.insert(g, i);
                    }
                    _ => {}
                }
            }
            if outside.is_empty() {
                continue;
            }
            let target = match in_group {
                Some(i) => i,
                None => design.carry.group_mut(group).unique_index(),
            };
            for (g, i) in outside {
                updates.entry(g).or_default().entry(i).or_insert(target);
            }
        }
        for (other, map) in &updates {
            design.absorb_carry_group(group, *other, map);
        }

        for set in ends.values() {
            let assigned = set.iter().find_map(|&c| {
                let c = design.cell(c);
                c.carry_index.filter(|_| c.carry_group == Some(group))
            });
            let target = match assigned {
                Some(i) => i,
                None => design.carry.group_mut(group).unique_index(),
            };
            for &cell in set {
                if design.cell(cell).carry_group.is_none() {
                    design.assign_carry_group(cell, group, target);
                }
            }
            if set.len() > 1 {
                let merged = Rc::make_mut(&mut self.merged);
                for &cell in set {
                    if design.cell(cell).cluster.is_none() {
                        merged.entry(cell).or_default().extend(set.iter().copied());
                    }
                }
            }
        }
    }
}

impl PackRuleFactory for CarryChainValidityFactory {
    fn name(&self) -> &'static str {
        "carry_chain_validity"
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(CarryChainValidity {
            merged: Rc::clone(&self.merged),
            conditionals: Vec::new(),
            incremented: Vec::new(),
            claimed: TransactionalMap::new(),
        })
    }

    fn commit_cluster(&mut self, env: PackEnv<'_>, design: &mut PackDesign, cluster: ClusterId) {
        let committed = design.cluster(cluster).clone();
        let chain_cells: Vec<CellId> = committed
            .cells()
            .filter(|&c| design.cell(c).carry_chain.is_some())
            .collect();
        if chain_cells.is_empty() {
            return;
        }
        for &cell in &chain_cells {
            if let Some(chain) = design.cell(cell).carry_chain {
                design.carry.increment_packed(chain);
            }
        }

        let existing = chain_cells.iter().find_map(|&c| {
            let c = design.cell(c);
            c.carry_group.zip(c.carry_index)
        });
        let (group, index) = match existing {
            Some(found) => found,
            None => {
                let group = design.carry.new_group();
                (group, design.carry.group_mut(group).unique_index())
            }
        };
        let target = design.cluster_mut(cluster);
        target.carry_group = Some(group);
        target.carry_index = Some(index);
        for &cell in &chain_cells {
            if design.cell(cell).carry_group.is_none() {
                design.assign_carry_group(cell, group, index);
            }
        }

        let ends = ChainView {
            env,
            design: &*design,
            cluster: &committed,
        }
        .shared_ends(&chain_cells);
        self.merge_shared_chains(design, &chain_cells, group, index, &ends);
    }
}

/// Per-cluster carry-chain rule.
#[derive(Debug)]
pub struct CarryChainValidity {
    merged: Rc<HashMap<CellId, BTreeSet<CellId>>>,
    conditionals: Vec<Conditionals>,
    /// Chains whose packed count each validate raised.
    incremented: Vec<Vec<CarryChainId>>,
    /// Tile offset to the cluster its direct connections reach.
    claimed: TransactionalMap<i32, Option<ClusterId>>,
}

impl CarryChainValidity {
    fn is_consecutive(ctx: &RuleContext<'_>, chain_cells: &[CellId]) -> bool {
        let design = &*ctx.design;
        chain_cells.iter().all(|&cell| {
            let c = design.cell(cell);
            let partial = c
                .carry_chain
                .is_some_and(|chain| design.carry.chain(chain).is_partially_placed());
            !partial
                || (c
                    .sink_carry
                    .iter()
                    .all(|l| can_be_placed(design, l.end_cell, Direction::Sinks))
                    && c
                        .source_carry
                        .iter()
                        .all(|l| can_be_placed(design, l.end_cell, Direction::Sources)))
        })
    }

    fn is_mergeable(&mut self, ctx: &RuleContext<'_>, chain_cells: &[CellId]) -> bool {
        let view = ChainView {
            env: ctx.env,
            design: &*ctx.design,
            cluster: ctx.cluster,
        };
        for (offset, cells) in view.shared_ends(chain_cells) {
            for cell in cells {
                let reached = ctx.design.cell(cell).cluster;
                match self.claimed.get(&offset) {
                    Some(&claimed) if claimed != reached => return false,
                    Some(_) => {}
                    None => {
                        self.claimed.put(offset, reached);
                    }
                }
            }
        }
        true
    }

    /// Conditionals carried over from the previous validate plus the cells
    /// merged with anything in `changed`. `None` if one has no free anchor.
    fn merged_conditionals(&self, ctx: &RuleContext<'_>, changed: &[CellId]) -> Option<Conditionals> {
        let mut cells: BTreeSet<CellId> = self
            .conditionals
            .last()
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        for cell in changed {
            if let Some(merged) = self.merged.get(cell) {
                cells.extend(merged.iter().copied());
            }
        }
        let mut conditionals = Conditionals::new();
        for cell in cells {
            if !ctx.design.cell(cell).valid {
                continue;
            }
            let anchors = ctx.free_anchors(cell);
            if anchors.is_empty() {
                return None;
            }
            conditionals.insert(cell, anchors);
        }
        Some(conditionals)
    }

    fn indices_agree(ctx: &RuleContext<'_>, chain_cells: &[CellId]) -> bool {
        let design = &*ctx.design;
        ctx.cluster.cells().all(|member| {
            let m = design.cell(member);
            let Some(group) = m.carry_group else { return true };
            chain_cells.iter().all(|&cell| {
                let c = design.cell(cell);
                cell == member || c.carry_group != Some(group) || c.carry_index == m.carry_index
            })
        })
    }
}

impl PackRule for CarryChainValidity {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        let chain_cells: Vec<CellId> = changed
            .iter()
            .copied()
            .filter(|&c| ctx.design.cell(c).carry_chain.is_some())
            .collect();
        self.claimed.checkpoint();

        let mut status = PackStatus::Infeasible;
        let mut conditionals = Conditionals::new();
        let mut incremented = Vec::new();
        if Self::is_consecutive(ctx, &chain_cells) && self.is_mergeable(ctx, &chain_cells) {
            if let Some(conds) = self.merged_conditionals(ctx, changed) {
                for &cell in &chain_cells {
                    if let Some(chain) = ctx.design.cell(cell).carry_chain {
                        ctx.design.carry.increment_packed(chain);
                        incremented.push(chain);
                    }
                }
                if Self::indices_agree(ctx, &chain_cells) {
                    status = if conds.is_empty() {
                        PackStatus::Valid
                    } else {
                        PackStatus::Conditional
                    };
                    conditionals = conds;
                }
            }
        }

        self.conditionals.push(conditionals);
        self.incremented.push(incremented);
        status
    }

    fn conditionals(&self, _ctx: &RuleContext<'_>) -> Conditionals {
        self.conditionals.last().cloned().unwrap_or_default()
    }

    fn revert(&mut self, ctx: &mut RuleContext<'_>) {
        self.conditionals.pop();
        for chain in self.incremented.pop().unwrap_or_default() {
            ctx.design.carry.decrement_packed(chain);
        }
        self.claimed.rollback();
    }

    fn cleanup(&mut self, ctx: &mut RuleContext<'_>) {
        while let Some(chains) = self.incremented.pop() {
            for chain in chains {
                ctx.design.carry.decrement_packed(chain);
            }
        }
        self.conditionals.clear();
    }
}
