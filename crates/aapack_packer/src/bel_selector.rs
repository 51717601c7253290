//! Choosing the BEL a cell occupies inside its cluster.

use crate::cluster::ClusterView;
use crate::design::PackPin;
use crate::ids::CellId;
use crate::transactional::TransactionalMap;
use aapack_arch::{BelCostTable, BelId, BelPinRef, ClusterConnection, ClusterTemplate};
use aapack_common::{Ident, InternalError, PackResult};
use aapack_config::BelSelectorConfig;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Enumerates and ranks anchor BELs for one cell at a time.
pub trait BelSelector {
    /// Starts a new cluster on `template`.
    fn init_cluster(&mut self, template: &ClusterTemplate);

    /// Builds the candidate queue for `cell`, restricted to `forced` when
    /// given.
    fn init_cell(
        &mut self,
        view: &ClusterView<'_>,
        cell: CellId,
        forced: Option<&BTreeSet<BelId>>,
    ) -> PackResult<()>;

    /// Pops the cheapest remaining anchor.
    fn next_bel(&mut self) -> Option<BelId>;

    /// Records that the current cell was placed on `bels`.
    fn commit_bels(&mut self, template: &ClusterTemplate, bels: &[BelId]);

    /// Drops the candidate queue of the current cell.
    fn revert_to_last_commit(&mut self);

    /// Undoes the last `commit_bels`, restoring its candidate queue.
    fn roll_back_last_commit(&mut self);

    /// Ends the cluster.
    fn cleanup_cluster(&mut self);

    /// Number of outstanding commits.
    fn depth(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct BelCandidate {
    cost: f64,
    complexity: usize,
    bel: BelId,
}

impl PartialEq for BelCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BelCandidate {}

impl PartialOrd for BelCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap yields the cheapest, simplest, lowest-ID BEL.
impl Ord for BelCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.complexity.cmp(&self.complexity))
            .then_with(|| other.bel.cmp(&self.bel))
    }
}

/// Costs anchors by base placement cost, crowding and internal routing.
#[derive(Debug)]
pub struct ShortestRouteBelSelector {
    costs: BelCostTable,
    must_leave_cluster_cost: f64,
    reserve_bel_penalty: f64,
    leave_site_penalty: f64,
    /// `pip_penalty^i` for `i` in `0..=max_pip_hops`.
    pip_penalties: Vec<f64>,
    complexity: HashMap<BelId, usize>,
    reserve: TransactionalMap<BelId, f64>,
    queue: Option<BinaryHeap<BelCandidate>>,
    queue_stack: Vec<Option<BinaryHeap<BelCandidate>>>,
}

impl ShortestRouteBelSelector {
    /// Creates a selector over the given cost table.
    pub fn new(costs: BelCostTable, config: &BelSelectorConfig) -> Self {
        let pip_penalties = (0..=config.max_pip_hops)
            .scan(1.0, |penalty, _| {
                let current = *penalty;
                *penalty *= config.pip_penalty;
                Some(current)
            })
            .collect();
        Self {
            costs,
            must_leave_cluster_cost: config.must_leave_cluster_cost,
            reserve_bel_penalty: config.reserve_bel_penalty,
            leave_site_penalty: config.leave_site_penalty,
            pip_penalties,
            complexity: HashMap::new(),
            reserve: TransactionalMap::new(),
            queue: None,
            queue_stack: Vec::new(),
        }
    }

    /// Current reservation cost of `bel`.
    pub fn reserve_cost(&self, bel: BelId) -> f64 {
        self.reserve.get(&bel).copied().unwrap_or(0.0)
    }

    /// Total cost of anchoring `cell` at `anchor`; infinite when a required
    /// BEL is taken or an internal connection cannot be made.
    pub fn calc_cost(&self, view: &ClusterView<'_>, cell: CellId, anchor: BelId) -> PackResult<f64> {
        let lib = view.library.cell(view.design.cell(cell).lib);
        let Some(bels) = lib.required_bels(view.template, anchor) else {
            return Ok(f64::INFINITY);
        };
        let mut cost = 0.0;
        for bel in bels {
            if view.cluster.is_bel_occupied(bel) {
                return Ok(f64::INFINITY);
            }
            let kind = &view.template.bel(bel).kind;
            let base = self.costs.get(&lib.name, kind).ok_or_else(|| {
                InternalError::new(format!("no BEL cost for {} on {kind}", lib.name))
            })?;
            let routing = self.routing_cost(view, cell, bel);
            if routing.is_infinite() {
                return Ok(f64::INFINITY);
            }
            cost += base + self.reserve_cost(bel) + routing;
        }
        Ok(cost)
    }

    fn routing_cost(&self, view: &ClusterView<'_>, cell: CellId, bel: BelId) -> f64 {
        let design = view.design;
        let lib = view.library.cell(design.cell(cell).lib);
        let bel_data = view.template.bel(bel);
        let mut cost = 0.0;
        for &pin_id in &design.cell(cell).pins {
            let pin = design.pin(pin_id);
            let Some(net_id) = pin.net else {
                continue;
            };
            let net = design.net(net_id);
            if net.is_clock() {
                continue;
            }
            let bel_pins: Vec<Ident> = lib
                .possible_bel_pins(bel_data, pin.name)
                .into_iter()
                .filter(|&p| bel_data.pin_direction(p).is_some())
                .collect();
            if bel_pins.is_empty() {
                continue;
            }

            let mut must_leave = false;
            for &other_id in &net.pins {
                let other = design.pin(other_id);
                if other_id == pin_id || other.cell == cell || (pin.is_input() && other.is_input()) {
                    continue;
                }
                if let Some(other_bel) = view.cluster.location_of(other.cell) {
                    match self.best_connection(view, pin, bel, &bel_pins, other, other_bel) {
                        Some(c) => cost += c,
                        None => return f64::INFINITY,
                    }
                } else {
                    let oc = design.cell(other.cell);
                    if oc.valid || oc.cluster.is_some() {
                        must_leave = true;
                    }
                }
            }
            if must_leave {
                cost += self.must_leave_cluster_cost;
            }
        }
        cost
    }

    /// Cheapest template connection between `pin` on `bel` and `other` on
    /// `other_bel`.
    fn best_connection(
        &self,
        view: &ClusterView<'_>,
        pin: &PackPin,
        bel: BelId,
        bel_pins: &[Ident],
        other: &PackPin,
        other_bel: BelId,
    ) -> Option<f64> {
        let other_lib = view.library.cell(view.design.cell(other.cell).lib);
        let other_pins = other_lib.possible_bel_pins(view.template.bel(other_bel), other.name);
        let (src_bel, src_pins, sink_bel, sink_pins) = if pin.is_input() {
            (other_bel, other_pins.as_slice(), bel, bel_pins)
        } else {
            (bel, bel_pins, other_bel, other_pins.as_slice())
        };
        src_pins
            .iter()
            .flat_map(|&p| view.template.sinks_of_source(BelPinRef::new(src_bel, p)))
            .filter(|cc| cc.pin.bel == sink_bel && sink_pins.contains(&cc.pin.pin))
            .map(|cc| self.connection_cost(cc))
            .min_by(f64::total_cmp)
    }

    fn connection_cost(&self, cc: &ClusterConnection) -> f64 {
        let mut cost = -1.0;
        if !cc.within_site {
            cost *= self.leave_site_penalty;
        }
        let hops = (cc.distance as usize).min(self.pip_penalties.len() - 1);
        cost * self.pip_penalties[hops]
    }

    fn reserve_neighbours(&mut self, connections: Vec<BelId>) {
        for bel in connections {
            let cost = self.reserve_cost(bel) + self.reserve_bel_penalty;
            self.reserve.put(bel, cost);
        }
    }
}

impl BelSelector for ShortestRouteBelSelector {
    fn init_cluster(&mut self, template: &ClusterTemplate) {
        self.cleanup_cluster();
        for bel in template.bels() {
            self.complexity.insert(bel.id, bel.pin_count());
            self.reserve.put(bel.id, 0.0);
        }
    }

    fn init_cell(
        &mut self,
        view: &ClusterView<'_>,
        cell: CellId,
        forced: Option<&BTreeSet<BelId>>,
    ) -> PackResult<()> {
        let lib = view.library.cell(view.design.cell(cell).lib);
        let mut queue = BinaryHeap::new();
        for anchor in lib.possible_anchors(view.template) {
            if forced.is_some_and(|f| !f.contains(&anchor)) {
                continue;
            }
            let cost = self.calc_cost(view, cell, anchor)?;
            if cost.is_finite() {
                queue.push(BelCandidate {
                    cost,
                    complexity: self.complexity.get(&anchor).copied().unwrap_or(0),
                    bel: anchor,
                });
            }
        }
        self.queue = Some(queue);
        Ok(())
    }

    fn next_bel(&mut self) -> Option<BelId> {
        self.queue.as_mut()?.pop().map(|c| c.bel)
    }

    fn commit_bels(&mut self, template: &ClusterTemplate, bels: &[BelId]) {
        self.queue_stack.push(self.queue.take());
        self.reserve.checkpoint();
        for &bel in bels {
            let data = template.bel(bel);
            let mut near = Vec::new();
            for &src in &data.sources {
                near.extend(
                    template
                        .sinks_of_source(BelPinRef::new(bel, src))
                        .iter()
                        .filter(|cc| cc.within_site)
                        .map(|cc| cc.pin.bel),
                );
            }
            for &sink in &data.sinks {
                near.extend(
                    template
                        .sources_of_sink(BelPinRef::new(bel, sink))
                        .iter()
                        .filter(|cc| cc.within_site)
                        .map(|cc| cc.pin.bel),
                );
            }
            self.reserve_neighbours(near);
        }
    }

    fn revert_to_last_commit(&mut self) {
        self.queue = None;
    }

    fn roll_back_last_commit(&mut self) {
        if let Some(queue) = self.queue_stack.pop() {
            self.queue = queue;
            self.reserve.rollback();
        }
    }

    fn cleanup_cluster(&mut self) {
        self.complexity.clear();
        self.reserve.clear();
        self.queue = None;
        self.queue_stack.clear();
    }

    fn depth(&self) -> usize {
        self.queue_stack.len()
    }
}
