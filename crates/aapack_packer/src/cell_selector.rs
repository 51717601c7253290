//! Ranking cells for inclusion in the cluster under construction.
//!
//! Gains reward cells that would pull whole nets inside the cluster. Each
//! commit adjusts the gain of every neighbour of the committed cells; the
//! adjustments live in a [`TransactionalMap`] so a rollback restores them
//! exactly.

use crate::design::{PackDesign, PackNet};
use crate::ids::{CellId, NetId};
use crate::transactional::TransactionalMap;
use aapack_config::CellSelectorConfig;
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Proposes the next cell to try in the active cluster.
pub trait CellSelector {
    /// Computes standalone gains for `cells`.
    fn init(&mut self, design: &PackDesign, cells: &[CellId]);

    /// Starts a new cluster session.
    fn init_cluster(&mut self);

    /// Pops the best feasible cell and marks it.
    fn next_cell(&mut self, design: &PackDesign) -> Option<CellId>;

    /// Records `cells` as added to the cluster and rebuilds the feasible set
    /// from `conditionals`, or from every marked cell when `None`.
    fn commit_cells(
        &mut self,
        design: &PackDesign,
        cells: &[CellId],
        conditionals: Option<&BTreeSet<CellId>>,
    );

    /// Undoes the most recent `commit_cells`.
    fn roll_back_last_commit(&mut self);

    /// Ends the cluster session, dropping gains and marks.
    fn cleanup_cluster(&mut self);

    /// Number of outstanding commits.
    fn depth(&self) -> usize;
}

/// Gain constants. Defaults come from [`CellSelectorConfig::default`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainWeights {
    /// Bonus a net earns once every pin is absorbed.
    pub absorbed: f64,
    /// Penalty of a net with few pins outside the cluster.
    pub weakly_exposed: f64,
    /// Per-pin penalty between weakly and fully exposed.
    pub exposed_pin: f64,
    /// Pins counted towards the exposed-pin penalty.
    pub pin_penalty_cutoff: u32,
    /// Bonus per pin shared with the cluster.
    pub shared_pin: f64,
    /// Penalty per pin left outside.
    pub dangling_pin: f64,
    /// Remaining pins below which the dangling terms apply.
    pub dangling_cutoff: u32,
    /// Upper bound of the percent-dangling term.
    pub percent_max: f64,
    /// Lower bound of the percent-dangling term.
    pub percent_min: f64,
    /// Nets with more pins than this are ignored.
    pub high_fanout_limit: usize,
}

impl From<&CellSelectorConfig> for GainWeights {
    fn from(c: &CellSelectorConfig) -> Self {
        Self {
            absorbed: c.absorbed_net_bonus,
            weakly_exposed: c.weakly_exposed_net_penalty,
            exposed_pin: (c.fully_exposed_net_penalty - c.weakly_exposed_net_penalty)
                / f64::from(c.pin_on_net_penalty_cutoff),
            pin_penalty_cutoff: c.pin_on_net_penalty_cutoff,
            shared_pin: c.shared_pin_bonus,
            dangling_pin: c.dangling_pin_penalty,
            dangling_cutoff: c.dangling_pins_cutoff,
            percent_max: c.percent_shared_pins_max,
            percent_min: c.percent_shared_pins_min,
            high_fanout_limit: c.high_fanout_limit,
        }
    }
}

impl Default for GainWeights {
    fn default() -> Self {
        Self::from(&CellSelectorConfig::default())
    }
}

impl GainWeights {
    /// Clock, constant and high-fanout nets do not contribute to gains.
    pub fn is_filtered(&self, net: &PackNet) -> bool {
        net.is_clock() || net.is_static() || net.pin_count() > self.high_fanout_limit
    }

    /// Standalone gain of the `k`-th pin (1-based) a cell has on a net of
    /// `n` pins.
    pub fn initial_pin_gain(&self, n: usize, k: usize) -> f64 {
        let mut gain = 0.0;
        if k == 1 {
            gain += if n < 2 {
                self.absorbed
            } else {
                self.weakly_exposed + (n - 2).min(self.pin_penalty_cutoff as usize) as f64 * self.exposed_pin
            };
            gain += (n.saturating_sub(1)).min(self.dangling_cutoff as usize) as f64 * self.dangling_pin;
            if n >= 2 {
                gain += self.percent_min;
            }
        } else {
            gain -= self.exposed_pin;
            if k == n {
                gain += self.absorbed - self.weakly_exposed;
            }
            if n - k < self.dangling_cutoff as usize {
                gain += self.shared_pin - self.dangling_pin;
            }
            gain += self.percent_step(n);
        }
        gain
    }

    /// Exposure change when `total` of the net's `n` pins are now accounted
    /// for.
    pub fn absorb_exposure(&self, n: usize, total: usize) -> f64 {
        if total == n {
            self.absorbed - self.weakly_exposed
        } else {
            -self.exposed_pin
        }
    }

    /// Dangling-pin change when `total` of `n` pins are accounted for.
    pub fn absorb_dangling(&self, n: usize, total: usize) -> f64 {
        if n.saturating_sub(total) < self.dangling_cutoff as usize {
            self.shared_pin - self.dangling_pin
        } else {
            0.0
        }
    }

    /// Percent-dangling step of a net with `n` pins. Single-pin nets add 0.
    pub fn percent_step(&self, n: usize) -> f64 {
        if n < 2 {
            0.0
        } else {
            (self.percent_max - self.percent_min) / (n - 1) as f64
        }
    }

    /// Total gain change for absorbing one more pin.
    pub fn absorb_gain(&self, n: usize, total: usize) -> f64 {
        self.absorb_exposure(n, total) + self.absorb_dangling(n, total) + self.percent_step(n)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    gain: f64,
    seq: usize,
    cell: CellId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Gain-driven selector favouring cells that absorb exposed nets.
#[derive(Debug, Default)]
pub struct ExposedNetsCellSelector {
    weights: GainWeights,
    initial_gains: HashMap<CellId, f64>,
    pins_in_cell: HashMap<CellId, HashMap<NetId, u32>>,
    /// A cell is marked exactly when it has an entry here.
    gains: TransactionalMap<CellId, f64>,
    pins_in_cluster: TransactionalMap<NetId, u32>,
    feasible: Option<BinaryHeap<Candidate>>,
    feasible_stack: Vec<Option<BinaryHeap<Candidate>>>,
}

impl ExposedNetsCellSelector {
    /// Creates a selector with the given weights.
    pub fn new(weights: GainWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    /// Current gain of a marked cell.
    pub fn gain(&self, cell: CellId) -> Option<f64> {
        self.gains.get(&cell).copied()
    }

    /// Standalone gain computed by `init`.
    pub fn initial_gain(&self, cell: CellId) -> Option<f64> {
        self.initial_gains.get(&cell).copied()
    }

    fn standalone_gain(&self, design: &PackDesign, cell: CellId) -> (f64, HashMap<NetId, u32>) {
        let mut seen: HashMap<NetId, u32> = HashMap::new();
        let mut gain = 0.0;
        for &pin in &design.cell(cell).pins {
            let Some(net_id) = design.pin(pin).net else {
                continue;
            };
            let net = design.net(net_id);
            if self.weights.is_filtered(net) {
                continue;
            }
            let k = seen.entry(net_id).or_insert(0);
            *k += 1;
            gain += self.weights.initial_pin_gain(net.pin_count(), *k as usize);
        }
        (gain, seen)
    }

    fn update_gains(&mut self, design: &PackDesign, cell: CellId) {
        for &pin in &design.cell(cell).pins {
            let Some(net_id) = design.pin(pin).net else {
                continue;
            };
            let net = design.net(net_id);
            if self.weights.is_filtered(net) {
                continue;
            }
            let in_cluster = self.pins_in_cluster.get(&net_id).copied().unwrap_or(0) + 1;
            self.pins_in_cluster.put(net_id, in_cluster);

            for &other_pin in &net.pins {
                let other = design.pin(other_pin).cell;
                if other_pin == pin || other == cell || !design.cell(other).valid {
                    continue;
                }
                let Some(in_cell) = self.pins_in_cell.get(&other).and_then(|m| m.get(&net_id))
                else {
                    continue;
                };
                let total = (in_cluster + in_cell) as usize;
                let gain = self
                    .gains
                    .get(&other)
                    .or_else(|| self.initial_gains.get(&other))
                    .copied()
                    .unwrap_or(0.0);
                self.gains
                    .put(other, gain + self.weights.absorb_gain(net.pin_count(), total));
            }
        }
    }
}

impl CellSelector for ExposedNetsCellSelector {
    fn init(&mut self, design: &PackDesign, cells: &[CellId]) {
        self.initial_gains.clear();
        self.pins_in_cell.clear();
        for &cell in cells {
            let (gain, pins) = self.standalone_gain(design, cell);
            self.initial_gains.insert(cell, gain);
            self.pins_in_cell.insert(cell, pins);
        }
    }

    fn init_cluster(&mut self) {
        self.cleanup_cluster();
    }

    fn next_cell(&mut self, design: &PackDesign) -> Option<CellId> {
        let heap = self.feasible.as_mut()?;
        while let Some(candidate) = heap.pop() {
            let cell = candidate.cell;
            if !design.cell(cell).valid {
                continue;
            }
            if !self.gains.contains_key(&cell) {
                let initial = self.initial_gains.get(&cell).copied().unwrap_or(0.0);
                self.gains.put(cell, initial);
            }
            return Some(cell);
        }
        None
    }

    fn commit_cells(
        &mut self,
        design: &PackDesign,
        cells: &[CellId],
        conditionals: Option<&BTreeSet<CellId>>,
    ) {
        self.feasible_stack.push(self.feasible.clone());
        self.gains.checkpoint();
        self.pins_in_cluster.checkpoint();

        for &cell in cells {
            self.update_gains(design, cell);
        }

        let pool: Vec<CellId> = match conditionals {
            Some(conds) => conds.iter().copied().collect(),
            None => self.gains.keys().copied().collect(),
        };
        let heap = pool
            .into_iter()
            .filter(|&c| design.cell(c).valid)
            .enumerate()
            .map(|(seq, cell)| Candidate {
                gain: self
                    .gains
                    .get(&cell)
                    .or_else(|| self.initial_gains.get(&cell))
                    .copied()
                    .unwrap_or(0.0),
                seq,
                cell,
            })
            .collect();
        self.feasible = Some(heap);
    }

    fn roll_back_last_commit(&mut self) {
        if let Some(previous) = self.feasible_stack.pop() {
            self.feasible = previous;
            self.gains.rollback();
            self.pins_in_cluster.rollback();
        }
    }

    fn cleanup_cluster(&mut self) {
        self.gains.clear();
        self.pins_in_cluster.clear();
        self.feasible = None;
        self.feasible_stack.clear();
    }

    fn depth(&self) -> usize {
        self.feasible_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::NetKind;
    use crate::fixtures::Fixture;

    fn setup(fx: &Fixture) -> ExposedNetsCellSelector {
        let cells: Vec<CellId> = fx.design.cells().map(|c| c.id).collect();
        let mut sel = ExposedNetsCellSelector::new(GainWeights::default());
        sel.init(&fx.design, &cells);
        sel.init_cluster();
        sel
    }

    #[test]
    fn default_weights_match_constants() {
        let w = GainWeights::default();
        assert_eq!(w.exposed_pin, -3.125);
        assert_eq!(w.weakly_exposed, -75.0);
        assert_eq!(w.absorbed, 25.0);
        assert_eq!(w.percent_step(1), 0.0);
        assert_eq!(w.percent_step(3), 1.0);
    }

    #[test]
    fn absorbing_two_pin_net() {
        let w = GainWeights::default();
        assert_eq!(w.absorb_exposure(2, 2), -w.weakly_exposed + w.absorbed);

        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        fx.wire(a, "O6", &[(b, "A1")]);
        let mut sel = setup(&fx);
        let before = sel.initial_gain(b).unwrap();
        assert_eq!(before, -75.0 - 0.1 - 1.0);

        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");
        sel.commit_cells(&fx.design, &[a], None);
        let delta = sel.gain(b).unwrap() - before;
        assert!((delta - (100.0 + 0.2 + 2.0)).abs() < 1e-9);
        assert_eq!(sel.next_cell(&fx.design), Some(b));
        assert_eq!(sel.next_cell(&fx.design), None);
    }

    #[test]
    fn full_absorption_beats_partial() {
        let w = GainWeights::default();
        let exposure = |n: usize, inside: usize| -> f64 {
            (1..=inside)
                .map(|k| {
                    let mut g = w.initial_pin_gain(n, k);
                    if k > 1 {
                        g -= w.absorb_dangling(n, k) + w.percent_step(n);
                    } else {
                        g -= (n - 1).min(8) as f64 * w.dangling_pin + w.percent_min;
                    }
                    g
                })
                .sum()
        };
        for n in 2..=24 {
            assert!(exposure(n, n) > exposure(n, n - 1), "n = {n}");
        }
    }

    #[test]
    fn rollback_restores_gains_bit_for_bit() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        let c = fx.lut("c", "LUT6");
        let d = fx.ff("d");
        fx.wire(a, "O6", &[(b, "A1"), (c, "A1"), (d, "D")]);
        fx.wire(c, "O6", &[(b, "A2"), (b, "A3")]);
        let mut sel = setup(&fx);

        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");
        sel.commit_cells(&fx.design, &[a], None);
        let snapshot: Vec<(CellId, u64)> = [b, c, d]
            .iter()
            .map(|&x| (x, sel.gain(x).unwrap().to_bits()))
            .collect();

        assert_eq!(sel.next_cell(&fx.design), best_of(&sel, &[b, c, d]));
        fx.place(&mut cluster, c, "B6LUT");
        sel.commit_cells(&fx.design, &[c], None);
        assert_ne!(sel.gain(b).unwrap().to_bits(), snapshot[0].1);
        assert_eq!(sel.depth(), 2);

        sel.roll_back_last_commit();
        fx.design.cell_mut(c).valid = true;
        for (cell, bits) in snapshot {
            assert_eq!(sel.gain(cell).unwrap().to_bits(), bits);
        }
        assert_eq!(sel.depth(), 1);
        sel.roll_back_last_commit();
        assert_eq!(sel.gain(b), None);
        assert_eq!(sel.depth(), 0);
    }

    fn best_of(sel: &ExposedNetsCellSelector, cells: &[CellId]) -> Option<CellId> {
        cells
            .iter()
            .copied()
            .max_by(|x, y| sel.gain(*x).unwrap().total_cmp(&sel.gain(*y).unwrap()))
    }

    #[test]
    fn filtered_nets_are_ignored() {
        let mut fx = Fixture::new();
        let a = fx.ff("a");
        let b = fx.ff("b");
        fx.wire_kind("clk".into(), NetKind::Clock, None, &[(a, "CK"), (b, "CK")]);
        let sel = setup(&fx);
        assert_eq!(sel.initial_gain(a), Some(0.0));
    }

    #[test]
    fn conditionals_restrict_feasible_set() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        let c = fx.ff("c");
        fx.wire(a, "O6", &[(b, "A1"), (c, "D")]);
        let mut sel = setup(&fx);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");
        let only_c: BTreeSet<CellId> = [c].into_iter().collect();
        sel.commit_cells(&fx.design, &[a], Some(&only_c));
        assert_eq!(sel.next_cell(&fx.design), Some(c));
        assert_eq!(sel.next_cell(&fx.design), None);
    }

    #[test]
    fn cleanup_drops_marks() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        fx.wire(a, "O6", &[(b, "A1")]);
        let mut sel = setup(&fx);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");
        sel.commit_cells(&fx.design, &[a], None);
        sel.cleanup_cluster();
        assert_eq!(sel.gain(b), None);
        assert_eq!(sel.depth(), 0);
    }
}
