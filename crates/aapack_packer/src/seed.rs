//! Choosing the cell that founds each new cluster.

use crate::cluster::Cluster;
use crate::design::PackDesign;
use crate::ids::CellId;
use aapack_common::{InternalError, PackResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Supplies cluster seeds to the packer.
pub trait SeedSelector {
    /// Builds the selection pools from `cells`. Unpackable cells are ignored.
    fn init(&mut self, design: &PackDesign, cells: &[CellId]);

    /// The next seed, or `None` when no packable cell remains.
    fn next_seed(&mut self, design: &PackDesign) -> Option<CellId>;

    /// Drops the cells of a committed cluster from the pools.
    fn commit_cluster(&mut self, design: &PackDesign, cluster: &Cluster) -> PackResult<()>;
}

/// Prefers cells with the most inputs driven from outside the cell.
///
/// Cells linked by carry connections to an already committed cluster jump
/// the queue so a chain is finished before unrelated logic claims the
/// neighbouring sites.
#[derive(Debug, Default)]
pub struct HighestInputSeedSelector {
    buckets: BTreeMap<usize, Vec<CellId>>,
    bucket_of: HashMap<CellId, usize>,
    carry_queue: VecDeque<CellId>,
    queued: BTreeSet<CellId>,
}

impl HighestInputSeedSelector {
    /// Creates an empty selector.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Input pins that are unconnected or driven by another cell.
pub fn external_input_count(design: &PackDesign, cell: CellId) -> usize {
    design
        .cell(cell)
        .pins
        .iter()
        .map(|&p| design.pin(p))
        .filter(|pin| pin.is_input())
        .filter(|pin| match pin.net {
            Some(net) => design.source_cell(net) != Some(cell),
            None => true,
        })
        .count()
}

/// Distinct nets of `cell` that also touch some other cell.
pub fn exposed_pin_count(design: &PackDesign, cell: CellId) -> usize {
    let nets: BTreeSet<_> = design
        .cell(cell)
        .pins
        .iter()
        .filter_map(|&p| design.pin(p).net)
        .collect();
    nets.into_iter()
        .filter(|&net| {
            design
                .net(net)
                .pins
                .iter()
                .any(|&p| design.pin(p).cell != cell)
        })
        .count()
}

impl SeedSelector for HighestInputSeedSelector {
    fn init(&mut self, design: &PackDesign, cells: &[CellId]) {
        *self = Self::default();
        for &cell in cells {
            if !design.cell(cell).packable {
                continue;
            }
            let inputs = external_input_count(design, cell);
            self.buckets.entry(inputs).or_default().push(cell);
            self.bucket_of.insert(cell, inputs);
        }
        for bucket in self.buckets.values_mut() {
            bucket.sort_by_cached_key(|&c| exposed_pin_count(design, c));
        }
    }

    fn next_seed(&mut self, design: &PackDesign) -> Option<CellId> {
        while let Some(cell) = self.carry_queue.pop_front() {
            self.queued.remove(&cell);
            let c = design.cell(cell);
            if c.packable && c.cluster.is_none() {
                return Some(cell);
            }
        }
        self.buckets
            .values()
            .rev()
            .find_map(|bucket| bucket.first().copied())
    }

    fn commit_cluster(&mut self, design: &PackDesign, cluster: &Cluster) -> PackResult<()> {
        for cell in cluster.cells() {
            let inputs = self.bucket_of.remove(&cell).ok_or_else(|| {
                InternalError::new(format!(
                    "seed selector has no record of cell {}",
                    design.cell(cell).name
                ))
            })?;
            if let Some(bucket) = self.buckets.get_mut(&inputs) {
                bucket.retain(|&c| c != cell);
                if bucket.is_empty() {
                    self.buckets.remove(&inputs);
                }
            }
            if self.queued.remove(&cell) {
                self.carry_queue.retain(|&c| c != cell);
            }
        }
        for cell in cluster.cells() {
            for conn in design.cell(cell).carry_connections() {
                let end = conn.end_cell;
                if design.cell(end).cluster.is_none() && self.queued.insert(end) {
                    self.carry_queue.push_back(end);
                }
            }
        }
        Ok(())
    }
}
