//! Scoring finished candidate clusters.

use crate::cluster::ClusterView;
use aapack_arch::{Device, TemplateId};
use aapack_config::PackerConfig;
use std::collections::HashMap;

/// Scores clusters by BEL use, pin use and how much of their template is
/// left, and tracks the remaining instances of every template.
///
/// The cost is `1 / (bel_util * wb + pin_util * wp + availability * wa)`,
/// so fuller clusters on plentiful templates are cheaper.
#[derive(Debug, Clone)]
pub struct ClusterCostCalculator {
    bel_weight: f64,
    pin_weight: f64,
    remaining_weight: f64,
    remaining: HashMap<TemplateId, u32>,
    max_remaining: u32,
}

impl ClusterCostCalculator {
    /// Creates a calculator with the configured weights.
    pub fn new(config: &PackerConfig) -> Self {
        Self {
            bel_weight: config.bel_utilization_factor,
            pin_weight: config.pin_utilization_factor,
            remaining_weight: config.remaining_types_factor,
            remaining: HashMap::new(),
            max_remaining: 0,
        }
    }

    /// Resets the remaining counts to each template's instance count.
    pub fn init(&mut self, device: &Device) {
        self.remaining = device.templates().map(|t| (t.id, t.instances)).collect();
        self.max_remaining = self.remaining.values().copied().max().unwrap_or(0);
    }

    /// Instances of `template` still available.
    pub fn remaining(&self, template: TemplateId) -> u32 {
        self.remaining.get(&template).copied().unwrap_or(0)
    }

    /// Takes one instance of `template`.
    pub fn use_instance(&mut self, template: TemplateId) {
        if let Some(count) = self.remaining.get_mut(&template) {
            *count = count.saturating_sub(1);
        }
    }

    /// Cost of the cluster in `view`; lower is better.
    pub fn cost(&self, view: &ClusterView<'_>) -> f64 {
        let bel_util = ratio(view.cluster.cell_count(), view.template.bel_count());
        let connected = view
            .cluster
            .cells()
            .flat_map(|c| view.design.cell(c).pins.iter())
            .filter(|&&p| view.design.pin(p).net.is_some())
            .count();
        let pin_util = ratio(connected, view.template.total_pin_count());
        let availability = ratio(
            self.remaining(view.cluster.template) as usize,
            self.max_remaining as usize,
        );
        1.0 / (bel_util * self.bel_weight
            + pin_util * self.pin_weight
            + availability * self.remaining_weight)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
