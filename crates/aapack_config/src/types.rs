//! Configuration types deserialized from `pack.toml`.

use serde::Deserialize;

/// Names accepted in `[rules] disabled`, in registration order.
pub const RULE_NAMES: &[&str] = &[
    "lut_member_consistency",
    "lutram_validity",
    "carry_required_source",
    "merge_ff_with_source",
    "carry_chain_validity",
    "carry_chain_lookahead",
    "site_properties",
    "routability",
];

/// The top-level packer configuration parsed from `pack.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct PackConfig {
    /// Device calibration data locations.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Gain constants for cluster growth.
    #[serde(default)]
    pub cell_selector: CellSelectorConfig,
    /// Cost constants for BEL selection.
    #[serde(default)]
    pub bel_selector: BelSelectorConfig,
    /// Rule selection and rule parameters.
    #[serde(default)]
    pub rules: RulesConfig,
    /// Cluster scoring weights.
    #[serde(default)]
    pub packer: PackerConfig,
}

/// Paths to device calibration data.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceConfig {
    /// Path to the BEL cost table, relative to the configuration directory.
    pub cost_table: Option<String>,
}

/// Gain constants used by the exposed-nets cell selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CellSelectorConfig {
    /// Nets with more pins than this are ignored when computing gains.
    pub high_fanout_limit: usize,
    /// Penalty for a net with every pin outside the cluster.
    pub fully_exposed_net_penalty: f64,
    /// Penalty for a net with a single pin outside the cluster.
    pub weakly_exposed_net_penalty: f64,
    /// Bonus for a net completely absorbed by the cluster.
    pub absorbed_net_bonus: f64,
    /// Number of exposed pins over which the exposure penalty is spread.
    pub pin_on_net_penalty_cutoff: u32,
    /// Bonus per pin shared with the cluster once a net is nearly absorbed.
    pub shared_pin_bonus: f64,
    /// Penalty per dangling pin.
    pub dangling_pin_penalty: f64,
    /// Remaining-pin count below which dangling pins stop being penalized.
    pub dangling_pins_cutoff: u32,
    /// Upper bound of the percent-shared-pins term.
    pub percent_shared_pins_max: f64,
    /// Lower bound of the percent-shared-pins term.
    pub percent_shared_pins_min: f64,
}

impl Default for CellSelectorConfig {
    fn default() -> Self {
        Self {
            high_fanout_limit: 200,
            fully_exposed_net_penalty: -100.0,
            weakly_exposed_net_penalty: -75.0,
            absorbed_net_bonus: 25.0,
            pin_on_net_penalty_cutoff: 8,
            shared_pin_bonus: 0.1,
            dangling_pin_penalty: -0.1,
            dangling_pins_cutoff: 8,
            percent_shared_pins_max: 1.0,
            percent_shared_pins_min: -1.0,
        }
    }
}

/// Cost constants used by the shortest-route BEL selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BelSelectorConfig {
    /// Added once per pin whose net must leave the cluster.
    pub must_leave_cluster_cost: f64,
    /// Added to BELs that share an intra-site connection with a committed BEL.
    pub reserve_bel_penalty: f64,
    /// Multiplier applied to connections that leave the site.
    pub leave_site_penalty: f64,
    /// Per-hop decay of a connection's benefit.
    pub pip_penalty: f64,
    /// Hop count beyond which the decay no longer grows.
    pub max_pip_hops: u32,
}

impl Default for BelSelectorConfig {
    fn default() -> Self {
        Self {
            must_leave_cluster_cost: 2.0,
            reserve_bel_penalty: 0.02,
            leave_site_penalty: 0.5,
            pip_penalty: 0.9,
            max_pip_hops: 9,
        }
    }
}

/// Rule selection and parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules to leave out of the validation pipeline.
    pub disabled: Vec<String>,
    /// Library types that merge with a flip-flop they solely drive.
    pub merge_types: Vec<String>,
    /// Library types treated as flip-flops by the merge rule.
    pub ff_types: Vec<String>,
    /// Library types whose output on a carry select pin forces SLICEM.
    pub slicem_source_types: Vec<String>,
    /// Nets above this fan-out are ignored when pairing LUT-RAM D slots.
    pub ram_fanout_limit: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            disabled: Vec::new(),
            merge_types: owned(&[
                "CARRY4", "LUT5", "LUT6", "SRL16", "SRL32", "SPRAM32", "SPRAM64", "DPRAM32",
                "DPRAM64", "F7MUX", "F8MUX",
            ]),
            ff_types: owned(&["FF_INIT", "REG_INIT"]),
            slicem_source_types: owned(&[
                "SRL32", "SRL16", "SPRAM32", "SPRAM64", "DPRAM32", "DPRAM64",
            ]),
            ram_fanout_limit: 100,
        }
    }
}

impl RulesConfig {
    /// Returns `true` unless the named rule appears in `disabled`.
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d == name)
    }
}

/// Weights of the cluster cost `1 / (bel * wb + pin * wp + avail * wa)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Weight of the fraction of template BELs in use.
    pub bel_utilization_factor: f64,
    /// Weight of the fraction of template pins in use.
    pub pin_utilization_factor: f64,
    /// Weight of the remaining capacity of the template.
    pub remaining_types_factor: f64,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            bel_utilization_factor: 0.5,
            pin_utilization_factor: 0.2,
            remaining_types_factor: 0.3,
        }
    }
}
