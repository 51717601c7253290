//! Legality rules checked while a cluster is being filled.
//!
//! A [`PackRuleFactory`] lives for the whole packing run and holds whatever
//! it precomputes from the netlist. For every candidate cluster it hands out
//! a fresh [`PackRule`], which the packer validates after each tentative
//! placement and reverts in LIFO order when the placement is undone.

pub mod carry_lookahead;
pub mod carry_source;
pub mod carry_validity;
pub mod lut_members;
pub mod lutram;
pub mod merge_ff;
pub mod routability;
pub mod site_properties;

pub use carry_lookahead::CarryLookAheadFactory;
pub use carry_source::CarryRequiredSourceFactory;
pub use carry_validity::CarryChainValidityFactory;
pub use lut_members::LutMemberConsistencyFactory;
pub use lutram::LutRamValidityFactory;
pub use merge_ff::MergeFfWithSourceFactory;
pub use routability::{
    InputCapacityChecker, RouteStatus, RoutabilityChecker, RoutabilityRuleFactory,
};
pub use site_properties::SitePropertiesFactory;

use crate::cluster::{Cluster, ClusterView};
use crate::design::PackDesign;
use crate::ids::{CellId, ClusterId};
use aapack_arch::{Bel, BelId, CellLibrary, ClusterTemplate, Device};
use aapack_common::Interner;
use aapack_config::RulesConfig;
use std::collections::{BTreeMap, BTreeSet};

/// Verdict of a rule (or of all rules) on the current candidate.
///
/// Variants are ordered from best to worst so [`meet`](Self::meet) is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackStatus {
    /// The cluster is legal as it stands.
    Valid,
    /// Legal only if the listed cells are added on the listed BELs.
    Conditional,
    /// The placement can never be made legal.
    Infeasible,
}

impl PackStatus {
    /// Combines two verdicts; the worse one wins.
    pub fn meet(self, other: PackStatus) -> PackStatus {
        self.max(other)
    }
}

/// Cells that must still join the cluster, with the BELs they may take.
pub type Conditionals = BTreeMap<CellId, BTreeSet<BelId>>;

/// Unions `other` into `into`, cell by cell.
pub fn merge_conditionals(into: &mut Conditionals, other: Conditionals) {
    for (cell, bels) in other {
        into.entry(cell).or_default().extend(bels);
    }
}

/// Read-only inputs shared by every rule.
#[derive(Clone, Copy)]
pub struct PackEnv<'a> {
    /// Device with the cluster templates.
    pub device: &'a Device,
    /// Library cell definitions.
    pub library: &'a CellLibrary,
    /// Interner for pin names.
    pub interner: &'a Interner,
}

/// What a rule sees when it validates or reverts.
pub struct RuleContext<'a> {
    /// Device, library and interner.
    pub env: PackEnv<'a>,
    /// The netlist. Rules only mutate carry-chain counters through it.
    pub design: &'a mut PackDesign,
    /// The candidate cluster.
    pub cluster: &'a Cluster,
}

impl<'a> RuleContext<'a> {
    /// Template of the candidate cluster.
    pub fn template(&self) -> &'a ClusterTemplate {
        self.env.device.template(self.cluster.template)
    }

    /// BEL a cell of the candidate occupies.
    pub fn bel_of(&self, cell: CellId) -> Option<&'a Bel> {
        let template = self.template();
        self.cluster.location_of(cell).map(|b| template.bel(b))
    }

    /// Anchors of `cell` that are still free in the candidate.
    pub fn free_anchors(&self, cell: CellId) -> BTreeSet<BelId> {
        let lib = self.env.library.cell(self.design.cell(cell).lib);
        lib.possible_anchors(self.template())
            .into_iter()
            .filter(|&b| !self.cluster.is_bel_occupied(b))
            .collect()
    }

    /// Borrowed view used by the routability oracle.
    pub fn view(&self) -> ClusterView<'_> {
        ClusterView {
            design: self.design,
            library: self.env.library,
            template: self.template(),
            cluster: self.cluster,
        }
    }
}

/// Per-cluster rule instance.
pub trait PackRule {
    /// Checks the cluster after `changed` were placed. Every call is later
    /// matched by exactly one [`revert`](Self::revert).
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus;

    /// Cells required by the last Conditional verdict.
    fn conditionals(&self, ctx: &RuleContext<'_>) -> Conditionals;

    /// Undoes the most recent validate.
    fn revert(&mut self, ctx: &mut RuleContext<'_>);

    /// Releases state kept outside the rule when the cluster is abandoned.
    fn cleanup(&mut self, _ctx: &mut RuleContext<'_>) {}
}

/// Builds rules and carries state across clusters.
pub trait PackRuleFactory {
    /// Name used in configuration and diagnostics.
    fn name(&self) -> &'static str;

    /// Precomputes from the netlist before packing starts.
    fn init(&mut self, _env: PackEnv<'_>, _design: &PackDesign) {}

    /// Creates the rule instance for a new candidate cluster.
    fn create_rule(&self, env: PackEnv<'_>, cluster: &Cluster) -> Box<dyn PackRule>;

    /// Called once `cluster` is stored in the design with its cells bound.
    fn commit_cluster(&mut self, _env: PackEnv<'_>, _design: &mut PackDesign, _cluster: ClusterId) {
    }
}

/// The stock rule set in registration order, minus disabled rules.
pub fn default_factories(config: &RulesConfig) -> Vec<Box<dyn PackRuleFactory>> {
    let all: Vec<Box<dyn PackRuleFactory>> = vec![
        Box::new(LutMemberConsistencyFactory::new()),
        Box::new(LutRamValidityFactory::new(config.ram_fanout_limit)),
        Box::new(CarryRequiredSourceFactory::new()),
        Box::new(MergeFfWithSourceFactory::new(
            config.merge_types.clone(),
            config.ff_types.clone(),
        )),
        Box::new(CarryChainValidityFactory::new()),
        Box::new(CarryLookAheadFactory::new(config.slicem_source_types.clone())),
        Box::new(SitePropertiesFactory::new()),
        Box::new(RoutabilityRuleFactory::input_capacity()),
    ];
    all.into_iter()
        .filter(|f| config.is_enabled(f.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aapack_config::RULE_NAMES;

    #[test]
    fn meet_prefers_worse_status() {
        use PackStatus::*;
        assert_eq!(Valid.meet(Conditional), Conditional);
        assert_eq!(Conditional.meet(Valid), Conditional);
        assert_eq!(Conditional.meet(Infeasible), Infeasible);
        assert_eq!(Valid.meet(Valid), Valid);
    }

    #[test]
    fn merge_unions_bel_sets() {
        let cell = CellId::from_raw(3);
        let mut a = Conditionals::new();
        a.insert(cell, [BelId::from_raw(0)].into());
        let mut b = Conditionals::new();
        b.insert(cell, [BelId::from_raw(1)].into());
        b.insert(CellId::from_raw(4), BTreeSet::new());
        merge_conditionals(&mut a, b);
        assert_eq!(a[&cell].len(), 2);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn factory_order_matches_rule_names() {
        let names: Vec<_> = default_factories(&RulesConfig::default())
            .iter()
            .map(|f| f.name())
            .collect();
        assert_eq!(names, RULE_NAMES);
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let config = RulesConfig {
            disabled: vec!["routability".into(), "site_properties".into()],
            ..RulesConfig::default()
        };
        let names: Vec<_> = default_factories(&config).iter().map(|f| f.name()).collect();
        assert_eq!(names.len(), RULE_NAMES.len() - 2);
        assert!(!names.contains(&"routability"));
    }
}
