//! Routability oracle and the rule wrapping it.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::{Cluster, ClusterView};
use crate::ids::{CellId, NetId};
use aapack_arch::ClusterTemplate;
use std::collections::BTreeSet;

/// Verdict of a [`RoutabilityChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    /// The cluster's nets can be routed.
    Feasible,
    /// Routable once the checker's conditional cells join.
    Conditional,
    /// Cannot be routed.
    Infeasible,
}

impl From<RouteStatus> for PackStatus {
    fn from(status: RouteStatus) -> Self {
        match status {
            RouteStatus::Feasible => PackStatus::Valid,
            RouteStatus::Conditional => PackStatus::Conditional,
            RouteStatus::Infeasible => PackStatus::Infeasible,
        }
    }
}

/// Decides whether a candidate cluster can be routed internally.
///
/// Calls nest: every `checkpoint` is followed by one `check` and later
/// undone by one `rollback`.
pub trait RoutabilityChecker {
    /// Saves the checker state.
    fn checkpoint(&mut self);

    /// Checks the cluster after `changed` were added.
    fn check(&mut self, view: &ClusterView<'_>, changed: &[CellId]) -> RouteStatus;

    /// Cells needed for the last Conditional verdict.
    fn conditionals(&self) -> Conditionals {
        Conditionals::new()
    }

    /// Restores the state saved by the matching `checkpoint`.
    fn rollback(&mut self);
}

/// Counts distinct nets entering the cluster against the template's input
/// capacity. Static nets are free.
#[derive(Debug)]
pub struct InputCapacityChecker {
    capacity: usize,
    used: Vec<usize>,
}

impl InputCapacityChecker {
    /// Creates a checker allowing `capacity` input nets.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity as usize,
            used: Vec::new(),
        }
    }

    /// Input nets counted by the last check.
    pub fn inputs_used(&self) -> usize {
        self.used.last().copied().unwrap_or(0)
    }

    fn input_nets(view: &ClusterView<'_>) -> BTreeSet<NetId> {
        let design = view.design;
        let mut nets = BTreeSet::new();
        for cell in view.cluster.cells() {
            for &pin in &design.cell(cell).pins {
                let pin = design.pin(pin);
                let Some(net) = pin.net.filter(|_| pin.is_input()) else { continue };
                if design.net(net).is_static() {
                    continue;
                }
                let internal = design
                    .source_cell(net)
                    .is_some_and(|src| view.cluster.contains(src));
                if !internal {
                    nets.insert(net);
                }
            }
        }
        nets
    }
}

impl RoutabilityChecker for InputCapacityChecker {
    fn checkpoint(&mut self) {
        let last = self.inputs_used();
        self.used.push(last);
    }

    fn check(&mut self, view: &ClusterView<'_>, _changed: &[CellId]) -> RouteStatus {
        let count = Self::input_nets(view).len();
        if let Some(top) = self.used.last_mut() {
            *top = count;
        }
        if count > self.capacity {
            RouteStatus::Infeasible
        } else {
            RouteStatus::Feasible
        }
    }

    fn rollback(&mut self) {
        self.used.pop();
    }
}

type CheckerBuilder = Box<dyn Fn(&ClusterTemplate) -> Box<dyn RoutabilityChecker>>;

/// Factory for [`Routability`], building one oracle per cluster.
pub struct RoutabilityRuleFactory {
    build: CheckerBuilder,
}

impl RoutabilityRuleFactory {
    /// Uses `build` to create the oracle for each cluster template.
    pub fn new(build: impl Fn(&ClusterTemplate) -> Box<dyn RoutabilityChecker> + 'static) -> Self {
        Self {
            build: Box::new(build),
        }
    }

    /// Factory using [`InputCapacityChecker`].
    pub fn input_capacity() -> Self {
        Self::new(|template| Box::new(InputCapacityChecker::new(template.input_capacity)))
    }
}

impl PackRuleFactory for RoutabilityRuleFactory {
    fn name(&self) -> &'static str {
        "routability"
    }

    fn create_rule(&self, env: PackEnv<'_>, cluster: &Cluster) -> Box<dyn PackRule> {
        let template = env.device.template(cluster.template);
        Box::new(Routability {
            checker: (self.build)(template),
        })
    }
}

/// Feeds every validate to the oracle.
pub struct Routability {
    checker: Box<dyn RoutabilityChecker>,
}

impl PackRule for Routability {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        self.checker.checkpoint();
        self.checker.check(&ctx.view(), changed).into()
    }

    fn conditionals(&self, _ctx: &RuleContext<'_>) -> Conditionals {
        self.checker.conditionals()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {
        self.checker.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::NetKind;
    use crate::fixtures::Fixture;

    #[test]
    fn counts_external_inputs_only() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        let ext = fx.lut("ext", "LUT6");
        fx.wire(a, "O6", &[(b, "A1")]);
        fx.wire(ext, "O6", &[(a, "A1"), (b, "A2")]);
        fx.wire_kind("vcc".into(), NetKind::Vcc, None, &[(a, "A6")]);
        fx.wire_kind("pi".into(), NetKind::Signal, None, &[(b, "A3")]);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");
        fx.place(&mut cluster, b, "B6LUT");

        let view = ClusterView {
            design: &fx.design,
            library: &fx.library,
            template: fx.device.template(fx.slicel),
            cluster: &cluster,
        };
        let mut checker = InputCapacityChecker::new(2);
        checker.checkpoint();
        assert_eq!(checker.check(&view, &[a, b]), RouteStatus::Feasible);
        assert_eq!(checker.inputs_used(), 2);
        checker.rollback();
        assert_eq!(checker.inputs_used(), 0);

        let mut tight = InputCapacityChecker::new(1);
        tight.checkpoint();
        assert_eq!(tight.check(&view, &[a, b]), RouteStatus::Infeasible);
    }

    #[test]
    fn rule_maps_oracle_verdicts() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let ext = fx.lut("ext", "LUT6");
        fx.wire(ext, "O6", &[(a, "A1")]);
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "A6LUT");

        let factory = RoutabilityRuleFactory::new(|_| Box::new(InputCapacityChecker::new(0)));
        let mut rule = factory.create_rule(fx.env(), &cluster);
        let mut ctx = fx.ctx(&cluster);
        assert_eq!(rule.validate(&mut ctx, &[a]), PackStatus::Infeasible);
        rule.revert(&mut ctx);

        let mut rule = RoutabilityRuleFactory::input_capacity().create_rule(ctx.env, &cluster);
        assert_eq!(rule.validate(&mut ctx, &[a]), PackStatus::Valid);
    }
}
