//! Both halves of a fractured LUT must hold the same cell type.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::ids::CellId;

/// Factory for [`LutMemberConsistency`].
#[derive(Debug, Default)]
pub struct LutMemberConsistencyFactory;

impl LutMemberConsistencyFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl PackRuleFactory for LutMemberConsistencyFactory {
    fn name(&self) -> &'static str {
        "lut_member_consistency"
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(LutMemberConsistency)
    }
}

/// Rejects a 5LUT/6LUT pair holding two different library types, unless one
/// of them is a constant driver.
#[derive(Debug)]
pub struct LutMemberConsistency;

impl PackRule for LutMemberConsistency {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        let template = ctx.template();
        for &cell in changed {
            let Some(bel) = ctx.bel_of(cell) else { continue };
            let Some(slot) = bel.lut_slot() else { continue };
            let Some(partner_bel) = template.find_bel(bel.site_index, &slot.partner_name()) else {
                continue;
            };
            let Some(partner) = ctx.cluster.cell_at_bel(partner_bel) else { continue };
            if partner == cell {
                continue;
            }
            let lib = ctx.env.library.cell(ctx.design.cell(cell).lib);
            let partner_lib = ctx.env.library.cell(ctx.design.cell(partner).lib);
            if lib.id != partner_lib.id && !lib.constant_source && !partner_lib.constant_source {
                return PackStatus::Infeasible;
            }
        }
        PackStatus::Valid
    }

    fn conditionals(&self, _ctx: &RuleContext<'_>) -> Conditionals {
        Conditionals::new()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {}
}
