//! Keeps a CARRY4 with an external carry-init next to its DI0 driver.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::design::PackDesign;
use crate::ids::CellId;
use crate::transactional::TransactionalMap;
use std::collections::HashMap;
use std::rc::Rc;

/// Factory for [`CarryRequiredSource`].
#[derive(Debug, Default)]
pub struct CarryRequiredSourceFactory {
    partners: Rc<HashMap<CellId, CellId>>,
}

impl CarryRequiredSourceFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PackRuleFactory for CarryRequiredSourceFactory {
    fn name(&self) -> &'static str {
        "carry_required_source"
    }

    fn init(&mut self, env: PackEnv<'_>, design: &PackDesign) {
        let cyinit = env.interner.get_or_intern("CYINIT");
        let di0 = env.interner.get_or_intern("DI0");
        let mut partners = HashMap::new();
        for cell in design.cells() {
            if env.library.cell(cell.lib).name != "CARRY4" {
                continue;
            }
            let Some(init_net) = design.net_on(cell.id, cyinit) else { continue };
            let Some(di_net) = design.net_on(cell.id, di0) else { continue };
            if init_net == di_net || design.net(init_net).is_static() || design.net(di_net).is_static()
            {
                continue;
            }
            let Some(source) = design.source_cell(di_net) else { continue };
            if source == cell.id {
                continue;
            }
            partners.insert(source, cell.id);
            partners.insert(cell.id, source);
        }
        self.partners = Rc::new(partners);
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(CarryRequiredSource {
            partners: Rc::clone(&self.partners),
            pending: TransactionalMap::new(),
        })
    }
}

/// Makes the partner of a paired CARRY4 or DI0 source follow it into the
/// cluster.
#[derive(Debug)]
pub struct CarryRequiredSource {
    partners: Rc<HashMap<CellId, CellId>>,
    /// Placed cell to the partner it needs.
    pending: TransactionalMap<CellId, CellId>,
}

impl PackRule for CarryRequiredSource {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        self.pending.checkpoint();
        for cell in changed {
            if let Some(&partner) = self.partners.get(cell) {
                self.pending.put(*cell, partner);
            }
        }

        let mut status = PackStatus::Valid;
        for (_, &partner) in self.pending.iter() {
            if ctx.cluster.contains(partner) {
                continue;
            }
            if ctx.design.cell(partner).cluster.is_some() || ctx.free_anchors(partner).is_empty() {
                return PackStatus::Infeasible;
            }
            status = PackStatus::Conditional;
        }
        status
    }

    fn conditionals(&self, ctx: &RuleContext<'_>) -> Conditionals {
        self.pending
            .iter()
            .map(|(_, &partner)| partner)
            .filter(|&p| !ctx.cluster.contains(p) && ctx.design.cell(p).cluster.is_none())
            .map(|p| (p, ctx.free_anchors(p)))
            .collect()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {
        self.pending.rollback();
    }
}
