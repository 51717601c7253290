//! Forces carry chains fed by shift registers or LUT-RAM onto SLICEM sites.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::design::PackDesign;
use crate::ids::{CarryChainId, CellId};
use aapack_arch::SiteType;
use std::collections::HashSet;
use std::rc::Rc;

const SELECT_PINS: [&str; 4] = ["S0", "S1", "S2", "S3"];

/// Factory for [`CarryLookAhead`].
#[derive(Debug)]
pub struct CarryLookAheadFactory {
    source_types: Vec<String>,
    slicem_chains: Rc<HashSet<CarryChainId>>,
}

impl CarryLookAheadFactory {
    /// Creates the factory. A chain whose CARRY4 select input is driven by
    /// one of `source_types` must stay on SLICEM.
    pub fn new(source_types: Vec<String>) -> Self {
        Self {
            source_types,
            slicem_chains: Rc::new(HashSet::new()),
        }
    }
}

impl PackRuleFactory for CarryLookAheadFactory {
    fn name(&self) -> &'static str {
        "carry_chain_lookahead"
    }

    fn init(&mut self, env: PackEnv<'_>, design: &PackDesign) {
        let selects: Vec<_> = SELECT_PINS
            .iter()
            .map(|p| env.interner.get_or_intern(p))
            .collect();
        let mut chains = HashSet::new();
        for (id, chain) in design.carry.chains() {
            // Only cells that carry the chain onward have select inputs.
            let is_carry =
                |cell: CellId| !env.library.cell(design.cell(cell).lib).carry_out_pins.is_empty();
            let needs_slicem = chain.cells.iter().copied().filter(|&c| is_carry(c)).any(|cell| {
                selects.iter().any(|&pin| {
                    design
                        .net_on(cell, pin)
                        .filter(|&n| !design.net(n).is_static())
                        .and_then(|n| design.source_cell(n))
                        .is_some_and(|src| {
                            let name = &env.library.cell(design.cell(src).lib).name;
                            self.source_types.iter().any(|t| t == name)
                        })
                })
            });
            if needs_slicem {
                chains.insert(id);
            }
        }
        self.slicem_chains = Rc::new(chains);
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(CarryLookAhead {
            slicem_chains: Rc::clone(&self.slicem_chains),
        })
    }
}

/// Rejects chain cells of a SLICEM-only chain placed elsewhere.
#[derive(Debug)]
pub struct CarryLookAhead {
    slicem_chains: Rc<HashSet<CarryChainId>>,
}

impl PackRule for CarryLookAhead {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        for &cell in changed {
            let Some(chain) = ctx.design.cell(cell).carry_chain else { continue };
            if !self.slicem_chains.contains(&chain) {
                continue;
            }
            if ctx
                .bel_of(cell)
                .is_some_and(|bel| bel.site_type() != SiteType::Slicem)
            {
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
