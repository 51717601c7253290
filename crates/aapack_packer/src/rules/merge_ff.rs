//! Pulls a flip-flop's sole driver into the flip-flop's cluster.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::design::PackDesign;
use crate::ids::CellId;
use crate::transactional::TransactionalMap;
use std::collections::HashMap;
use std::rc::Rc;

/// Factory for [`MergeFfWithSource`].
#[derive(Debug)]
pub struct MergeFfWithSourceFactory {
    merge_types: Vec<String>,
    ff_types: Vec<String>,
    /// Flip-flop to the cell that solely drives its `D` input.
    sources: Rc<HashMap<CellId, CellId>>,
}

impl MergeFfWithSourceFactory {
    /// Creates the factory for the given driver and flip-flop type names.
    pub fn new(merge_types: Vec<String>, ff_types: Vec<String>) -> Self {
        Self {
            merge_types,
            ff_types,
            sources: Rc::new(HashMap::new()),
        }
    }
}

impl PackRuleFactory for MergeFfWithSourceFactory {
    fn name(&self) -> &'static str {
        "merge_ff_with_source"
    }

    fn init(&mut self, env: PackEnv<'_>, design: &PackDesign) {
        let d = env.interner.get_or_intern("D");
        let is_type = |types: &[String], cell: CellId| {
            let name = &env.library.cell(design.cell(cell).lib).name;
            types.iter().any(|t| t == name)
        };
        let mut sources = HashMap::new();
        for cell in design.cells() {
            if !is_type(&self.merge_types, cell.id) {
                continue;
            }
            for &pin in &cell.pins {
                let pin = design.pin(pin);
                if pin.is_input() {
                    continue;
                }
                let Some(net) = pin.net.map(|n| design.net(n)) else { continue };
                let mut sinks = net.sinks();
                let (Some(sink), None) = (sinks.next(), sinks.next()) else { continue };
                let sink = design.pin(sink);
                if sink.name == d && is_type(&self.ff_types, sink.cell) {
                    sources.insert(sink.cell, cell.id);
                }
            }
        }
        self.sources = Rc::new(sources);
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(MergeFfWithSource {
            sources: Rc::clone(&self.sources),
            pending: TransactionalMap::new(),
        })
    }
}

/// Per-cluster merge rule.
#[derive(Debug)]
pub struct MergeFfWithSource {
    sources: Rc<HashMap<CellId, CellId>>,
    /// Placed flip-flops whose driver is still unclustered.
    pending: TransactionalMap<CellId, CellId>,
}

impl PackRule for MergeFfWithSource {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        self.pending.checkpoint();
        for cell in changed {
            if let Some(&source) = self.sources.get(cell) {
                self.pending.put(*cell, source);
            }
        }

        let mut status = PackStatus::Valid;
        let entries: Vec<(CellId, CellId)> = self.pending.iter().map(|(&f, &s)| (f, s)).collect();
        for (ff, source) in entries {
            if ctx.design.cell(source).cluster.is_some() {
                self.pending.remove(&ff);
            } else if ctx.free_anchors(source).is_empty() {
                return PackStatus::Infeasible;
            } else {
                status = PackStatus::Conditional;
            }
        }
        status
    }

    fn conditionals(&self, ctx: &RuleContext<'_>) -> Conditionals {
        self.pending
            .iter()
            .map(|(_, &source)| (source, ctx.free_anchors(source)))
            .collect()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {
        self.pending.rollback();
    }
}
