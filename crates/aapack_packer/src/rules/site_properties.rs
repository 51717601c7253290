//! Cells sharing a site must agree on site-wide settings.

use super::{Conditionals, PackEnv, PackRule, PackRuleFactory, PackStatus, RuleContext};
use crate::cluster::Cluster;
use crate::ids::CellId;
use crate::transactional::TransactionalMap;

/// Factory for [`SiteProperties`].
#[derive(Debug, Default)]
pub struct SitePropertiesFactory;

impl SitePropertiesFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl PackRuleFactory for SitePropertiesFactory {
    fn name(&self) -> &'static str {
        "site_properties"
    }

    fn create_rule(&self, _env: PackEnv<'_>, _cluster: &Cluster) -> Box<dyn PackRule> {
        Box::new(SiteProperties {
            values: TransactionalMap::new(),
        })
    }
}

/// First writer of a `(site, property)` pair wins; a different value from a
/// later cell is Infeasible.
#[derive(Debug)]
pub struct SiteProperties {
    values: TransactionalMap<(u32, String), String>,
}

impl PackRule for SiteProperties {
    fn validate(&mut self, ctx: &mut RuleContext<'_>, changed: &[CellId]) -> PackStatus {
        self.values.checkpoint();
        for &cell in changed {
            let Some(bel) = ctx.bel_of(cell) else { continue };
            for (key, value) in &ctx.design.cell(cell).site_properties {
                let key = (bel.site_index, key.clone());
                match self.values.get(&key) {
                    Some(existing) if existing != value => return PackStatus::Infeasible,
                    Some(_) => {}
                    None => {
                        self.values.put(key, value.clone());
                    }
                }
            }
        }
        PackStatus::Valid
    }

    fn conditionals(&self, _ctx: &RuleContext<'_>) -> Conditionals {
        Conditionals::new()
    }

    fn revert(&mut self, _ctx: &mut RuleContext<'_>) {
        self.values.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn set(fx: &mut Fixture, cell: CellId, key: &str, value: &str) {
        fx.design
            .cell_mut(cell)
            .site_properties
            .insert(key.to_string(), value.to_string());
    }

    #[test]
    fn conflicting_values_are_infeasible_until_reverted() {
        let mut fx = Fixture::new();
        let a = fx.ff("a");
        let b = fx.ff("b");
        let c = fx.ff("c");
        set(&mut fx, a, "CLKINV", "CLK");
        set(&mut fx, b, "CLKINV", "CLK_B");
        set(&mut fx, c, "CLKINV", "CLK");
        let mut cluster = fx.new_cluster(fx.slicel);
        fx.place(&mut cluster, a, "AFF");
        fx.place(&mut cluster, b, "BFF");
        fx.place(&mut cluster, c, "CFF");

        let mut rule = SitePropertiesFactory::new().create_rule(fx.env(), &cluster);
        let mut ctx = fx.ctx(&cluster);
        assert_eq!(rule.validate(&mut ctx, &[a]), PackStatus::Valid);
        assert_eq!(rule.validate(&mut ctx, &[b]), PackStatus::Infeasible);
        rule.revert(&mut ctx);
        assert_eq!(rule.validate(&mut ctx, &[c]), PackStatus::Valid);
        rule.revert(&mut ctx);
        rule.revert(&mut ctx);
        assert_eq!(rule.validate(&mut ctx, &[b]), PackStatus::Valid);
    }
}
