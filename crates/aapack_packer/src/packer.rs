//! The packing orchestrator.
//!
//! Clusters are grown one at a time from a seed cell. For every template
//! with instances left, the packer runs a backtracking search: pick the
//! next cell, try its anchor BELs in order, validate the rules, and commit
//! the placement when it holds. A Conditional verdict names cells that must
//! follow; if they cannot, the BEL choice that demanded them is undone and
//! the next BEL is tried. A cell with no BEL left is invalidated for the
//! rest of the cluster. When the selectors run dry the search backs off to
//! the last committed state, which is always Valid or Conditional.
//!
//! The cheapest Valid cluster over all templates is committed to the
//! design; the others are discarded.

use crate::bel_selector::{BelSelector, ShortestRouteBelSelector};
use crate::carry::find_carry_chains;
use crate::cell_selector::{CellSelector, ExposedNetsCellSelector, GainWeights};
use crate::cluster::{Cluster, ClusterView};
use crate::cost::ClusterCostCalculator;
use crate::design::PackDesign;
use crate::forced;
use crate::ids::{CellId, PinId};
use crate::report::PackReport;
use crate::rules::{
    default_factories, merge_conditionals, Conditionals, PackEnv, PackRule, PackRuleFactory,
    PackStatus, RuleContext,
};
use crate::seed::{HighestInputSeedSelector, SeedSelector};
use aapack_arch::{BelCostTable, BelId, CellLibrary, ClusterTemplate, Device, TemplateId};
use aapack_common::{Interner, InternalError, PackResult};
use aapack_config::PackConfig;
use aapack_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::BTreeSet;
use std::mem;

/// Warning: cells excluded from packing.
const UNPACKABLE_CELLS: u16 = 1;
/// Note: summary of a finished run.
const PACK_SUMMARY: u16 = 2;
/// Error: a seed fits no template.
const NO_LEGAL_PACKING: u16 = 101;

fn code(number: u16) -> DiagnosticCode {
    DiagnosticCode::new(Category::Packing, number)
}

/// One level of the search: the cell being placed and what placing it did.
#[derive(Debug)]
struct Step {
    cell: Option<CellId>,
    /// Cells bound by this step with all BELs they occupy, anchor first.
    packed: Vec<(CellId, Vec<BelId>)>,
    status: PackStatus,
    /// Cells that found no BEL at this level.
    invalidated: Vec<CellId>,
    /// Conditionals the previous level committed with.
    prev_conditionals: Option<Conditionals>,
    /// Conditionals gathered by the rules at this level.
    next_conditionals: Option<Conditionals>,
    /// Number of rules validated, a prefix of the rule list.
    checked_rules: usize,
}

impl Step {
    fn new(cell: Option<CellId>, prev_conditionals: Option<Conditionals>) -> Self {
        Self {
            cell,
            packed: Vec::new(),
            status: PackStatus::Infeasible,
            invalidated: Vec::new(),
            prev_conditionals,
            next_conditionals: None,
            checked_rules: 0,
        }
    }

    fn packed_cells(&self) -> Vec<CellId> {
        self.packed.iter().map(|(cell, _)| *cell).collect()
    }
}

/// A candidate cluster being filled on one template.
struct Search<'a> {
    env: PackEnv<'a>,
    template: &'a ClusterTemplate,
    design: &'a mut PackDesign,
    cluster: Cluster,
    rules: Vec<Box<dyn PackRule>>,
    stack: Vec<Step>,
    current: Step,
}

impl<'a> Search<'a> {
    fn view(&self) -> ClusterView<'_> {
        ClusterView {
            design: &*self.design,
            library: self.env.library,
            template: self.template,
            cluster: &self.cluster,
        }
    }

    fn is_seed_state(&self) -> bool {
        self.stack.is_empty()
    }

    /// Freezes the current level and opens the next one.
    fn commit(&mut self) {
        let prev = self.current.next_conditionals.clone();
        let done = mem::replace(&mut self.current, Step::new(None, prev));
        self.stack.push(done);
    }

    fn rollback(&mut self) {
        if let Some(step) = self.stack.pop() {
            self.current = step;
        }
    }

    /// Binds `cell` on `anchor` and its extra BELs if all are free.
    fn add_cell(&mut self, cell: CellId, anchor: BelId) -> PackStatus {
        let lib = self.env.library.cell(self.design.cell(cell).lib);
        let Some(bels) = lib.required_bels(self.template, anchor) else {
            return PackStatus::Infeasible;
        };
        if bels.iter().any(|&b| self.cluster.is_bel_occupied(b)) {
            return PackStatus::Infeasible;
        }
        self.cluster.add_cell(cell, &bels);
        let c = self.design.cell_mut(cell);
        c.cluster = Some(self.cluster.id);
        c.location = Some(anchor);
        c.valid = false;
        self.current.packed.push((cell, bels));
        PackStatus::Valid
    }

    /// Binds every neighbour the template leaves exactly one BEL for, until
    /// the cluster stops growing.
    fn expand_forced_packing(&mut self) -> PackStatus {
        loop {
            let size = self.cluster.cell_count();
            let status = self.expand_required_sinks();
            if status != PackStatus::Valid {
                return status;
            }
            let status = self.expand_required_sources();
            if status != PackStatus::Valid {
                return status;
            }
            if self.cluster.cell_count() == size {
                return PackStatus::Valid;
            }
        }
    }

    /// Loose cells on a net driven from the cluster that only one free BEL
    /// can reach.
    fn expand_required_sinks(&mut self) -> PackStatus {
        let cells: Vec<CellId> = self.cluster.cells().collect();
        for cell in cells {
            let outputs: Vec<PinId> = self
                .design
                .cell(cell)
                .pins
                .iter()
                .copied()
                .filter(|&p| !self.design.pin(p).is_input())
                .collect();
            for source in outputs {
                let Some(net) = self.design.pin(source).net else { continue };
                let sinks: Vec<PinId> = self.design.net(net).pins.clone();
                for sink in sinks {
                    if sink == source {
                        continue;
                    }
                    let sink_cell = self.design.pin(sink).cell;
                    let status = self.force_cell(sink_cell, |view, device| {
                        forced::possible_sink_bels(view, device, source, sink)
                    });
                    if status != PackStatus::Valid {
                        return status;
                    }
                }
            }
        }
        PackStatus::Valid
    }

    /// Loose drivers of cluster inputs that only one free BEL can reach.
    fn expand_required_sources(&mut self) -> PackStatus {
        let cells: Vec<CellId> = self.cluster.cells().collect();
        for cell in cells {
            let inputs: Vec<PinId> = self
                .design
                .cell(cell)
                .pins
                .iter()
                .copied()
                .filter(|&p| self.design.pin(p).is_input())
                .collect();
            for sink in inputs {
                let Some(net) = self.design.pin(sink).net else { continue };
                let Some(source) = self.design.net(net).source else { continue };
                let source_cell = self.design.pin(source).cell;
                let status = self.force_cell(source_cell, |view, device| {
                    forced::possible_source_bels(view, device, sink, source)
                });
                if status != PackStatus::Valid {
                    return status;
                }
            }
        }
        PackStatus::Valid
    }

    /// Binds `cell` if `bels` leaves it a single choice. Cells already in a
    /// cluster and unpackable cells are left alone.
    fn force_cell(
        &mut self,
        cell: CellId,
        bels: impl FnOnce(&ClusterView<'_>, &Device) -> Option<BTreeSet<BelId>>,
    ) -> PackStatus {
        let c = self.design.cell(cell);
        if c.cluster.is_some() || !c.packable {
            return PackStatus::Valid;
        }
        let valid = c.valid;
        let Some(bels) = bels(&self.view(), self.env.device) else {
            return PackStatus::Valid;
        };
        let mut bels = bels.into_iter();
        match (bels.next(), bels.next()) {
            (None, _) => PackStatus::Infeasible,
            (Some(bel), None) if valid => match self.add_cell(cell, bel) {
                PackStatus::Valid => PackStatus::Valid,
                _ => PackStatus::Infeasible,
            },
            (Some(_), None) => PackStatus::Infeasible,
            (Some(_), Some(_)) => PackStatus::Valid,
        }
    }

    /// Runs the rules not yet checked at this level until one fails.
    fn validate_rules(&mut self) {
        let changed = self.current.packed_cells();
        while self.current.checked_rules < self.rules.len()
            && self.current.status != PackStatus::Infeasible
        {
            let rule = &mut self.rules[self.current.checked_rules];
            let mut ctx = RuleContext {
                env: self.env,
                design: &mut *self.design,
                cluster: &self.cluster,
            };
            let result = rule.validate(&mut ctx, &changed);
            self.current.status = self.current.status.meet(result);
            if result == PackStatus::Conditional {
                let conditionals = rule.conditionals(&ctx);
                if conditionals.is_empty() {
                    self.current.status = PackStatus::Infeasible;
                } else {
                    merge_conditionals(
                        self.current.next_conditionals.get_or_insert_with(Conditionals::new),
                        conditionals,
                    );
                }
            }
            self.current.checked_rules += 1;
        }
    }

    /// Undoes the rules and bindings of the current level.
    fn revert_state(&mut self) {
        for i in (0..self.current.checked_rules).rev() {
            let mut ctx = RuleContext {
                env: self.env,
                design: &mut *self.design,
                cluster: &self.cluster,
            };
            self.rules[i].revert(&mut ctx);
        }
        self.current.checked_rules = 0;
        for (cell, _) in mem::take(&mut self.current.packed) {
            self.cluster.remove_cell(cell);
            let c = self.design.cell_mut(cell);
            c.cluster = None;
            c.location = None;
            c.valid = true;
        }
        self.current.next_conditionals = None;
    }

    fn cleanup_rules(&mut self) {
        for rule in &mut self.rules {
            let mut ctx = RuleContext {
                env: self.env,
                design: &mut *self.design,
                cluster: &self.cluster,
            };
            rule.cleanup(&mut ctx);
        }
    }

    /// Releases every cell the search touched. The cluster keeps its
    /// placement so it can still be committed.
    fn unbind(&mut self) {
        loop {
            for (cell, _) in &self.current.packed {
                let c = self.design.cell_mut(*cell);
                c.cluster = None;
                c.location = None;
                c.valid = true;
            }
            for &cell in &self.current.invalidated {
                self.design.cell_mut(cell).valid = true;
            }
            match self.stack.pop() {
                Some(step) => self.current = step,
                None => break,
            }
        }
    }
}

/// Packs a netlist into cluster templates.
pub struct Packer {
    seed_selector: Box<dyn SeedSelector>,
    cell_selector: Box<dyn CellSelector>,
    bel_selector: Box<dyn BelSelector>,
    factories: Vec<Box<dyn PackRuleFactory>>,
    costs: ClusterCostCalculator,
}

impl Packer {
    /// Creates a packer with the default selectors and the enabled rules.
    pub fn new(config: &PackConfig, bel_costs: BelCostTable) -> Self {
        Self::with_components(
            Box::new(HighestInputSeedSelector::new()),
            Box::new(ExposedNetsCellSelector::new(GainWeights::from(
                &config.cell_selector,
            ))),
            Box::new(ShortestRouteBelSelector::new(bel_costs, &config.bel_selector)),
            default_factories(&config.rules),
            ClusterCostCalculator::new(&config.packer),
        )
    }

    /// Creates a packer from explicit parts. Rules run in the order of
    /// `factories`.
    pub fn with_components(
        seed_selector: Box<dyn SeedSelector>,
        cell_selector: Box<dyn CellSelector>,
        bel_selector: Box<dyn BelSelector>,
        factories: Vec<Box<dyn PackRuleFactory>>,
        costs: ClusterCostCalculator,
    ) -> Self {
        Self {
            seed_selector,
            cell_selector,
            bel_selector,
            factories,
            costs,
        }
    }

    /// Names of the active rules, in validation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Packs every packable cell of `design` into clusters on `device`.
    ///
    /// Committed clusters are stored in the design and every packed cell
    /// records its cluster and anchor BEL. If some seed fits no template an
    /// error diagnostic is emitted and the incomplete report is returned.
    pub fn pack(
        &mut self,
        design: &mut PackDesign,
        device: &Device,
        library: &CellLibrary,
        interner: &Interner,
        sink: &DiagnosticSink,
    ) -> PackResult<PackReport> {
        let env = PackEnv {
            device,
            library,
            interner,
        };
        let mut report = PackReport::default();
        let mut unclustered = self.init(env, design, &mut report);
        if !report.unpackable_cells.is_empty() {
            sink.emit(
                Diagnostic::warning(
                    code(UNPACKABLE_CELLS),
                    format!("{} cells cannot be packed", report.unpackable_cells.len()),
                )
                .with_note(format!("cells: {}", report.unpackable_cells.join(", "))),
            );
        }

        while !unclustered.is_empty() {
            let seed = self.seed_selector.next_seed(design).ok_or_else(|| {
                InternalError::new(format!(
                    "seed selector ran dry with {} cells unclustered",
                    unclustered.len()
                ))
            })?;
            if !unclustered.contains(&seed) {
                return Err(InternalError::new(format!(
                    "seed selector returned clustered cell {}",
                    design.cell(seed).name
                )));
            }

            let mut best: Option<Cluster> = None;
            let templates: Vec<TemplateId> = device.templates().map(|t| t.id).collect();
            for template in templates {
                if self.costs.remaining(template) == 0 {
                    continue;
                }
                let (status, cluster) = self.try_pack_cluster(env, design, seed, template)?;
                if status == PackStatus::Valid
                    && best.as_ref().map_or(true, |b| cluster.cost < b.cost)
                {
                    best = Some(cluster);
                }
            }

            match best {
                Some(cluster) => self.commit_cluster(env, design, cluster, &mut unclustered)?,
                None => {
                    let cell = design.cell(seed);
                    sink.emit(
                        Diagnostic::error(code(NO_LEGAL_PACKING), "no legal packing found")
                            .with_subject(cell.name.clone())
                            .with_note(format!(
                                "library cell `{}` fits no cluster template with instances left",
                                library.cell(cell.lib).name
                            ))
                            .with_note(format!("{} cells left unpacked", unclustered.len())),
                    );
                    break;
                }
            }
        }

        report.clusters = design.cluster_count();
        report.packed_cells = design.clusters().map(|c| c.cell_count()).sum();
        for cluster in design.clusters() {
            let name = &device.template(cluster.template).name;
            *report.clusters_per_template.entry(name.clone()).or_default() += 1;
        }
        report.unpacked_cells = unclustered
            .iter()
            .map(|&c| design.cell(c).name.clone())
            .collect();
        sink.emit(
            Diagnostic::note(code(PACK_SUMMARY), report.to_string())
                .with_subject(design.name.clone()),
        );
        Ok(report)
    }

    /// Prepares the design and every component; returns the cells to pack.
    fn init(
        &mut self,
        env: PackEnv<'_>,
        design: &mut PackDesign,
        report: &mut PackReport,
    ) -> BTreeSet<CellId> {
        design.clear_clusters();
        let ids: Vec<CellId> = design.cells().map(|c| c.id).collect();
        let mut unclustered = BTreeSet::new();
        for &id in &ids {
            let cell = design.cell_mut(id);
            cell.cluster = None;
            cell.location = None;
            cell.valid = cell.packable;
            if cell.packable {
                unclustered.insert(id);
            } else {
                report.unpackable_cells.push(cell.name.clone());
            }
        }
        let cells: Vec<CellId> = unclustered.iter().copied().collect();

        find_carry_chains(design, env.library);
        for factory in &mut self.factories {
            factory.init(env, design);
        }
        self.seed_selector.init(design, &cells);
        self.cell_selector.init(design, &cells);
        self.costs.init(env.device);
        unclustered
    }

    /// Stores `cluster` in the design and binds its cells for good.
    fn commit_cluster(
        &mut self,
        env: PackEnv<'_>,
        design: &mut PackDesign,
        cluster: Cluster,
        unclustered: &mut BTreeSet<CellId>,
    ) -> PackResult<()> {
        let template = cluster.template;
        let id = design.add_cluster(cluster);
        let anchors: Vec<(BelId, CellId)> = design
            .cluster(id)
            .cells()
            .filter_map(|cell| Some((design.cluster(id).location_of(cell)?, cell)))
            .collect();
        for (bel, cell) in anchors {
            let c = design.cell_mut(cell);
            c.cluster = Some(id);
            c.location = Some(bel);
            c.valid = false;
            unclustered.remove(&cell);
        }
        for factory in &mut self.factories {
            factory.commit_cluster(env, design, id);
        }
        self.seed_selector.commit_cluster(design, design.cluster(id))?;
        self.costs.use_instance(template);
        Ok(())
    }

    /// Grows a cluster on `template` from `seed` and leaves the design as it
    /// found it. The returned cluster keeps its placement and, when Valid,
    /// its cost.
    fn try_pack_cluster(
        &mut self,
        env: PackEnv<'_>,
        design: &mut PackDesign,
        seed: CellId,
        template: TemplateId,
    ) -> PackResult<(PackStatus, Cluster)> {
        let tmpl = env.device.template(template);
        let cluster = Cluster::new(
            design.next_cluster_id(),
            design.cell(seed).name.clone(),
            template,
        );
        self.cell_selector.init_cluster();
        self.bel_selector.init_cluster(tmpl);
        let rules = self
            .factories
            .iter()
            .map(|f| f.create_rule(env, &cluster))
            .collect();

        let mut search = Search {
            env,
            template: tmpl,
            design,
            cluster,
            rules,
            stack: Vec::new(),
            current: Step::new(Some(seed), None),
        };
        let mut filled = self.bel_selector.init_cell(&search.view(), seed, None);
        if filled.is_ok() {
            filled = self.fill_cluster(&mut search);
        }

        let status = search.current.status;
        if filled.is_ok() && status == PackStatus::Valid {
            search.cluster.cost = self.costs.cost(&search.view());
        }
        search.cleanup_rules();
        self.cell_selector.cleanup_cluster();
        self.bel_selector.cleanup_cluster();
        search.unbind();
        filled?;
        Ok((status, search.cluster))
    }

    fn fill_cluster(&mut self, search: &mut Search<'_>) -> PackResult<()> {
        loop {
            loop {
                self.try_pack_cells_until_success(search)?;
                match search.current.status {
                    PackStatus::Infeasible => {
                        if !search.is_seed_state() {
                            self.roll_back_last_commit(search)?;
                        }
                        break;
                    }
                    status => {
                        if search.cluster.is_full(search.template) {
                            break;
                        }
                        let conditionals = match status {
                            PackStatus::Conditional => search
                                .current
                                .next_conditionals
                                .as_ref()
                                .map(|c| c.keys().copied().collect::<BTreeSet<_>>()),
                            _ => None,
                        };
                        self.commit_cell_bel_pair(search, conditionals.as_ref())?;
                        self.next_cell(search)?;
                    }
                }
            }

            if search.current.status == PackStatus::Conditional {
                search.current.status = PackStatus::Infeasible;
                search.revert_state();
            } else {
                return Ok(());
            }
        }
    }

    /// Tries cells until one is placed or the candidates run out. A cell
    /// that fits nowhere is invalidated for the rest of the cluster.
    fn try_pack_cells_until_success(&mut self, search: &mut Search<'_>) -> PackResult<()> {
        while let Some(cell) = search.current.cell {
            if search.current.status != PackStatus::Infeasible {
                break;
            }
            self.try_pack_cell(search, cell);
            if search.current.status == PackStatus::Infeasible {
                self.revert_to_last_commit(search);
                if search.is_seed_state() {
                    return Ok(());
                }
                self.next_cell(search)?;
            }
        }
        Ok(())
    }

    /// Walks the BEL candidates of `cell` until the rules accept one.
    fn try_pack_cell(&mut self, search: &mut Search<'_>, cell: CellId) {
        while let Some(anchor) = self.bel_selector.next_bel() {
            search.current.status = search.add_cell(cell, anchor);
            if search.current.status == PackStatus::Valid {
                search.current.status = search.expand_forced_packing();
            }
            search.current.next_conditionals = Some(Conditionals::new());
            search.validate_rules();
            if search.current.status != PackStatus::Infeasible {
                break;
            }
            search.revert_state();
        }
        if search.current.status != PackStatus::Conditional {
            search.current.next_conditionals = None;
        }
    }

    fn next_cell(&mut self, search: &mut Search<'_>) -> PackResult<()> {
        let next = self.cell_selector.next_cell(&*search.design);
        search.current.cell = next;
        if let Some(cell) = next {
            let forced = search
                .current
                .prev_conditionals
                .as_ref()
                .and_then(|c| c.get(&cell));
            self.bel_selector.init_cell(&search.view(), cell, forced)?;
        }
        Ok(())
    }

    fn commit_cell_bel_pair(
        &mut self,
        search: &mut Search<'_>,
        conditionals: Option<&BTreeSet<CellId>>,
    ) -> PackResult<()> {
        let cells = search.current.packed_cells();
        let bels: Vec<BelId> = search
            .current
            .packed
            .iter()
            .flat_map(|(_, bels)| bels.iter().copied())
            .collect();
        self.cell_selector
            .commit_cells(&*search.design, &cells, conditionals);
        self.bel_selector.commit_bels(search.template, &bels);
        search.commit();
        self.check_depths(search)
    }

    /// Gives up on the current cell for the rest of the cluster.
    fn revert_to_last_commit(&mut self, search: &mut Search<'_>) {
        self.bel_selector.revert_to_last_commit();
        search.revert_state();
        if let Some(cell) = search.current.cell.take() {
            search.design.cell_mut(cell).valid = false;
            search.current.invalidated.push(cell);
        }
    }

    /// Returns to the previous level, restoring the cells invalidated at
    /// this one.
    fn roll_back_last_commit(&mut self, search: &mut Search<'_>) -> PackResult<()> {
        self.bel_selector.roll_back_last_commit();
        self.cell_selector.roll_back_last_commit();
        for &cell in &search.current.invalidated {
            search.design.cell_mut(cell).valid = true;
        }
        search.rollback();
        self.check_depths(search)
    }

    fn check_depths(&self, search: &Search<'_>) -> PackResult<()> {
        let depth = search.stack.len();
        let cells = self.cell_selector.depth();
        let bels = self.bel_selector.depth();
        if cells != depth || bels != depth {
            return Err(InternalError::new(format!(
                "checkpoint depth mismatch in cluster {}: search {depth}, cell selector {cells}, BEL selector {bels}",
                search.cluster.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use aapack_arch::LibraryCell;
    use aapack_diagnostics::Severity;

    fn run(fx: &mut Fixture) -> (PackReport, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let mut packer = Packer::new(&PackConfig::default(), fx.costs.clone());
        let report = packer
            .pack(&mut fx.design, &fx.device, &fx.library, &fx.interner, &sink)
            .unwrap();
        (report, sink)
    }

    #[test]
    fn packs_lut_ff_pairs_and_carry_chain() {
        let mut fx = Fixture::new();
        let l0 = fx.lut("l0", "LUT6");
        let f0 = fx.ff("f0");
        let l1 = fx.lut("l1", "LUT6");
        let f1 = fx.ff("f1");
        fx.wire(l0, "O6", &[(f0, "D")]);
        fx.wire(l1, "O6", &[(f1, "D")]);
        fx.wire(f0, "Q", &[(l1, "A1")]);
        let c0 = fx.carry("c0");
        let c1 = fx.carry("c1");
        fx.link_carry(c0, c1);

        let (report, sink) = run(&mut fx);
        assert!(report.is_complete());
        assert!(!sink.has_errors());
        assert_eq!(report.packed_cells, 6);
        assert_eq!(report.clusters, fx.design.cluster_count());

        let cluster_of = |c: CellId| fx.design.cell(c).cluster.unwrap();
        assert_eq!(cluster_of(l0), cluster_of(f0));
        assert_eq!(cluster_of(l1), cluster_of(f1));
        assert_ne!(cluster_of(c0), cluster_of(c1));
        for id in [l0, f0, l1, f1, c0, c1] {
            let cell = fx.design.cell(id);
            assert!(!cell.valid);
            let cluster = fx.design.cluster(cell.cluster.unwrap());
            assert_eq!(cluster.location_of(id), cell.location);
        }
    }

    #[test]
    fn committed_clusters_never_share_a_bel() {
        let mut fx = Fixture::new();
        let luts: Vec<CellId> = (0..6).map(|i| fx.lut(&format!("l{i}"), "LUT6")).collect();
        for pair in luts.windows(2) {
            fx.wire(pair[0], "O6", &[(pair[1], "A1")]);
        }
        let (report, _) = run(&mut fx);
        assert!(report.is_complete());

        for cluster in fx.design.clusters() {
            let mut seen = BTreeSet::new();
            for (bel, cell) in cluster.anchors() {
                assert!(seen.insert(bel), "BEL used twice in {}", cluster.name);
                assert_eq!(fx.design.cell(cell).location, Some(bel));
            }
        }
        let placed: usize = fx.design.clusters().map(|c| c.anchors().count()).sum();
        assert_eq!(placed, 6);
        assert!(report.clusters >= 2);
    }

    #[test]
    fn carry_indices_are_consistent_after_commit() {
        let mut fx = Fixture::new();
        let chain: Vec<CellId> = (0..3).map(|i| fx.carry(&format!("c{i}"))).collect();
        fx.link_carry(chain[0], chain[1]);
        fx.link_carry(chain[1], chain[2]);

        let (report, _) = run(&mut fx);
        assert!(report.is_complete());

        let group = fx.design.cell(chain[0]).carry_group;
        assert!(group.is_some());
        let mut indices = BTreeSet::new();
        for &cell in &chain {
            let c = fx.design.cell(cell);
            assert_eq!(c.carry_group, group);
            let cluster = fx.design.cluster(c.cluster.unwrap());
            assert_eq!(cluster.carry_group, group);
            assert_eq!(cluster.carry_index, c.carry_index);
            indices.insert(c.carry_index.unwrap());
        }
        assert_eq!(indices.len(), 3);
        for (_, chain) in fx.design.carry.chains() {
            assert!(!chain.is_partially_placed());
        }
    }

    #[test]
    fn unpackable_cells_are_reported_and_skipped() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let io = fx.lut("io", "LUT6");
        fx.design.cell_mut(io).packable = false;

        let (report, sink) = run(&mut fx);
        assert!(report.is_complete());
        assert_eq!(report.unpackable_cells, vec!["io".to_string()]);
        assert!(fx.design.cell(a).cluster.is_some());
        assert!(fx.design.cell(io).cluster.is_none());
        assert!(!fx.design.cell(io).valid);

        let diags = sink.diagnostics();
        assert!(diags
            .iter()
            .any(|d| d.severity == Severity::Warning && d.code == code(UNPACKABLE_CELLS)));
        assert!(diags.iter().any(|d| d.code == code(PACK_SUMMARY)));
    }

    #[test]
    fn seed_without_anchors_stops_with_error() {
        let mut fx = Fixture::new();
        fx.library.add(LibraryCell::new("BUFG", Vec::new()));
        fx.cell("clkbuf", "BUFG");

        let (report, sink) = run(&mut fx);
        assert!(!report.is_complete());
        assert_eq!(report.unpacked_cells, vec!["clkbuf".to_string()]);
        assert_eq!(sink.error_count(), 1);
        let error = sink
            .diagnostics()
            .into_iter()
            .find(|d| d.severity == Severity::Error)
            .unwrap();
        assert_eq!(error.code, code(NO_LEGAL_PACKING));
        assert_eq!(error.subject.as_deref(), Some("clkbuf"));
        assert!(fx.design.cell(fx.design.find_cell("clkbuf").unwrap()).valid);
    }

    #[test]
    fn search_leaves_unchosen_templates_unbound() {
        let mut fx = Fixture::new();
        let a = fx.lut("a", "LUT6");
        let b = fx.lut("b", "LUT6");
        fx.wire(a, "O6", &[(b, "A1")]);
        let (report, _) = run(&mut fx);

        assert_eq!(report.clusters, 1);
        let cluster = fx.design.clusters().next().unwrap();
        assert_eq!(cluster.cell_count(), 2);
        assert!(cluster.cost.is_finite() && cluster.cost > 0.0);
        assert_eq!(report.clusters_per_template.values().sum::<usize>(), 1);
    }

    fn open_search(fx: &mut Fixture, template: TemplateId) -> Search<'_> {
        let cluster = Cluster::new(fx.design.next_cluster_id(), "cand", template);
        let Fixture {
            device,
            library,
            interner,
            design,
            ..
        } = fx;
        let env = PackEnv {
            device: &*device,
            library: &*library,
            interner: &*interner,
        };
        Search {
            env,
            template: env.device.template(template),
            design,
            cluster,
            rules: Vec::new(),
            stack: Vec::new(),
            current: Step::new(None, None),
        }
    }

    #[test]
    fn lut_pulls_its_flip_flop_into_the_cluster() {
        let mut fx = Fixture::new();
        let lut = fx.lut("l", "LUT6");
        let ff = fx.ff("f");
        fx.wire(lut, "O6", &[(ff, "D")]);
        let (a6, aff) = (fx.bel(fx.slicel, "A6LUT"), fx.bel(fx.slicel, "AFF"));
        let slicel = fx.slicel;

        let mut search = open_search(&mut fx, slicel);
        assert_eq!(search.add_cell(lut, a6), PackStatus::Valid);
        assert_eq!(search.expand_forced_packing(), PackStatus::Valid);
        assert_eq!(search.current.packed_cells(), vec![lut, ff]);
        assert_eq!(search.cluster.location_of(ff), Some(aff));
        assert_eq!(search.design.cell(ff).cluster, Some(search.cluster.id));

        search.revert_state();
        assert!(search.design.cell(ff).cluster.is_none());
        assert!(search.design.cell(ff).valid);
    }

    #[test]
    fn flip_flop_pulls_its_driver_into_the_cluster() {
        let mut fx = Fixture::new();
        let lut = fx.lut("l", "LUT6");
        let ff = fx.ff("f");
        let other = fx.lut("o", "LUT6");
        fx.wire(lut, "O6", &[(ff, "D")]);
        fx.wire(other, "O6", &[(lut, "A1")]);
        let (bff, b6) = (fx.bel(fx.slicel, "BFF"), fx.bel(fx.slicel, "B6LUT"));
        let slicel = fx.slicel;

        let mut search = open_search(&mut fx, slicel);
        search.add_cell(ff, bff);
        assert_eq!(search.expand_forced_packing(), PackStatus::Valid);
        assert_eq!(search.cluster.location_of(lut), Some(b6));
        assert!(!search.cluster.contains(other));
    }

    #[test]
    fn blocked_forced_bel_makes_the_placement_infeasible() {
        let mut fx = Fixture::new();
        let lut = fx.lut("l", "LUT6");
        let ff = fx.ff("f");
        let blocker = fx.lut("b", "LUT6");
        fx.wire(lut, "O6", &[(ff, "D")]);
        let (a6, aff) = (fx.bel(fx.slicel, "A6LUT"), fx.bel(fx.slicel, "AFF"));
        let slicel = fx.slicel;

        let mut search = open_search(&mut fx, slicel);
        search.add_cell(blocker, a6);
        search.add_cell(ff, aff);
        assert_eq!(search.expand_forced_packing(), PackStatus::Infeasible);
        assert!(search.design.cell(lut).cluster.is_none());
    }

    #[test]
    fn packing_twice_gives_the_same_result() {
        let mut fx = Fixture::new();
        let chain: Vec<CellId> = (0..3).map(|i| fx.carry(&format!("c{i}"))).collect();
        fx.link_carry(chain[0], chain[1]);
        fx.link_carry(chain[1], chain[2]);
        find_carry_chains(&mut fx.design, &fx.library);

        let sink = DiagnosticSink::new();
        let mut packer = Packer::new(&PackConfig::default(), fx.costs.clone());
        let mut pack = |fx: &mut Fixture| {
            packer
                .pack(&mut fx.design, &fx.device, &fx.library, &fx.interner, &sink)
                .unwrap()
        };
        let first = pack(&mut fx);
        let second = pack(&mut fx);
        assert_eq!(second, first);
        assert_eq!(second.packed_cells, 3);
        assert_eq!(second.clusters, 3);
        assert_eq!(fx.design.cluster_count(), 3);
        assert!(!sink.has_errors());

        assert_eq!(fx.design.carry.chain_count(), 1);
        assert_eq!(fx.design.cell(chain[0]).sink_carry.len(), 1);
        assert_eq!(fx.design.cell(chain[1]).source_carry.len(), 1);
        let group = fx.design.cell(chain[0]).carry_group;
        assert!(chain.iter().all(|&c| fx.design.cell(c).carry_group == group));
    }

    #[test]
    fn rule_names_follow_registration_order() {
        let fx = Fixture::new();
        let mut config = PackConfig::default();
        config.rules.disabled.push("routability".into());
        let packer = Packer::new(&config, fx.costs.clone());
        assert!(!packer.rule_names().contains(&"routability"));
        assert_eq!(packer.rule_names().len(), aapack_config::RULE_NAMES.len() - 1);
    }
}
