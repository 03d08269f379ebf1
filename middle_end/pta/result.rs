//! Query interface over a finished pointer analysis.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use crate::middle_end::callgraph::CallGraph;
use crate::middle_end::lang::VarId;
use crate::middle_end::taint::TaintFlow;

use super::cs::{CsObj, CsVar};
use super::heap::Obj;
use super::pts::PointsToSet;

/// The result every points-to variant produces: per-variable points-to sets
/// (context-merged and per-CS-variable), the call graph built on the fly,
/// and any plugin payloads (taint flows).
#[derive(Clone, Debug)]
pub struct PointerAnalysisResult {
    pt_var: Map<VarId, PointsToSet<Obj>>,
    pt_cs_var: Map<CsVar, PointsToSet<CsObj>>,
    call_graph: CallGraph,
    pub taint_flows: Vec<TaintFlow>,
    empty: PointsToSet<Obj>,
    empty_cs: PointsToSet<CsObj>,
}

impl PointerAnalysisResult {
    pub fn new(call_graph: CallGraph) -> PointerAnalysisResult {
        PointerAnalysisResult {
            pt_var: Map::new(),
            pt_cs_var: Map::new(),
            call_graph,
            taint_flows: vec![],
            empty: PointsToSet::new(),
            empty_cs: PointsToSet::new(),
        }
    }

    /// Record the points-to set of one contextualized variable, merging into
    /// the context-insensitive view.
    pub fn add_cs_var(&mut self, cs_var: CsVar, pts: &PointsToSet<CsObj>) {
        let merged = self.pt_var.entry(cs_var.var.clone()).or_default();
        for obj in pts.iter() {
            merged.add(obj.obj.clone());
        }
        let per_ctx = self.pt_cs_var.entry(cs_var).or_default();
        for obj in pts.iter() {
            per_ctx.add(obj.clone());
        }
    }

    /// All variables with a (possibly empty) recorded points-to set.
    pub fn vars(&self) -> impl Iterator<Item = &VarId> {
        self.pt_var.keys()
    }

    /// Context-merged points-to set of a variable.
    pub fn points_to(&self, var: &VarId) -> &PointsToSet<Obj> {
        self.pt_var.get(var).unwrap_or(&self.empty)
    }

    /// Points-to set of one contextualized variable.
    pub fn points_to_cs(&self, cs_var: &CsVar) -> &PointsToSet<CsObj> {
        self.pt_cs_var.get(cs_var).unwrap_or(&self.empty_cs)
    }

    pub fn cs_vars(&self) -> impl Iterator<Item = &CsVar> {
        self.pt_cs_var.keys()
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// The alias view: for every object, the variables whose points-to set
    /// contains it.  Computed once; the interprocedural constant propagation
    /// uses it to find dependent loads.
    pub fn alias_map(&self) -> Map<Obj, Set<VarId>> {
        let mut aliases: Map<Obj, Set<VarId>> = Map::new();
        for (var, pts) in &self.pt_var {
            for obj in pts.iter() {
                aliases.entry(obj.clone()).or_default().insert(var.clone());
            }
        }
        aliases
    }
}
