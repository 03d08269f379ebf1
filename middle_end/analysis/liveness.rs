//! Intraprocedural live-variable analysis (backward).

use std::collections::BTreeSet as Set;

use crate::commons::Valid;
use crate::middle_end::lang::*;

use super::{Cfg, DataflowAnalysis, DataflowResult, NodeId};

/// The powerset fact: the variables live at a program point.
pub type LiveSet = Set<VarId>;

pub fn analyze(program: &Valid<Program>, method: &MethodRef) -> DataflowResult<LiveSet> {
    let ir = program
        .0
        .ir(method)
        .unwrap_or_else(|| panic!("no IR for {method}"));
    let cfg = Cfg::new(ir);
    super::solve(&LiveVariables, &cfg, ir)
}

pub struct LiveVariables;

impl DataflowAnalysis for LiveVariables {
    type Fact = LiveSet;

    fn is_forward(&self) -> bool {
        false
    }

    fn new_boundary_fact(&self, _cfg: &Cfg) -> LiveSet {
        Set::new()
    }

    fn new_initial_fact(&self) -> LiveSet {
        Set::new()
    }

    fn meet_into(&self, fact: &LiveSet, target: &mut LiveSet) {
        target.extend(fact.iter().cloned());
    }

    // in = uses ∪ (out \ defs); `input` here is the fact flowing backward,
    // i.e. the live-after set.
    fn transfer_node(
        &self,
        cfg: &Cfg,
        ir: &Ir,
        node: NodeId,
        input: &LiveSet,
        out: &mut LiveSet,
    ) -> bool {
        let mut live = input.clone();
        if let Some(stmt) = cfg.stmt(ir, node) {
            if let Some(def) = stmt.def_var() {
                live.remove(def);
            }
            for used in stmt.uses() {
                live.insert(used.clone());
            }
        }
        if *out == live {
            false
        } else {
            *out = live;
            true
        }
    }
}
