//! Dead-code detection: control-flow unreachable statements plus dead
//! assignments, driven by constant propagation and liveness.

use std::collections::VecDeque;
use std::collections::BTreeSet as Set;

use crate::commons::Valid;
use crate::middle_end::lang::*;

use super::constprop::{self, evaluate_binary, Value};
use super::{liveness, Cfg, EdgeKind};

/// Returns the indices of dead statements in the given method, in program
/// order.
pub fn analyze(program: &Valid<Program>, method: &MethodRef) -> Set<usize> {
    let ir = program
        .0
        .ir(method)
        .unwrap_or_else(|| panic!("no IR for {method}"));
    let cfg = Cfg::new(ir);
    let constants = constprop::analyze(program, method);
    let live = liveness::analyze(program, method);

    // find all reachable nodes, pruning branches whose condition the
    // constants decide.
    let mut reachable = Set::new();
    let mut worklist = VecDeque::new();
    reachable.insert(cfg.entry);
    worklist.push_back(cfg.entry);

    while let Some(node) = worklist.pop_front() {
        let mut enqueue = |n: usize, reachable: &mut Set<usize>, worklist: &mut VecDeque<usize>| {
            if reachable.insert(n) {
                worklist.push_back(n);
            }
        };

        let stmt = cfg.stmt(ir, node);
        match stmt.map(|s| &s.kind) {
            Some(StmtKind::If { op, lhs, rhs, .. }) => {
                let input = constants.in_fact(node);
                let cond = evaluate_binary(*op, input.get(lhs), input.get(rhs));
                if let Some(c) = cond.as_const() {
                    let taken = if c != 0 {
                        EdgeKind::IfTrue
                    } else {
                        EdgeKind::IfFalse
                    };
                    for edge in cfg.succ(node) {
                        if edge.kind == taken {
                            enqueue(edge.target, &mut reachable, &mut worklist);
                        }
                    }
                    continue;
                }
            }
            Some(StmtKind::Switch { key, cases, .. }) => {
                let input = constants.in_fact(node);
                if let Value::Const(k) = input.get(key) {
                    let matched = cases.iter().any(|(v, _)| *v == k);
                    for edge in cfg.succ(node) {
                        let taken = match edge.kind {
                            EdgeKind::SwitchCase(v) => v == k,
                            EdgeKind::SwitchDefault => !matched,
                            _ => false,
                        };
                        if taken {
                            enqueue(edge.target, &mut reachable, &mut worklist);
                        }
                    }
                    continue;
                }
            }
            _ => (),
        }

        for edge in cfg.succ(node) {
            enqueue(edge.target, &mut reachable, &mut worklist);
        }
    }

    let mut dead = Set::new();
    for stmt in &ir.stmts {
        let node = cfg.node_of(stmt.index);
        if !reachable.contains(&node) {
            dead.insert(stmt.index);
            continue;
        }
        // a reachable assignment is dead when its target is not live
        // afterwards and computing the right-hand side cannot be observed.
        if let Some(lhs) = stmt.def_var() {
            if !live.out_fact(node).contains(lhs) && has_no_side_effect(stmt) {
                dead.insert(stmt.index);
            }
        }
    }
    dead
}

// whether the right-hand side of a defining statement can be dropped:
// allocations touch the heap, casts can fail, field/array accesses can fault
// or trigger initialization, division and remainder can fault, and calls do
// anything at all.
fn has_no_side_effect(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Copy { .. } => true,
        StmtKind::Assign { rhs, .. } => match rhs {
            Exp::Const(_) => true,
            Exp::Cast { .. } => false,
            Exp::Binary { op, .. } => !matches!(op, BinOp::Div | BinOp::Rem),
        },
        _ => false,
    }
}
