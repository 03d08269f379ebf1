//! Intraprocedural dataflow analysis: the statement-level control-flow graph
//! and a generic worklist solver parameterized over the analysis.

use std::collections::BTreeSet as Set;
use std::collections::VecDeque;

use crate::middle_end::lang::*;

pub mod constprop;
pub mod deadcode;
pub mod liveness;

#[cfg(test)]
mod tests;

// SECTION: control-flow graph

/// A node in a method's CFG.  Node 0 is the synthetic entry, node
/// `n_stmts + 1` the synthetic exit, and statement `i` sits at node `i + 1`.
pub type NodeId = usize;

/// Why an edge exists; dead-code detection prunes on the branch kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Fall,
    IfTrue,
    IfFalse,
    SwitchCase(i32),
    SwitchDefault,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CfgEdge {
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// The control-flow graph for one method, with distinguished entry and exit.
#[derive(Clone, Debug)]
pub struct Cfg {
    pub method: MethodRef,
    pub entry: NodeId,
    pub exit: NodeId,
    pub params: Vec<VarId>,
    n_stmts: usize,
    succ_edges: Vec<Vec<CfgEdge>>,
    pred_edges: Vec<Vec<(NodeId, EdgeKind)>>,
}

impl Cfg {
    pub fn new(ir: &Ir) -> Self {
        let n = ir.stmts.len();
        let entry = 0;
        let exit = n + 1;
        let mut succ_edges: Vec<Vec<CfgEdge>> = vec![vec![]; n + 2];
        let mut pred_edges: Vec<Vec<(NodeId, EdgeKind)>> = vec![vec![]; n + 2];

        let mut add = |from: NodeId, to: NodeId, kind: EdgeKind| {
            succ_edges[from].push(CfgEdge { target: to, kind });
            pred_edges[to].push((from, kind));
        };

        // the entry flows into the first statement (or straight to exit for
        // an empty body).
        add(entry, if n == 0 { exit } else { 1 }, EdgeKind::Fall);

        for stmt in &ir.stmts {
            let node = stmt.index + 1;
            // fall-through successor: the next statement or the exit.
            let fall = if stmt.index + 1 < n { node + 1 } else { exit };
            match &stmt.kind {
                StmtKind::If { target, .. } => {
                    add(node, *target + 1, EdgeKind::IfTrue);
                    add(node, fall, EdgeKind::IfFalse);
                }
                StmtKind::Goto { target } => add(node, *target + 1, EdgeKind::Fall),
                StmtKind::Switch { cases, default, .. } => {
                    for (value, target) in cases {
                        add(node, *target + 1, EdgeKind::SwitchCase(*value));
                    }
                    add(node, *default + 1, EdgeKind::SwitchDefault);
                }
                StmtKind::Return { .. } => add(node, exit, EdgeKind::Fall),
                _ => add(node, fall, EdgeKind::Fall),
            }
        }

        Cfg {
            method: ir.method.clone(),
            entry,
            exit,
            params: ir.params.clone(),
            n_stmts: n,
            succ_edges,
            pred_edges,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.n_stmts + 2
    }

    pub fn n_nodes(&self) -> usize {
        self.n_stmts + 2
    }

    // an iterator over the successor edges of a node.
    pub fn succ(&self, node: NodeId) -> impl Iterator<Item = &CfgEdge> {
        self.succ_edges[node].iter()
    }

    // an iterator over the predecessors of a node.
    pub fn pred(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.pred_edges[node].iter().map(|(n, _)| *n)
    }

    // predecessors together with the kind of the connecting edge.
    pub fn pred_edges(&self, node: NodeId) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.pred_edges[node].iter().copied()
    }

    /// The statement at a node; `None` for entry and exit.
    pub fn stmt<'a>(&self, ir: &'a Ir, node: NodeId) -> Option<&'a Stmt> {
        if node == self.entry || node == self.exit {
            None
        } else {
            Some(&ir.stmts[node - 1])
        }
    }

    pub fn node_of(&self, stmt_index: usize) -> NodeId {
        stmt_index + 1
    }
}

// SECTION: dataflow framework

/// Per-node in/out facts of a finished analysis.
#[derive(Clone, Debug)]
pub struct DataflowResult<F> {
    pub in_facts: Vec<F>,
    pub out_facts: Vec<F>,
}

impl<F> DataflowResult<F> {
    pub fn in_fact(&self, node: NodeId) -> &F {
        &self.in_facts[node]
    }

    pub fn out_fact(&self, node: NodeId) -> &F {
        &self.out_facts[node]
    }
}

/// The capability set a dataflow analysis provides to the generic solver.
pub trait DataflowAnalysis {
    type Fact: Clone + PartialEq;

    fn is_forward(&self) -> bool;

    /// The fact at the boundary node (entry for forward analyses, exit for
    /// backward ones).
    fn new_boundary_fact(&self, cfg: &Cfg) -> Self::Fact;

    fn new_initial_fact(&self) -> Self::Fact;

    /// `target := target ⊓ fact`.
    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact);

    /// Transform a fact as it flows along an edge out of `src`; `None`
    /// means the edge is infeasible under the fact and carries nothing.
    /// The default is the identity; constant propagation prunes branch
    /// edges its facts decide.
    fn transfer_edge(
        &self,
        _cfg: &Cfg,
        _ir: &Ir,
        _src: NodeId,
        _kind: EdgeKind,
        fact: &Self::Fact,
    ) -> Option<Self::Fact> {
        Some(fact.clone())
    }

    /// Apply the node's transfer; returns whether `out` changed.
    fn transfer_node(
        &self,
        cfg: &Cfg,
        ir: &Ir,
        node: NodeId,
        input: &Self::Fact,
        out: &mut Self::Fact,
    ) -> bool;
}

/// Worklist solver over a single method's CFG.  Work spreads as a wavefront
/// from the boundary: a node is (re)enqueued when an upstream fact changes
/// or when it is first reached, and never across an edge the analysis
/// reports infeasible.  Termination follows from the finite height of the
/// fact lattice and monotone transfers.
pub fn solve<A: DataflowAnalysis>(analysis: &A, cfg: &Cfg, ir: &Ir) -> DataflowResult<A::Fact> {
    let forward = analysis.is_forward();
    let boundary = if forward { cfg.entry } else { cfg.exit };

    let mut in_facts: Vec<A::Fact> = (0..cfg.n_nodes())
        .map(|_| analysis.new_initial_fact())
        .collect();
    let mut out_facts: Vec<A::Fact> = (0..cfg.n_nodes())
        .map(|_| analysis.new_initial_fact())
        .collect();
    // two independent copies so the boundary's in and out never alias.
    in_facts[boundary] = analysis.new_boundary_fact(cfg);
    out_facts[boundary] = analysis.new_boundary_fact(cfg);

    // for a backward analysis the solver runs on the mirrored graph: "in" is
    // computed from successors and the node pushes its predecessors.  both
    // lists pair the neighbor with the kind of the connecting edge.
    let upstream = |node: NodeId| -> Vec<(NodeId, EdgeKind)> {
        if forward {
            cfg.pred_edges(node).collect()
        } else {
            cfg.succ(node).map(|e| (e.target, e.kind)).collect()
        }
    };
    let downstream = |node: NodeId| -> Vec<(NodeId, EdgeKind)> {
        if forward {
            cfg.succ(node).map(|e| (e.target, e.kind)).collect()
        } else {
            cfg.pred_edges(node).collect()
        }
    };

    let mut worklist: VecDeque<NodeId> = VecDeque::from([boundary]);
    let mut queued: Set<NodeId> = Set::from([boundary]);
    let mut visited: Set<NodeId> = Set::from([boundary]);

    while let Some(node) = worklist.pop_front() {
        queued.remove(&node);

        if node != boundary {
            let mut input = analysis.new_initial_fact();
            for (up, kind) in upstream(node) {
                if let Some(fact) = analysis.transfer_edge(cfg, ir, up, kind, &out_facts[up]) {
                    analysis.meet_into(&fact, &mut input);
                }
            }
            in_facts[node] = input;
        }

        let input = in_facts[node].clone();
        let mut out = out_facts[node].clone();
        let changed = analysis.transfer_node(cfg, ir, node, &input, &mut out);
        out_facts[node] = out;

        for (down, kind) in downstream(node) {
            // infeasible edges neither carry facts nor reach their target.
            if analysis
                .transfer_edge(cfg, ir, node, kind, &out_facts[node])
                .is_none()
            {
                continue;
            }
            let first_visit = visited.insert(down);
            if (changed || first_visit) && queued.insert(down) {
                worklist.push_back(down);
            }
        }
    }

    if forward {
        DataflowResult {
            in_facts,
            out_facts,
        }
    } else {
        // facts are stored mirrored for backward analyses: what the solver
        // called "in" is the post state.  swap so callers always see
        // program-order in/out.
        DataflowResult {
            in_facts: out_facts,
            out_facts: in_facts,
        }
    }
}
