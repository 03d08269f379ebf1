//! The interprocedural control-flow graph: the union of per-method CFGs,
//! stitched together with call and return edges from a completed call graph.

use std::collections::BTreeMap as Map;
use std::fmt::{self, Display, Formatter};

use crate::middle_end::analysis::Cfg;
use crate::middle_end::callgraph::CallGraph;
use crate::middle_end::lang::*;

/// A node of the ICFG: a CFG node of some method.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IcfgNode {
    pub method: MethodRef,
    pub node: usize,
}

impl Display for IcfgNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.node)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IcfgEdgeKind {
    /// An intraprocedural edge that does not leave a call site.
    Normal,
    /// Call site to its return site, skipping the callee.
    CallToReturn,
    /// Call site to a callee's entry.
    Call { callee: MethodRef },
    /// A callee's exit back to the return site; carries the callee's return
    /// variables.
    Return {
        call_site: IcfgNode,
        ret_vars: Vec<VarId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcfgEdge {
    pub kind: IcfgEdgeKind,
    pub src: IcfgNode,
    pub dst: IcfgNode,
}

#[derive(Clone, Debug)]
pub struct Icfg {
    pub entry_method: MethodRef,
    pub cfgs: Map<MethodRef, Cfg>,
    in_edges: Map<IcfgNode, Vec<IcfgEdge>>,
    out_edges: Map<IcfgNode, Vec<IcfgEdge>>,
    nodes: Vec<IcfgNode>,
}

impl Icfg {
    /// Builds the ICFG over every method the call graph reached.
    pub fn new(program: &Program, call_graph: &CallGraph) -> Icfg {
        let mut cfgs: Map<MethodRef, Cfg> = Map::new();
        let mut reachable: Vec<&MethodRef> = call_graph.reachable_methods().collect();
        reachable.sort();
        for method in &reachable {
            if let Some(ir) = program.ir(method) {
                cfgs.insert((*method).clone(), Cfg::new(ir));
            }
        }

        let mut nodes = vec![];
        let mut in_edges: Map<IcfgNode, Vec<IcfgEdge>> = Map::new();
        let mut out_edges: Map<IcfgNode, Vec<IcfgEdge>> = Map::new();
        let mut add_edge = |edge: IcfgEdge| {
            in_edges
                .entry(edge.dst.clone())
                .or_default()
                .push(edge.clone());
            out_edges.entry(edge.src.clone()).or_default().push(edge);
        };

        // intraprocedural edges; edges leaving a call site with at least one
        // resolved callee become call-to-return edges.
        for (method, cfg) in &cfgs {
            let ir = program.ir(method).unwrap();
            for node in cfg.nodes() {
                nodes.push(IcfgNode {
                    method: method.clone(),
                    node,
                });
                let is_call = cfg.stmt(ir, node).is_some_and(|s| s.as_invoke().is_some());
                for edge in cfg.succ(node) {
                    let kind = if is_call {
                        IcfgEdgeKind::CallToReturn
                    } else {
                        IcfgEdgeKind::Normal
                    };
                    add_edge(IcfgEdge {
                        kind,
                        src: IcfgNode {
                            method: method.clone(),
                            node,
                        },
                        dst: IcfgNode {
                            method: method.clone(),
                            node: edge.target,
                        },
                    });
                }
            }
        }

        // call and return edges.
        for call_edge in call_graph.edges() {
            let site = &call_edge.site;
            let callee = &call_edge.callee;
            let Some(callee_cfg) = cfgs.get(callee) else {
                // bodiless callee: the call contributes no interprocedural
                // flow; the call-to-return edge already covers the site.
                continue;
            };
            let caller_cfg = &cfgs[&site.method];
            let call_node = IcfgNode {
                method: site.method.clone(),
                node: caller_cfg.node_of(site.index),
            };
            add_edge(IcfgEdge {
                kind: IcfgEdgeKind::Call {
                    callee: callee.clone(),
                },
                src: call_node.clone(),
                dst: IcfgNode {
                    method: callee.clone(),
                    node: callee_cfg.entry,
                },
            });

            let ret_vars = program.ir(callee).unwrap().return_vars.clone();
            // the return sites are the call node's intraprocedural
            // successors.
            for edge in caller_cfg.succ(call_node.node) {
                add_edge(IcfgEdge {
                    kind: IcfgEdgeKind::Return {
                        call_site: call_node.clone(),
                        ret_vars: ret_vars.clone(),
                    },
                    src: IcfgNode {
                        method: callee.clone(),
                        node: callee_cfg.exit,
                    },
                    dst: IcfgNode {
                        method: site.method.clone(),
                        node: edge.target,
                    },
                });
            }
        }

        drop(add_edge);
        Icfg {
            entry_method: call_graph.entry.clone(),
            cfgs,
            in_edges,
            out_edges,
            nodes,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &IcfgNode> {
        self.nodes.iter()
    }

    pub fn in_edges_of(&self, node: &IcfgNode) -> impl Iterator<Item = &IcfgEdge> {
        self.in_edges.get(node).into_iter().flatten()
    }

    pub fn out_edges_of(&self, node: &IcfgNode) -> impl Iterator<Item = &IcfgEdge> {
        self.out_edges.get(node).into_iter().flatten()
    }

    /// The entry node of the entry method.
    pub fn entry_node(&self) -> IcfgNode {
        let cfg = &self.cfgs[&self.entry_method];
        IcfgNode {
            method: self.entry_method.clone(),
            node: cfg.entry,
        }
    }

    pub fn stmt<'a>(&self, program: &'a Program, node: &IcfgNode) -> Option<&'a Stmt> {
        let cfg = &self.cfgs[&node.method];
        cfg.stmt(program.ir(&node.method).unwrap(), node.node)
    }
}
