//! Taint analysis as a plugin of the context-sensitive points-to solver.
//!
//! Sources inject marker objects at configured call sites, transfers relay
//! them between call-site locations through a taint-flow graph, and at the
//! end every configured sink argument is checked for markers that reached
//! it.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::middle_end::lang::*;
use crate::middle_end::pta::context::Context;
use crate::middle_end::pta::cs::{CsObj, CsVar, Pointer};
use crate::middle_end::pta::heap::TaintObjManager;
use crate::middle_end::pta::pts::{PointsToSet, WorkList};
use crate::middle_end::pta::result::PointerAnalysisResult;

pub mod config;

pub use self::config::{TaintConfig, TaintConfigError, TaintLoc};

/// A detected flow: a source call site whose marker reached the `index`-th
/// argument of a sink call site.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaintFlow {
    pub source: Site,
    pub sink: Site,
    pub index: usize,
}

impl Display for TaintFlow {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}/{}", self.source, self.sink, self.index)
    }
}

#[derive(Clone, Debug)]
struct Transfer {
    from: TaintLoc,
    to: TaintLoc,
    label: String,
}

/// The plugin the context-sensitive solver drives.  Taint objects always
/// live in the empty context.
#[derive(Debug)]
pub struct TaintPlugin {
    sources: Map<MethodRef, Vec<String>>,
    sinks: Map<MethodRef, Vec<usize>>,
    transfers: Map<MethodRef, Vec<Transfer>>,
    manager: TaintObjManager,
    /// Taint-flow graph: edges carry the taint label of the destination.
    tfg: Map<Pointer, Set<(Pointer, String)>>,
}

impl TaintPlugin {
    /// Resolves the configuration against the program.  Entries naming
    /// methods the program does not declare are dropped with a debug log:
    /// they describe code outside this program.
    pub fn new(program: &Program, config: &TaintConfig) -> TaintPlugin {
        let resolve = |pattern: &config::MethodPattern| -> Option<MethodRef> {
            let class = class_id(&pattern.class);
            let params: Vec<Type> = pattern
                .params
                .iter()
                .map(|name| parse_type_name(program, name))
                .collect::<Option<_>>()?;
            let sig = subsig(&pattern.name, params);
            if program.declared_method(&class, &sig).is_some() {
                Some(method_ref(class, sig))
            } else {
                debug!("taint config names unknown method {class}::{sig}");
                None
            }
        };

        let mut plugin = TaintPlugin {
            sources: Map::new(),
            sinks: Map::new(),
            transfers: Map::new(),
            manager: TaintObjManager::default(),
            tfg: Map::new(),
        };
        for s in &config.sources {
            if let Some(m) = resolve(&s.method) {
                plugin.sources.entry(m).or_default().push(s.label.clone());
            }
        }
        for s in &config.sinks {
            if let Some(m) = resolve(&s.method) {
                plugin.sinks.entry(m).or_default().push(s.index);
            }
        }
        for t in &config.transfers {
            if let Some(m) = resolve(&t.method) {
                plugin.transfers.entry(m).or_default().push(Transfer {
                    from: t.from,
                    to: t.to,
                    label: t.label.clone(),
                });
            }
        }
        plugin
    }

    /// Whether a contextualized object is a taint marker.
    pub fn is_taint(cs_obj: &CsObj) -> bool {
        cs_obj.obj.is_taint() && cs_obj.ctx.is_empty()
    }

    /// Called by the solver on every new call edge: synthesize source
    /// markers into the call's result, and install transfer edges.
    #[allow(clippy::too_many_arguments)]
    pub fn on_call_edge(
        &mut self,
        _program: &Program,
        caller_ctx: &Context,
        site: &Site,
        invoke: &Invoke,
        callee: &MethodRef,
        pts: &Map<Pointer, PointsToSet<CsObj>>,
        worklist: &mut WorkList<Pointer, CsObj>,
    ) {
        // sources bind a fresh marker to the call result.
        if let (Some(labels), Some(lhs)) = (self.sources.get(callee), &invoke.lhs) {
            let mut taints = PointsToSet::new();
            for label in labels.clone() {
                let obj = self.manager.make_taint(site.clone(), &label);
                taints.add(CsObj {
                    ctx: Context::root(),
                    obj,
                });
            }
            if !taints.is_empty() {
                worklist.add(
                    Pointer::Var(CsVar {
                        ctx: caller_ctx.clone(),
                        var: lhs.clone(),
                    }),
                    &taints,
                );
            }
        }

        // transfers become taint-flow edges between call-site locations.
        let transfers = match self.transfers.get(callee) {
            Some(ts) => ts.clone(),
            None => return,
        };
        for t in transfers {
            let (Some(from), Some(to)) = (loc_var(invoke, t.from), loc_var(invoke, t.to)) else {
                continue;
            };
            let from = Pointer::Var(CsVar {
                ctx: caller_ctx.clone(),
                var: from,
            });
            let to = Pointer::Var(CsVar {
                ctx: caller_ctx.clone(),
                var: to,
            });
            if self
                .tfg
                .entry(from.clone())
                .or_default()
                .insert((to.clone(), t.label.clone()))
            {
                // forward markers that already reached the edge's source.
                if let Some(present) = pts.get(&from) {
                    let relabeled = self.relabel(present, &t.label);
                    if !relabeled.is_empty() {
                        worklist.add(to, &relabeled);
                    }
                }
            }
        }
    }

    /// Called by the solver whenever propagation grows a pointer: forward
    /// the taint part of the delta to the taint-flow successors.
    pub fn on_propagate(
        &mut self,
        pointer: &Pointer,
        delta: &PointsToSet<CsObj>,
        worklist: &mut WorkList<Pointer, CsObj>,
    ) {
        let succs: Vec<(Pointer, String)> = match self.tfg.get(pointer) {
            Some(s) => s.iter().cloned().collect(),
            None => return,
        };
        for (succ, label) in succs {
            let relabeled = self.relabel(delta, &label);
            if !relabeled.is_empty() {
                worklist.add(succ, &relabeled);
            }
        }
    }

    // the taint markers of `pts`, re-issued with the given label; source
    // call sites are preserved.
    fn relabel(&mut self, pts: &PointsToSet<CsObj>, label: &str) -> PointsToSet<CsObj> {
        let mut result = PointsToSet::new();
        for cs_obj in pts.iter() {
            if !Self::is_taint(cs_obj) {
                continue;
            }
            let (source, _) = cs_obj.obj.taint_source().expect("marker has a source");
            let obj = self.manager.make_taint(source.clone(), label);
            result.add(CsObj {
                ctx: Context::root(),
                obj,
            });
        }
        result
    }

    /// Called once the solver finishes: every marker sitting in a sink
    /// argument is a flow.
    pub fn collect_flows(
        &self,
        program: &Program,
        result: &PointerAnalysisResult,
    ) -> Vec<TaintFlow> {
        let mut flows = Set::new();
        for edge in result.call_graph().edges() {
            let Some(indexes) = self.sinks.get(&edge.callee) else {
                continue;
            };
            let invoke = program
                .ir(&edge.site.method)
                .and_then(|ir| ir.stmts[edge.site.index].as_invoke())
                .expect("call edge site is an invoke");
            for &index in indexes {
                let Some(arg) = invoke.args.get(index) else {
                    debug!("sink index {index} out of range at {}", edge.site);
                    continue;
                };
                for obj in result.points_to(arg).iter() {
                    if let Some((source, _)) = obj.taint_source() {
                        flows.insert(TaintFlow {
                            source: source.clone(),
                            sink: edge.site.clone(),
                            index,
                        });
                    }
                }
            }
        }
        flows.into_iter().collect()
    }
}

fn loc_var(invoke: &Invoke, loc: TaintLoc) -> Option<VarId> {
    match loc {
        TaintLoc::Base => invoke.recv.clone(),
        TaintLoc::Result => invoke.lhs.clone(),
        TaintLoc::Arg(i) => invoke.args.get(i).cloned(),
    }
}

fn parse_type_name(program: &Program, name: &str) -> Option<Type> {
    let mut base = name;
    let mut dims = 0;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped;
        dims += 1;
    }
    let mut typ = match base {
        "int" => Type::Int,
        "boolean" => Type::Boolean,
        "byte" => Type::Byte,
        "short" => Type::Short,
        "char" => Type::Char,
        _ => {
            let id = class_id(base);
            if !program.classes.contains_key(&id) {
                return None;
            }
            Type::Class(id)
        }
    };
    for _ in 0..dims {
        typ = Type::array_of(typ);
    }
    Some(typ)
}
