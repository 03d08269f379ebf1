//! Context-sensitive points-to analysis.  The solver is the inclusion-based
//! engine of the context-insensitive variant with every entity paired with a
//! context, plus the taint plugin hooks.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::commons::Valid;
use crate::middle_end::callgraph::{dispatch, CallEdge, CallGraph, CallKind};
use crate::middle_end::lang::*;
use crate::middle_end::taint::TaintPlugin;

use super::context::{Context, ContextManager};
use super::heap::{HeapModel, Obj};
use super::pts::{PointsToSet, WorkList};
use super::result::PointerAnalysisResult;
use super::selector::ContextSelector;

// SECTION: contextualized elements

/// A variable in a context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CsVar {
    pub ctx: Context,
    pub var: VarId,
}

impl CsVar {
    pub fn context_free(var: VarId) -> CsVar {
        CsVar {
            ctx: Context::root(),
            var,
        }
    }
}

impl Display for CsVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.ctx, self.var.method(), self.var)
    }
}

/// A heap object in a (heap) context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CsObj {
    pub ctx: Context,
    pub obj: Obj,
}

impl Display for CsObj {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ctx, self.obj)
    }
}

/// A method in a context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CsMethod {
    pub ctx: Context,
    pub method: MethodRef,
}

impl Display for CsMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ctx, self.method)
    }
}

/// A call site in the caller's context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CsCallSite {
    pub ctx: Context,
    pub site: Site,
}

/// A node of the contextualized pointer-flow graph.  Static fields stay
/// context-free: static state is shared program-wide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pointer {
    Var(CsVar),
    StaticField(FieldRef),
    InstanceField(CsObj, FieldRef),
    ArrayIndex(CsObj),
}

impl Display for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Var(v) => write!(f, "{v}"),
            Pointer::StaticField(fr) => write!(f, "{fr}"),
            Pointer::InstanceField(o, fr) => write!(f, "{o}.{}", fr.name()),
            Pointer::ArrayIndex(o) => write!(f, "{o}[*]"),
        }
    }
}

// SECTION: solver

/// Runs the analysis from the given entry method with the given context
/// policy; `taint` optionally layers taint tracking into the solve.
pub fn analyze(
    program: &Valid<Program>,
    entry: MethodRef,
    selector: Box<dyn ContextSelector>,
    taint: Option<TaintPlugin>,
) -> PointerAnalysisResult {
    let mut solver = Solver {
        program: &program.0,
        selector,
        ctx_mgr: ContextManager::new(),
        heap: HeapModel::new(),
        pts: Map::new(),
        succs: Map::new(),
        reachable: Set::new(),
        cs_edges: Set::new(),
        call_graph: CallGraph::new(entry.clone()),
        worklist: WorkList::new(),
        taint,
    };
    solver.initialize(entry);
    solver.solve();
    solver.into_result()
}

struct Solver<'p> {
    program: &'p Program,
    selector: Box<dyn ContextSelector>,
    ctx_mgr: ContextManager,
    heap: HeapModel,
    pts: Map<Pointer, PointsToSet<CsObj>>,
    succs: Map<Pointer, Set<Pointer>>,
    reachable: Set<CsMethod>,
    cs_edges: Set<(CallKind, CsCallSite, CsMethod)>,
    /// The context-flattened call graph reported in the result.
    call_graph: CallGraph,
    worklist: WorkList<Pointer, CsObj>,
    taint: Option<TaintPlugin>,
}

impl Solver<'_> {
    fn initialize(&mut self, entry: MethodRef) {
        let ctx = self.ctx_mgr.empty();
        self.call_graph.add_reachable(entry.clone());
        self.add_reachable(&CsMethod {
            ctx,
            method: entry,
        });
    }

    fn pt(&self, p: &Pointer) -> PointsToSet<CsObj> {
        self.pts.get(p).cloned().unwrap_or_default()
    }

    fn add_reachable(&mut self, cs_method: &CsMethod) {
        if !self.reachable.insert(cs_method.clone()) {
            return;
        }
        self.call_graph.add_reachable(cs_method.method.clone());
        let ctx = &cs_method.ctx;
        let Some(ir) = self.program.ir(&cs_method.method) else {
            debug!("no IR for reachable method {}", cs_method.method);
            return;
        };
        for stmt in &ir.stmts {
            match &stmt.kind {
                StmtKind::New { lhs, typ } => {
                    let site = Site::new(cs_method.method.clone(), stmt.index);
                    let obj = self.heap.obj_at(site, typ.clone());
                    let heap_ctx = self.selector.select_heap_context(&mut self.ctx_mgr, ctx, &obj);
                    let cs_obj = CsObj {
                        ctx: heap_ctx,
                        obj,
                    };
                    self.worklist.add_obj(
                        Pointer::Var(CsVar {
                            ctx: ctx.clone(),
                            var: lhs.clone(),
                        }),
                        cs_obj,
                    );
                }
                StmtKind::Copy { lhs, rhs } => {
                    self.add_pfg_edge(
                        Pointer::Var(CsVar {
                            ctx: ctx.clone(),
                            var: rhs.clone(),
                        }),
                        Pointer::Var(CsVar {
                            ctx: ctx.clone(),
                            var: lhs.clone(),
                        }),
                    );
                }
                StmtKind::LoadField {
                    lhs,
                    access: FieldAccess::Static { field },
                } => {
                    self.add_pfg_edge(
                        Pointer::StaticField(field.clone()),
                        Pointer::Var(CsVar {
                            ctx: ctx.clone(),
                            var: lhs.clone(),
                        }),
                    );
                }
                StmtKind::StoreField {
                    access: FieldAccess::Static { field },
                    rhs,
                } => {
                    self.add_pfg_edge(
                        Pointer::Var(CsVar {
                            ctx: ctx.clone(),
                            var: rhs.clone(),
                        }),
                        Pointer::StaticField(field.clone()),
                    );
                }
                StmtKind::Invoke(invoke) if invoke.kind == InvokeKind::Static => {
                    let site = Site::new(cs_method.method.clone(), stmt.index);
                    let Some(callee) = self
                        .program
                        .declared_method(invoke.target.class(), invoke.target.subsig())
                        .map(|m| m.id.clone())
                    else {
                        debug!("unresolvable static call at {site}");
                        continue;
                    };
                    let callee_ctx =
                        self.selector
                            .select_context(&mut self.ctx_mgr, ctx, &site, &callee);
                    self.add_call_edge(CallKind::Static, ctx.clone(), site, invoke, callee_ctx, callee);
                }
                _ => (),
            }
        }
    }

    fn add_pfg_edge(&mut self, source: Pointer, target: Pointer) {
        if self
            .succs
            .entry(source.clone())
            .or_default()
            .insert(target.clone())
        {
            let pts = self.pt(&source);
            if !pts.is_empty() {
                self.worklist.add(target, &pts);
            }
        }
    }

    /// Adds a contextualized call edge; on a new edge the callee becomes
    /// reachable, arguments and returns get wired, and the taint plugin
    /// processes sources and transfers at the site.
    fn add_call_edge(
        &mut self,
        kind: CallKind,
        caller_ctx: Context,
        site: Site,
        invoke: &Invoke,
        callee_ctx: Context,
        callee: MethodRef,
    ) {
        let cs_site = CsCallSite {
            ctx: caller_ctx.clone(),
            site: site.clone(),
        };
        let cs_callee = CsMethod {
            ctx: callee_ctx.clone(),
            method: callee.clone(),
        };
        if !self.cs_edges.insert((kind, cs_site, cs_callee.clone())) {
            return;
        }
        self.call_graph.add_edge(CallEdge {
            kind,
            site: site.clone(),
            callee: callee.clone(),
        });

        self.add_reachable(&cs_callee);

        if let Some(callee_ir) = self.program.ir(&callee) {
            assert_eq!(
                invoke.args.len(),
                callee_ir.params.len(),
                "arity mismatch calling {callee}"
            );
            for (arg, param) in invoke.args.iter().zip(&callee_ir.params) {
                self.add_pfg_edge(
                    Pointer::Var(CsVar {
                        ctx: caller_ctx.clone(),
                        var: arg.clone(),
                    }),
                    Pointer::Var(CsVar {
                        ctx: callee_ctx.clone(),
                        var: param.clone(),
                    }),
                );
            }
            if let Some(lhs) = &invoke.lhs {
                for ret in callee_ir.return_vars.clone() {
                    self.add_pfg_edge(
                        Pointer::Var(CsVar {
                            ctx: callee_ctx.clone(),
                            var: ret,
                        }),
                        Pointer::Var(CsVar {
                            ctx: caller_ctx.clone(),
                            var: lhs.clone(),
                        }),
                    );
                }
            }
        }

        if let Some(taint) = self.taint.as_mut() {
            taint.on_call_edge(
                self.program,
                &caller_ctx,
                &site,
                invoke,
                &callee,
                &self.pts,
                &mut self.worklist,
            );
        }
    }

    fn solve(&mut self) {
        while let Some((pointer, pts)) = self.worklist.pop() {
            let delta = self.propagate(&pointer, &pts);
            if delta.is_empty() {
                continue;
            }
            if let Some(taint) = self.taint.as_mut() {
                taint.on_propagate(&pointer, &delta, &mut self.worklist);
            }
            if let Pointer::Var(cs_var) = &pointer {
                let cs_var = cs_var.clone();
                for cs_obj in delta.iter() {
                    // taint markers are not real heap objects: they have no
                    // fields, no array cells, and no dispatchable type.
                    if cs_obj.obj.is_taint() {
                        continue;
                    }
                    self.process_instance_accesses(&cs_var, cs_obj);
                    self.process_call(&cs_var, cs_obj);
                }
            }
        }
    }

    fn propagate(&mut self, pointer: &Pointer, pts: &PointsToSet<CsObj>) -> PointsToSet<CsObj> {
        let target = self.pts.entry(pointer.clone()).or_default();
        let mut delta = PointsToSet::new();
        for obj in pts.iter() {
            if target.add(obj.clone()) {
                delta.add(obj.clone());
            }
        }
        if !delta.is_empty() {
            let succs: Vec<Pointer> = self
                .succs
                .get(pointer)
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            for succ in succs {
                self.worklist.add(succ, &delta);
            }
        }
        delta
    }

    fn process_instance_accesses(&mut self, cs_var: &CsVar, cs_obj: &CsObj) {
        let ir = self
            .program
            .ir(cs_var.var.method())
            .expect("reachable method has IR");
        let ctx = &cs_var.ctx;
        let stmt = |i: &usize| &ir.stmts[*i];

        for i in ir.field_stores_on.get(&cs_var.var).into_iter().flatten() {
            if let StmtKind::StoreField { access, rhs } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::Var(CsVar {
                        ctx: ctx.clone(),
                        var: rhs.clone(),
                    }),
                    Pointer::InstanceField(cs_obj.clone(), access.field().clone()),
                );
            }
        }
        for i in ir.field_loads_on.get(&cs_var.var).into_iter().flatten() {
            if let StmtKind::LoadField { lhs, access } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::InstanceField(cs_obj.clone(), access.field().clone()),
                    Pointer::Var(CsVar {
                        ctx: ctx.clone(),
                        var: lhs.clone(),
                    }),
                );
            }
        }
        for i in ir.array_stores_on.get(&cs_var.var).into_iter().flatten() {
            if let StmtKind::StoreArray { rhs, .. } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::Var(CsVar {
                        ctx: ctx.clone(),
                        var: rhs.clone(),
                    }),
                    Pointer::ArrayIndex(cs_obj.clone()),
                );
            }
        }
        for i in ir.array_loads_on.get(&cs_var.var).into_iter().flatten() {
            if let StmtKind::LoadArray { lhs, .. } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::ArrayIndex(cs_obj.clone()),
                    Pointer::Var(CsVar {
                        ctx: ctx.clone(),
                        var: lhs.clone(),
                    }),
                );
            }
        }
    }

    fn process_call(&mut self, recv: &CsVar, recv_obj: &CsObj) {
        let ir = self
            .program
            .ir(recv.var.method())
            .expect("reachable method has IR");
        let caller_ctx = recv.ctx.clone();
        let invokes: Vec<(Site, Invoke)> = ir
            .invokes_on
            .get(&recv.var)
            .into_iter()
            .flatten()
            .map(|i| {
                (
                    Site::new(recv.var.method().clone(), *i),
                    ir.stmts[*i].as_invoke().unwrap().clone(),
                )
            })
            .collect();

        for (site, invoke) in invokes {
            let Some(class) = recv_obj.obj.typ().and_then(|t| t.dispatch_class()) else {
                continue;
            };
            let Some(callee) = dispatch(self.program, &class, invoke.target.subsig()) else {
                debug!("unresolvable dispatch at {site} on {}", recv_obj.obj);
                continue;
            };
            let callee_ctx = self.selector.select_context_with_recv(
                &mut self.ctx_mgr,
                &caller_ctx,
                &site,
                &recv_obj.ctx,
                &recv_obj.obj,
                &callee,
            );
            // the receiver object reaches the callee's `this`.
            if let Some(this) = self.program.ir(&callee).and_then(|ir| ir.this.clone()) {
                self.worklist.add_obj(
                    Pointer::Var(CsVar {
                        ctx: callee_ctx.clone(),
                        var: this,
                    }),
                    recv_obj.clone(),
                );
            }
            self.add_call_edge(
                CallKind::of(&invoke),
                caller_ctx.clone(),
                site,
                &invoke,
                callee_ctx,
                callee,
            );
        }
    }

    fn into_result(mut self) -> PointerAnalysisResult {
        let mut result = PointerAnalysisResult::new(self.call_graph);
        for (pointer, pts) in &self.pts {
            if let Pointer::Var(cs_var) = pointer {
                result.add_cs_var(cs_var.clone(), pts);
            }
        }
        if let Some(taint) = self.taint.take() {
            result.taint_flows = taint.collect_flows(self.program, &result);
        }
        result
    }
}
