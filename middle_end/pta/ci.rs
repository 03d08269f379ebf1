//! Context-insensitive Andersen-style points-to analysis with on-the-fly
//! call-graph construction.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::commons::Valid;
use crate::middle_end::callgraph::{dispatch, CallEdge, CallGraph, CallKind};
use crate::middle_end::lang::*;

use super::context::Context;
use super::cs::{CsObj, CsVar};
use super::heap::{HeapModel, Obj};
use super::pts::{PointsToSet, WorkList};
use super::result::PointerAnalysisResult;

/// A node of the pointer-flow graph.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pointer {
    Var(VarId),
    StaticField(FieldRef),
    InstanceField(Obj, FieldRef),
    ArrayIndex(Obj),
}

impl Display for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Var(v) => write!(f, "{}/{}", v.method(), v),
            Pointer::StaticField(fr) => write!(f, "{fr}"),
            Pointer::InstanceField(o, fr) => write!(f, "{o}.{}", fr.name()),
            Pointer::ArrayIndex(o) => write!(f, "{o}[*]"),
        }
    }
}

/// Runs the analysis from the given entry method.
pub fn analyze(program: &Valid<Program>, entry: MethodRef) -> PointerAnalysisResult {
    let mut solver = Solver {
        program: &program.0,
        heap: HeapModel::new(),
        pts: Map::new(),
        succs: Map::new(),
        call_graph: CallGraph::new(entry.clone()),
        worklist: WorkList::new(),
    };
    solver.initialize(entry);
    solver.solve();
    solver.into_result()
}

struct Solver<'p> {
    program: &'p Program,
    heap: HeapModel,
    pts: Map<Pointer, PointsToSet<Obj>>,
    succs: Map<Pointer, Set<Pointer>>,
    call_graph: CallGraph,
    worklist: WorkList<Pointer, Obj>,
}

impl Solver<'_> {
    fn initialize(&mut self, entry: MethodRef) {
        self.add_reachable(&entry);
    }

    fn pt(&self, p: &Pointer) -> PointsToSet<Obj> {
        self.pts.get(p).cloned().unwrap_or_default()
    }

    /// Processes a newly reachable method: every statement is visited
    /// exactly once, adding the pointer-flow edges it induces.
    fn add_reachable(&mut self, method: &MethodRef) {
        if !self.call_graph.add_reachable(method.clone()) {
            return;
        }
        let Some(ir) = self.program.ir(method) else {
            debug!("no IR for reachable method {method}");
            return;
        };
        for stmt in &ir.stmts {
            match &stmt.kind {
                StmtKind::New { lhs, typ } => {
                    let site = Site::new(method.clone(), stmt.index);
                    let obj = self.heap.obj_at(site, typ.clone());
                    self.worklist.add_obj(Pointer::Var(lhs.clone()), obj);
                }
                StmtKind::Copy { lhs, rhs } => {
                    self.add_pfg_edge(Pointer::Var(rhs.clone()), Pointer::Var(lhs.clone()));
                }
                StmtKind::LoadField {
                    lhs,
                    access: FieldAccess::Static { field },
                } => {
                    self.add_pfg_edge(
                        Pointer::StaticField(field.clone()),
                        Pointer::Var(lhs.clone()),
                    );
                }
                StmtKind::StoreField {
                    access: FieldAccess::Static { field },
                    rhs,
                } => {
                    self.add_pfg_edge(
                        Pointer::Var(rhs.clone()),
                        Pointer::StaticField(field.clone()),
                    );
                }
                StmtKind::Invoke(invoke) if invoke.kind == InvokeKind::Static => {
                    let site = Site::new(method.clone(), stmt.index);
                    let Some(callee) = self
                        .program
                        .declared_method(invoke.target.class(), invoke.target.subsig())
                        .map(|m| m.id.clone())
                    else {
                        debug!("unresolvable static call at {site}");
                        continue;
                    };
                    self.add_call_edge(CallKind::Static, site, invoke, callee);
                }
                _ => (),
            }
        }
    }

    /// Adds `source -> target` to the pointer-flow graph, seeding the target
    /// with whatever the source already points to.
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

    fn add_call_edge(&mut self, kind: CallKind, site: Site, invoke: &Invoke, callee: MethodRef) {
        let added = self.call_graph.add_edge(CallEdge {
            kind,
            site,
            callee: callee.clone(),
        });
        if !added {
            return;
        }
        self.add_reachable(&callee);
        let Some(callee_ir) = self.program.ir(&callee) else {
            return;
        };
        // arguments flow into parameters, returns into the receiver of the
        // result.
        assert_eq!(
            invoke.args.len(),
            callee_ir.params.len(),
            "arity mismatch calling {callee}"
        );
        for (arg, param) in invoke.args.iter().zip(&callee_ir.params) {
            self.add_pfg_edge(Pointer::Var(arg.clone()), Pointer::Var(param.clone()));
        }
        if let Some(lhs) = &invoke.lhs {
            for ret in callee_ir.return_vars.clone() {
                self.add_pfg_edge(Pointer::Var(ret), Pointer::Var(lhs.clone()));
            }
        }
    }

    fn solve(&mut self) {
        while let Some((pointer, pts)) = self.worklist.pop() {
            let delta = self.propagate(&pointer, &pts);
            if delta.is_empty() {
                continue;
            }
            if let Pointer::Var(var) = &pointer {
                let var = var.clone();
                for obj in delta.iter() {
                    self.process_instance_accesses(&var, obj);
                    self.process_call(&var, obj);
                }
            }
        }
    }

    /// Adds the new objects to `pt(pointer)` and forwards the growth along
    /// the pointer-flow graph; returns the difference set.
    fn propagate(&mut self, pointer: &Pointer, pts: &PointsToSet<Obj>) -> PointsToSet<Obj> {
        let target = self.pts.entry(pointer.clone()).or_default();
        let mut delta = PointsToSet::new();
        for obj in pts.iter() {
            if target.add(obj.clone()) {
                delta.add(obj.clone());
            }
        }
        if !delta.is_empty() {
            for succ in self.succs.get(pointer).into_iter().flatten().cloned().collect::<Vec<_>>() {
                self.worklist.add(succ, &delta);
            }
        }
        delta
    }

    // when a base variable gains an object, its field and array accesses
    // materialize as pointer-flow edges against that object.
    fn process_instance_accesses(&mut self, var: &VarId, obj: &Obj) {
        let ir = self.program.ir(var.method()).expect("reachable method has IR");
        let stmt = |i: &usize| &ir.stmts[*i];

        for i in ir.field_stores_on.get(var).into_iter().flatten() {
            if let StmtKind::StoreField { access, rhs } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::Var(rhs.clone()),
                    Pointer::InstanceField(obj.clone(), access.field().clone()),
                );
            }
        }
        for i in ir.field_loads_on.get(var).into_iter().flatten() {
            if let StmtKind::LoadField { lhs, access } = &stmt(i).kind {
                self.add_pfg_edge(
                    Pointer::InstanceField(obj.clone(), access.field().clone()),
                    Pointer::Var(lhs.clone()),
                );
            }
        }
        for i in ir.array_stores_on.get(var).into_iter().flatten() {
            if let StmtKind::StoreArray { rhs, .. } = &stmt(i).kind {
                self.add_pfg_edge(Pointer::Var(rhs.clone()), Pointer::ArrayIndex(obj.clone()));
            }
        }
        for i in ir.array_loads_on.get(var).into_iter().flatten() {
            if let StmtKind::LoadArray { lhs, .. } = &stmt(i).kind {
                self.add_pfg_edge(Pointer::ArrayIndex(obj.clone()), Pointer::Var(lhs.clone()));
            }
        }
    }

    /// Re-dispatches every invoke whose receiver is `var` against the newly
    /// discovered object.
    fn process_call(&mut self, var: &VarId, recv: &Obj) {
        let ir = self.program.ir(var.method()).expect("reachable method has IR");
        let invokes: Vec<(Site, Invoke)> = ir
            .invokes_on
            .get(var)
            .into_iter()
            .flatten()
            .map(|i| {
                (
                    Site::new(var.method().clone(), *i),
                    ir.stmts[*i].as_invoke().unwrap().clone(),
                )
            })
            .collect();

        for (site, invoke) in invokes {
            let Some(class) = recv.typ().and_then(|t| t.dispatch_class()) else {
                continue;
            };
            let Some(callee) = dispatch(self.program, &class, invoke.target.subsig()) else {
                debug!("unresolvable dispatch at {site} on {recv}");
                continue;
            };
            // the receiver object reaches the callee's `this` regardless of
            // whether the edge is new.
            if let Some(this) = self
                .program
                .ir(&callee)
                .and_then(|ir| ir.this.clone())
            {
                self.worklist.add_obj(Pointer::Var(this), recv.clone());
            }
            self.add_call_edge(CallKind::of(&invoke), site, &invoke, callee);
        }
    }

    fn into_result(self) -> PointerAnalysisResult {
        let mut result = PointerAnalysisResult::new(self.call_graph);
        for (pointer, pts) in &self.pts {
            if let Pointer::Var(var) = pointer {
                let cs_pts: PointsToSet<CsObj> = pts
                    .iter()
                    .map(|obj| CsObj {
                        ctx: Context::root(),
                        obj: obj.clone(),
                    })
                    .collect();
                result.add_cs_var(CsVar::context_free(var.clone()), &cs_pts);
            }
        }
        result
    }
}
