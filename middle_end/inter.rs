//! Interprocedural constant propagation over the ICFG, using points-to
//! results to propagate integer values through instance fields, static
//! fields, and arrays.

use std::collections::VecDeque;
use std::collections::{BTreeMap as Map, BTreeSet as Set};

use crate::commons::Valid;
use crate::middle_end::analysis::constprop::{
    self, meet_value, CPFact, ConstantPropagation, Value,
};
use crate::middle_end::analysis::DataflowAnalysis;
use crate::middle_end::icfg::{Icfg, IcfgEdge, IcfgEdgeKind, IcfgNode};
use crate::middle_end::lang::*;
use crate::middle_end::pta::heap::Obj;
use crate::middle_end::pta::result::PointerAnalysisResult;

// SECTION: results

#[derive(Clone, Debug)]
pub struct InterResult {
    pub icfg: Icfg,
    in_facts: Map<IcfgNode, CPFact>,
    out_facts: Map<IcfgNode, CPFact>,
}

impl InterResult {
    pub fn in_fact(&self, node: &IcfgNode) -> &CPFact {
        &self.in_facts[node]
    }

    pub fn out_fact(&self, node: &IcfgNode) -> &CPFact {
        &self.out_facts[node]
    }

    /// The out fact of the statement at `index` in `method`.
    pub fn out_of(&self, method: &MethodRef, index: usize) -> &CPFact {
        let node = self.icfg.cfgs[method].node_of(index);
        &self.out_facts[&IcfgNode {
            method: method.clone(),
            node,
        }]
    }

    /// The fact at a method's exit.
    pub fn exit_fact(&self, method: &MethodRef) -> &CPFact {
        let cfg = &self.icfg.cfgs[method];
        &self.in_facts[&IcfgNode {
            method: method.clone(),
            node: cfg.exit,
        }]
    }
}

// SECTION: heap value map

/// Keys of the global heap-value map.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum HeapKey {
    Instance(Obj, FieldRef),
    Static(FieldRef),
    /// Array cells are indexed by the abstraction of the index value; an
    /// `Undef` index never creates a key.
    Array(Obj, ArrayIndex),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ArrayIndex {
    Const(i32),
    Nac,
}

// a queue that ignores offers of already-queued nodes.
#[derive(Clone, Debug)]
struct SetQueue<T: Ord + Clone> {
    queue: VecDeque<T>,
    members: Set<T>,
}

impl<T: Ord + Clone> Default for SetQueue<T> {
    fn default() -> Self {
        SetQueue {
            queue: VecDeque::new(),
            members: Set::new(),
        }
    }
}

impl<T: Ord + Clone> SetQueue<T> {
    fn offer(&mut self, t: T) {
        if self.members.insert(t.clone()) {
            self.queue.push_back(t);
        }
    }

    fn poll(&mut self) -> Option<T> {
        let t = self.queue.pop_front()?;
        self.members.remove(&t);
        Some(t)
    }
}

// SECTION: solver

/// Runs interprocedural constant propagation over everything the points-to
/// result reached.
pub fn analyze(program: &Valid<Program>, pta: &PointerAnalysisResult) -> InterResult {
    let icfg = Icfg::new(&program.0, pta.call_graph());
    let mut solver = Solver {
        program: &program.0,
        pta,
        cp: ConstantPropagation,
        alias_map: pta.alias_map(),
        static_loads: Map::new(),
        value_map: Map::new(),
        in_facts: Map::new(),
        out_facts: Map::new(),
        worklist: SetQueue::default(),
        icfg,
    };
    solver.initialize();
    solver.solve();
    InterResult {
        icfg: solver.icfg,
        in_facts: solver.in_facts,
        out_facts: solver.out_facts,
    }
}

struct Solver<'p> {
    program: &'p Program,
    pta: &'p PointerAnalysisResult,
    cp: ConstantPropagation,
    icfg: Icfg,
    /// Obj -> variables whose points-to set contains it; computed once.
    alias_map: Map<Obj, Set<VarId>>,
    /// Static field -> load statements of that field.
    static_loads: Map<FieldRef, Set<IcfgNode>>,
    value_map: Map<HeapKey, Value>,
    in_facts: Map<IcfgNode, CPFact>,
    out_facts: Map<IcfgNode, CPFact>,
    worklist: SetQueue<IcfgNode>,
}

impl Solver<'_> {
    fn initialize(&mut self) {
        for node in self.icfg.nodes() {
            self.in_facts.insert(node.clone(), CPFact::new());
            self.out_facts.insert(node.clone(), CPFact::new());
            if let Some(StmtKind::LoadField {
                access: FieldAccess::Static { field },
                ..
            }) = self.icfg.stmt(self.program, node).map(|s| &s.kind)
            {
                self.static_loads
                    .entry(field.clone())
                    .or_default()
                    .insert(node.clone());
            }
        }

        // boundary facts for the entry, in and out built independently.
        let entry = self.icfg.entry_node();
        let entry_cfg = &self.icfg.cfgs[&self.icfg.entry_method];
        self.in_facts
            .insert(entry.clone(), self.cp.new_boundary_fact(entry_cfg));
        self.out_facts
            .insert(entry, self.cp.new_boundary_fact(entry_cfg));
    }

    fn solve(&mut self) {
        let nodes: Vec<IcfgNode> = self.icfg.nodes().cloned().collect();
        for node in nodes {
            self.worklist.offer(node);
        }
        let entry = self.icfg.entry_node();

        while let Some(node) = self.worklist.poll() {
            // meet the incoming edge transfers; the entry keeps its boundary
            // fact (it has no incoming edges).
            if node != entry {
                let mut input = CPFact::new();
                let in_edges: Vec<IcfgEdge> =
                    self.icfg.in_edges_of(&node).cloned().collect();
                for edge in &in_edges {
                    let fact = self.transfer_edge(edge, &self.out_facts[&edge.src]);
                    self.cp.meet_into(&fact, &mut input);
                }
                self.in_facts.insert(node.clone(), input);
            }

            let input = self.in_facts[&node].clone();
            // stores write through to the heap map before the node transfer.
            self.handle_store(&node, &input);

            let mut out = self.out_facts[&node].clone();
            let changed = self.transfer_node(&node, &input, &mut out);
            self.out_facts.insert(node.clone(), out);
            if changed {
                let targets: Vec<IcfgNode> = self
                    .icfg
                    .out_edges_of(&node)
                    .map(|e| e.dst.clone())
                    .collect();
                for t in targets {
                    self.worklist.offer(t);
                }
            }
        }
    }

    // SECTION: edge transfers

    fn transfer_edge(&self, edge: &IcfgEdge, out: &CPFact) -> CPFact {
        match &edge.kind {
            IcfgEdgeKind::Normal => out.copy(),
            IcfgEdgeKind::CallToReturn => {
                // the callee delivers the result; kill the receiver here so
                // the return edge alone defines it.
                let mut fact = out.copy();
                if let Some(invoke) = self
                    .icfg
                    .stmt(self.program, &edge.src)
                    .and_then(|s| s.as_invoke())
                {
                    if let Some(lhs) = &invoke.lhs {
                        fact.remove(lhs);
                    }
                }
                fact
            }
            IcfgEdgeKind::Call { callee } => {
                let invoke = self
                    .icfg
                    .stmt(self.program, &edge.src)
                    .and_then(|s| s.as_invoke())
                    .expect("call edge source is an invoke");
                let params = &self.program.ir(callee).unwrap().params;
                let mut fact = CPFact::new();
                for (arg, param) in invoke.args.iter().zip(params) {
                    fact.update(param, out.get(arg));
                }
                fact
            }
            IcfgEdgeKind::Return {
                call_site,
                ret_vars,
            } => {
                let mut fact = CPFact::new();
                let invoke = self
                    .icfg
                    .stmt(self.program, call_site)
                    .and_then(|s| s.as_invoke())
                    .expect("return edge call site is an invoke");
                if let Some(lhs) = &invoke.lhs {
                    let mut merged = Value::Undef;
                    for ret in ret_vars {
                        merged = meet_value(merged, out.get(ret));
                    }
                    fact.update(lhs, merged);
                }
                fact
            }
        }
    }

    // SECTION: node transfers

    fn transfer_node(&self, node: &IcfgNode, input: &CPFact, out: &mut CPFact) -> bool {
        let cfg = &self.icfg.cfgs[&node.method];
        let ir = self.program.ir(&node.method).unwrap();
        let stmt = cfg.stmt(ir, node.node);

        // call nodes pass their fact through unchanged; the call-to-return
        // edge does the killing.
        if stmt.is_some_and(|s| s.as_invoke().is_some()) {
            return out.copy_from(input);
        }

        let mut tmp = input.copy();
        if let Some(stmt) = stmt {
            constprop::transfer_stmt(stmt, input, &mut tmp);
            // loads read back from the heap map instead of going straight
            // to NAC.
            if let Some(lhs) = stmt.def_var() {
                if lhs.typ().can_hold_int() {
                    match &stmt.kind {
                        StmtKind::LoadField { access, .. } => {
                            tmp.update(lhs, self.load_field_value(access));
                        }
                        StmtKind::LoadArray { base, index, .. } => {
                            tmp.update(lhs, self.load_array_value(base, index, input));
                        }
                        _ => (),
                    }
                }
            }
        }
        out.copy_from(&tmp)
    }

    fn load_field_value(&self, access: &FieldAccess) -> Value {
        match access {
            FieldAccess::Instance { base, field } => {
                let mut result = Value::Undef;
                for obj in self.pta.points_to(base).iter() {
                    let v = self
                        .value_map
                        .get(&HeapKey::Instance(obj.clone(), field.clone()))
                        .copied()
                        .unwrap_or(Value::Undef);
                    result = meet_value(result, v);
                }
                result
            }
            FieldAccess::Static { field } => self
                .value_map
                .get(&HeapKey::Static(field.clone()))
                .copied()
                .unwrap_or(Value::Undef),
        }
    }

    // a load at index i sees stores at compatible indexes: equal constants,
    // or anything when one side is NAC.  an Undef index reads nothing.
    fn load_array_value(&self, base: &VarId, index: &VarId, input: &CPFact) -> Value {
        match input.get(index) {
            Value::Undef => Value::Undef,
            Value::Nac => Value::Nac,
            Value::Const(i) => {
                let mut result = Value::Undef;
                for obj in self.pta.points_to(base).iter() {
                    for key in [
                        HeapKey::Array(obj.clone(), ArrayIndex::Const(i)),
                        HeapKey::Array(obj.clone(), ArrayIndex::Nac),
                    ] {
                        if let Some(v) = self.value_map.get(&key) {
                            result = meet_value(result, *v);
                        }
                    }
                }
                result
            }
        }
    }

    // SECTION: store side effects

    fn handle_store(&mut self, node: &IcfgNode, input: &CPFact) {
        let Some(stmt) = self.icfg.stmt(self.program, node) else {
            return;
        };
        match &stmt.kind {
            StmtKind::StoreField { access, rhs } if rhs.typ().can_hold_int() => {
                let value = input.get(rhs);
                match access {
                    FieldAccess::Instance { base, field } => {
                        let objs: Vec<Obj> = self.pta.points_to(base).iter().cloned().collect();
                        for obj in objs {
                            let key = HeapKey::Instance(obj, field.clone());
                            self.update_heap_value(key, value);
                        }
                    }
                    FieldAccess::Static { field } => {
                        self.update_heap_value(HeapKey::Static(field.clone()), value);
                    }
                }
            }
            StmtKind::StoreArray { base, index, rhs } if rhs.typ().can_hold_int() => {
                let value = input.get(rhs);
                let idx = match input.get(index) {
                    Value::Undef => return,
                    Value::Const(i) => ArrayIndex::Const(i),
                    Value::Nac => ArrayIndex::Nac,
                };
                let objs: Vec<Obj> = self.pta.points_to(base).iter().cloned().collect();
                for obj in objs {
                    self.update_heap_value(HeapKey::Array(obj, idx), value);
                }
            }
            _ => (),
        }
    }

    // meet the stored value into the heap map; on change, dependent loads
    // are re-queued (via the alias sets for instance/array keys, via the
    // static-load index otherwise).
    fn update_heap_value(&mut self, key: HeapKey, value: Value) {
        let old = self.value_map.get(&key).copied().unwrap_or(Value::Undef);
        let met = meet_value(old, value);
        if met == old {
            return;
        }
        self.value_map.insert(key.clone(), met);

        match &key {
            HeapKey::Static(field) => {
                let loads: Vec<IcfgNode> = self
                    .static_loads
                    .get(field)
                    .into_iter()
                    .flatten()
                    .cloned()
                    .collect();
                for node in loads {
                    self.worklist.offer(node);
                }
            }
            HeapKey::Instance(obj, field) => self.requeue_alias_loads(obj, Some(field)),
            HeapKey::Array(obj, _) => self.requeue_alias_loads(obj, None),
        }
    }

    fn requeue_alias_loads(&mut self, obj: &Obj, field: Option<&FieldRef>) {
        let aliases: Vec<VarId> = self
            .alias_map
            .get(obj)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        for var in aliases {
            let Some(cfg) = self.icfg.cfgs.get(var.method()) else {
                continue;
            };
            let ir = self.program.ir(var.method()).unwrap();
            let loads: Vec<usize> = match field {
                Some(field) => ir
                    .field_loads_on
                    .get(&var)
                    .into_iter()
                    .flatten()
                    .filter(|i| {
                        matches!(
                            &ir.stmts[**i].kind,
                            StmtKind::LoadField { access, .. } if access.field() == field
                        )
                    })
                    .copied()
                    .collect(),
                None => ir
                    .array_loads_on
                    .get(&var)
                    .into_iter()
                    .flatten()
                    .copied()
                    .collect(),
            };
            for i in loads {
                self.worklist.offer(IcfgNode {
                    method: var.method().clone(),
                    node: cfg.node_of(i),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::front_end::load;
    use crate::middle_end::pta::ci;

    use super::*;

    fn run(code: &str) -> (Valid<Program>, InterResult) {
        let program = load(code).unwrap();
        let main = program.0.main_method().expect("program has a main method");
        let pta = ci::analyze(&program, main);
        let result = analyze(&program, &pta);
        (program, result)
    }

    fn var(program: &Valid<Program>, method: &MethodRef, name: &str) -> VarId {
        let ir = program.0.ir(method).unwrap();
        ir.params
            .iter()
            .chain(ir.locals.iter())
            .chain(ir.this.iter())
            .find(|v| v.name() == name)
            .unwrap_or_else(|| panic!("no variable `{name}`"))
            .clone()
    }

    #[test]
    fn constants_cross_calls() {
        let (program, result) = run(
            r#"
            class C {
                static method add(a: int, b: int): int {
                    let r: int;
                    r = a + b;
                    return r;
                }
            }
            class Main {
                static method main() {
                    let x: int, y: int, z: int;
                    x = 3;
                    y = 4;
                    z = static C::add(x, y);
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        assert_eq!(exit.get(&var(&program, &main, "z")), Value::Const(7));
    }

    #[test]
    fn merged_call_sites_lose_constancy() {
        let (program, result) = run(
            r#"
            class C {
                static method id(a: int): int {
                    return a;
                }
            }
            class Main {
                static method main() {
                    let one: int, two: int, t1: int, t2: int;
                    one = 1;
                    two = 2;
                    t1 = static C::id(one);
                    t2 = static C::id(two);
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        // both call sites meet in id's parameter, so both results are NAC.
        assert_eq!(exit.get(&var(&program, &main, "t1")), Value::Nac);
        assert_eq!(exit.get(&var(&program, &main, "t2")), Value::Nac);
    }

    #[test]
    fn instance_field_through_alias() {
        let (program, result) = run(
            r#"
            class X {
                field f: int;
            }
            class Main {
                static method main() {
                    let a: X, b: X, v: int, w: int;
                    a = new X;
                    b = a;
                    v = 5;
                    a.f = v;
                    w = b.f;
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        assert_eq!(exit.get(&var(&program, &main, "w")), Value::Const(5));
    }

    #[test]
    fn conflicting_field_stores_meet_to_nac() {
        let (program, result) = run(
            r#"
            class X {
                field f: int;
            }
            class Main {
                static method main() {
                    let a: X, v5: int, v9: int, w: int;
                    a = new X;
                    v5 = 5;
                    v9 = 9;
                    a.f = v5;
                    a.f = v9;
                    w = a.f;
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        assert_eq!(exit.get(&var(&program, &main, "w")), Value::Nac);
    }

    #[test]
    fn static_field_reload() {
        let (program, result) = run(
            r#"
            class G {
                static field s: int;
            }
            class Main {
                static method main() {
                    let v: int, w: int;
                    v = 7;
                    G.s = v;
                    w = G.s;
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        assert_eq!(exit.get(&var(&program, &main, "w")), Value::Const(7));
    }

    #[test]
    fn array_constant_indexes() {
        let (program, result) = run(
            r#"
            class Main {
                static method main() {
                    let arr: int[], i0: int, i1: int, v: int, w: int, u: int;
                    arr = new int[10];
                    i0 = 0;
                    i1 = 1;
                    v = 5;
                    arr[i0] = v;
                    w = arr[i0];
                    u = arr[i1];
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        // the load at index 0 sees the store at index 0.
        assert_eq!(exit.get(&var(&program, &main, "w")), Value::Const(5));
        // nothing was ever stored at index 1.
        assert_eq!(exit.get(&var(&program, &main, "u")), Value::Undef);
    }

    #[test]
    fn nac_index_store_reaches_constant_loads() {
        let (program, result) = run(
            r#"
            class C {
                static method id(a: int): int {
                    return a;
                }
            }
            class Main {
                static method main() {
                    let arr: int[], one: int, two: int, k: int, i0: int, v: int, w: int;
                    arr = new int[10];
                    one = 1;
                    two = 2;
                    k = static C::id(one);
                    k = static C::id(two);
                    v = 5;
                    arr[k] = v;
                    i0 = 0;
                    w = arr[i0];
                    return;
                }
            }
            "#,
        );
        let main = program.0.main_method().unwrap();
        let exit = result.exit_fact(&main);
        // k is NAC, so the store lands in the conservative bucket every
        // constant-indexed load reads.
        assert_eq!(exit.get(&var(&program, &main, "w")), Value::Const(5));
    }
}
