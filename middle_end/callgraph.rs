//! Call graphs and the class-hierarchy-analysis builder.

use std::collections::VecDeque;
use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};

use log::debug;

use crate::commons::Valid;
use crate::middle_end::lang::*;

// SECTION: call graph

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallKind {
    Static,
    Special,
    Virtual,
    Interface,
    /// Present in the vocabulary for completeness; the front end cannot
    /// produce it, so no builder ever emits it.
    Dynamic,
}

impl CallKind {
    pub fn of(invoke: &Invoke) -> CallKind {
        match invoke.kind {
            InvokeKind::Static => CallKind::Static,
            InvokeKind::Virtual => CallKind::Virtual,
            InvokeKind::Interface => CallKind::Interface,
            InvokeKind::Special => CallKind::Special,
        }
    }
}

impl Display for CallKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallKind::Static => "static",
            CallKind::Special => "special",
            CallKind::Virtual => "virtual",
            CallKind::Interface => "interface",
            CallKind::Dynamic => "dynamic",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallEdge {
    pub kind: CallKind,
    pub site: Site,
    pub callee: MethodRef,
}

impl Display for CallEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{}-> {}", self.site, self.kind, self.callee)
    }
}

/// A call graph: reachable methods from a designated entry, plus edges from
/// call sites to callees.  Both only ever grow.
#[derive(Clone, Debug)]
pub struct CallGraph {
    pub entry: MethodRef,
    reachable: Set<MethodRef>,
    edges: Set<CallEdge>,
    callees: Map<Site, Set<MethodRef>>,
}

impl CallGraph {
    pub fn new(entry: MethodRef) -> CallGraph {
        CallGraph {
            entry,
            reachable: Set::new(),
            edges: Set::new(),
            callees: Map::new(),
        }
    }

    pub fn add_reachable(&mut self, m: MethodRef) -> bool {
        self.reachable.insert(m)
    }

    pub fn contains(&self, m: &MethodRef) -> bool {
        self.reachable.contains(m)
    }

    pub fn add_edge(&mut self, edge: CallEdge) -> bool {
        if self.edges.insert(edge.clone()) {
            self.callees
                .entry(edge.site)
                .or_default()
                .insert(edge.callee);
            true
        } else {
            false
        }
    }

    pub fn reachable_methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.reachable.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter()
    }

    pub fn callees_of(&self, site: &Site) -> impl Iterator<Item = &MethodRef> {
        self.callees.get(site).into_iter().flatten()
    }
}

impl Display for CallGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "entry: {}", self.entry)?;
        for edge in &self.edges {
            writeln!(f, "{edge}")?;
        }
        Ok(())
    }
}

// SECTION: dispatch

/// Looks up the method actually run for a receiver of dynamic type `class`
/// and the given subsignature: the first non-abstract declaration on the
/// superclass chain, or `None` if there is none.
pub fn dispatch(program: &Program, class: &ClassId, sig: &Subsig) -> Option<MethodRef> {
    let mut cur = Some(class.clone());
    while let Some(c) = cur {
        let cls = program.classes.get(&c)?;
        if let Some(m) = cls.methods.get(sig) {
            if !m.is_abstract {
                return Some(m.id.clone());
            }
        }
        cur = cls.super_class.clone();
    }
    None
}

/// Resolves the possible callees of a call site via class hierarchy
/// analysis.
pub fn resolve(program: &Program, invoke: &Invoke) -> Set<MethodRef> {
    let mut targets = Set::new();
    let declared = invoke.target.class();
    let sig = invoke.target.subsig();

    match invoke.kind {
        InvokeKind::Static => {
            // the target is the method the named class itself declares.
            if program.declared_method(declared, sig).is_some() {
                targets.insert(method_ref(declared.clone(), sig.clone()));
            }
        }
        InvokeKind::Special => {
            if let Some(m) = dispatch(program, declared, sig) {
                targets.insert(m);
            }
        }
        InvokeKind::Virtual | InvokeKind::Interface => {
            // walk the subtype closure of the declared class; interfaces
            // additionally expand through implementors and subinterfaces.
            let mut work: VecDeque<ClassId> = VecDeque::new();
            let mut visited = Set::new();
            work.push_back(declared.clone());
            visited.insert(declared.clone());

            while let Some(c) = work.pop_front() {
                if let Some(m) = dispatch(program, &c, sig) {
                    targets.insert(m);
                }
                let h = &program.hierarchy;
                let expand: Vec<&ClassId> = if program.class(&c).is_interface {
                    h.direct_implementors_of(&c)
                        .chain(h.direct_subinterfaces_of(&c))
                        .collect()
                } else {
                    h.direct_subclasses_of(&c).collect()
                };
                for sub in expand {
                    if visited.insert(sub.clone()) {
                        work.push_back(sub.clone());
                    }
                }
            }
        }
    }
    targets
}

// SECTION: CHA builder

/// Builds a call graph by reachability from `entry`, resolving every call
/// site with CHA.
pub fn build_cha(program: &Valid<Program>, entry: MethodRef) -> CallGraph {
    let program = &program.0;
    let mut call_graph = CallGraph::new(entry.clone());
    let mut worklist = VecDeque::new();

    call_graph.add_reachable(entry.clone());
    worklist.push_back(entry);

    while let Some(method) = worklist.pop_front() {
        let Some(ir) = program.ir(&method) else {
            // abstract or bodiless methods cannot expand reachability.
            continue;
        };
        for stmt in &ir.stmts {
            let Some(invoke) = stmt.as_invoke() else { continue };
            let site = Site::new(method.clone(), stmt.index);
            let targets = resolve(program, invoke);
            if targets.is_empty() {
                debug!("unresolvable call at {site}: {invoke}");
            }
            for callee in targets {
                call_graph.add_edge(CallEdge {
                    kind: CallKind::of(invoke),
                    site: site.clone(),
                    callee: callee.clone(),
                });
                if call_graph.add_reachable(callee.clone()) {
                    worklist.push_back(callee);
                }
            }
        }
    }
    call_graph
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::front_end::load;

    fn methods(set: &Set<MethodRef>) -> Vec<String> {
        set.iter().map(|m| m.to_string()).collect()
    }

    // A.foo overridden by B, C inherits B.foo: a virtual call through A
    // resolves to both declarations, deduplicated.
    #[test]
    fn virtual_resolution_over_subclasses() {
        let program = load(
            r#"
            class A {
                method foo() { return; }
            }
            class B extends A {
                method foo() { return; }
            }
            class C extends B { }
            class Main {
                static method main() {
                    let x: A;
                    x = new A;
                    virtual x.foo();
                    return;
                }
            }
            "#,
        )
        .unwrap();
        let ir = program.0.ir(&program.0.main_method().unwrap()).unwrap();
        let invoke = ir.stmts[1].as_invoke().unwrap();
        let targets = resolve(&program.0, invoke);
        assert_eq!(methods(&targets), vec!["A::foo()", "B::foo()"]);
    }

    #[test]
    fn interface_resolution_through_implementors() {
        let program = load(
            r#"
            interface I {
                method m();
            }
            class A implements I {
                method m() { return; }
            }
            class B implements I {
                method m() { return; }
            }
            class Main {
                static method main() {
                    let x: I, a: A;
                    a = new A;
                    x = (I) a;
                    interface x.m();
                    return;
                }
            }
            "#,
        )
        .unwrap();
        let ir = program.0.ir(&program.0.main_method().unwrap()).unwrap();
        let invoke = ir.stmts[2].as_invoke().unwrap();
        let targets = resolve(&program.0, invoke);
        assert_eq!(methods(&targets), vec!["A::m()", "B::m()"]);
    }

    #[test]
    fn cha_reachability() {
        let program = load(
            r#"
            class A {
                method foo() {
                    static Util::helper();
                    return;
                }
            }
            class B extends A {
                method foo() { return; }
            }
            class Util {
                static method helper() { return; }
                static method unused() { return; }
            }
            class Main {
                static method main() {
                    let x: A;
                    x = new B;
                    virtual x.foo();
                    return;
                }
            }
            "#,
        )
        .unwrap();
        let cg = build_cha(&program, program.0.main_method().unwrap());
        let reachable: Vec<String> = cg.reachable_methods().map(|m| m.to_string()).collect();
        assert_eq!(
            reachable,
            vec![
                "A::foo()",
                "B::foo()",
                "Main::main()",
                "Util::helper()"
            ]
        );
        // dispatch through the hierarchy: abstract-free walk up from C.
        let foo = subsig("foo", vec![]);
        assert_eq!(
            dispatch(&program.0, &class_id("B"), &foo),
            Some(method_ref(class_id("B"), foo.clone()))
        );
    }
}
