// Points-to and taint integration tests.

use pretty_assertions::assert_eq;

use crate::commons::Valid;
use crate::front_end::load;
use crate::middle_end::lang::*;
use crate::middle_end::taint::{TaintConfig, TaintPlugin};

use super::heap::Obj;
use super::selector::{CiSelector, KCallSelector, KObjSelector};
use super::{ci, cs};

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

fn main_of(program: &Valid<Program>) -> MethodRef {
    program.0.main_method().expect("program has a main method")
}

// the allocation sites (statement indexes in `method`) a variable points
// to, sorted for stable comparison.
fn alloc_sites(objs: &super::pts::PointsToSet<Obj>, method: &MethodRef) -> Vec<usize> {
    let mut sites: Vec<usize> = objs
        .iter()
        .filter_map(|o| o.alloc_site())
        .filter(|s| &s.method == method)
        .map(|s| s.index)
        .collect();
    sites.sort();
    sites
}

// SECTION: context-insensitive

#[test]
fn field_flow_through_alias() {
    let program = load(
        r#"
        class Y { }
        class X {
            field f: Y;
        }
        class Main {
            static method main() {
                let a: X, b: X, c: Y, t: Y;
                a = new X;
                b = a;
                c = b.f;
                t = new Y;
                a.f = t;
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = ci::analyze(&program, main.clone());
    // the store through `a` is visible through the alias `b`.
    let c_objs = result.points_to(&var(&program, &main, "c"));
    assert_eq!(alloc_sites(c_objs, &main), vec![3]);
}

#[test]
fn call_graph_built_on_the_fly() {
    // only types that actually reach the receiver produce edges, unlike CHA.
    let program = load(
        r#"
        class A {
            method foo() { return; }
        }
        class B extends A {
            method foo() { return; }
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
    let main = main_of(&program);
    let result = ci::analyze(&program, main);
    let callees: Vec<String> = result
        .call_graph()
        .edges()
        .filter(|e| e.kind == crate::middle_end::callgraph::CallKind::Virtual)
        .map(|e| e.callee.to_string())
        .collect();
    assert_eq!(callees, vec!["B::foo()"]);
}

#[test]
fn args_returns_and_this() {
    let program = load(
        r#"
        class Id {
            method same(o: Object): Object {
                let r: Object;
                r = o;
                return r;
            }
        }
        class Main {
            static method main() {
                let i: Id, a: Object, b: Object;
                i = new Id;
                a = new Object;
                b = virtual i.same(a);
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = ci::analyze(&program, main.clone());
    // the argument object comes back through the return.
    let b_objs = result.points_to(&var(&program, &main, "b"));
    assert_eq!(alloc_sites(b_objs, &main), vec![1]);
    // the receiver object reaches `this`.
    let same = method_ref(
        class_id("Id"),
        subsig("same", vec![Type::Class(class_id(OBJECT))]),
    );
    let this_objs = result.points_to(&var(&program, &same, "this"));
    assert_eq!(alloc_sites(this_objs, &main), vec![0]);
}

#[test]
fn array_flow() {
    let program = load(
        r#"
        class Main {
            static method main() {
                let arr: Object[], o: Object, r: Object, i: int;
                i = 0;
                arr = new Object[10];
                o = new Object;
                arr[i] = o;
                r = arr[i];
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = ci::analyze(&program, main.clone());
    let r_objs = result.points_to(&var(&program, &main, "r"));
    assert_eq!(alloc_sites(r_objs, &main), vec![2]);
}

#[test]
fn alias_map_matches_points_to() {
    let program = load(
        r#"
        class X { }
        class Main {
            static method main() {
                let a: X, b: X, c: X;
                a = new X;
                b = a;
                c = new X;
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = ci::analyze(&program, main);
    let aliases = result.alias_map();
    // o ∈ pt(v) iff v ∈ aliases[o], in both directions.
    for v in result.vars() {
        for o in result.points_to(v).iter() {
            assert!(aliases[o].contains(v), "{v} missing from aliases of {o}");
        }
    }
    for (o, vars) in &aliases {
        for v in vars {
            assert!(result.points_to(v).contains(o), "{o} missing from pt({v})");
        }
    }
}

// SECTION: context sensitivity

// a wrapper method funnels all stores through one internal call site, which
// call-string contexts collapse but object contexts keep apart.
fn boxes_program() -> Valid<Program> {
    load(
        r#"
        class Box {
            field item: Object;
            method set(v: Object) {
                special this.Box::doSet(v);
                return;
            }
            method doSet(v: Object) {
                this.item = v;
                return;
            }
            method get(): Object {
                let r: Object;
                r = this.item;
                return r;
            }
        }
        class Main {
            static method main() {
                let b1: Box, b2: Box, o1: Object, o2: Object, r1: Object, r2: Object;
                b1 = new Box;
                b2 = new Box;
                o1 = new Object;
                o2 = new Object;
                virtual b1.set(o1);
                virtual b2.set(o2);
                r1 = virtual b1.get();
                r2 = virtual b2.get();
                return;
            }
        }
        "#,
    )
    .unwrap()
}

#[test]
fn one_object_keeps_receivers_apart() {
    let program = boxes_program();
    let main = main_of(&program);
    let result = cs::analyze(
        &program,
        main.clone(),
        Box::new(KObjSelector { k: 1 }),
        None,
    );
    let r1 = result.points_to(&var(&program, &main, "r1"));
    let r2 = result.points_to(&var(&program, &main, "r2"));
    assert_eq!(alloc_sites(r1, &main), vec![2]);
    assert_eq!(alloc_sites(r2, &main), vec![3]);
}

#[test]
fn one_call_merges_through_wrapper() {
    let program = boxes_program();
    let main = main_of(&program);
    let result = cs::analyze(
        &program,
        main.clone(),
        Box::new(KCallSelector { k: 1 }),
        None,
    );
    // the single call site inside `set` conflates both receivers.
    let r1 = result.points_to(&var(&program, &main, "r1"));
    let r2 = result.points_to(&var(&program, &main, "r2"));
    assert_eq!(alloc_sites(r1, &main), vec![2, 3]);
    assert_eq!(alloc_sites(r2, &main), vec![2, 3]);
}

#[test]
fn ci_selector_matches_ci_solver() {
    let program = boxes_program();
    let main = main_of(&program);
    let ci_result = ci::analyze(&program, main.clone());
    let cs_result = cs::analyze(&program, main.clone(), Box::new(CiSelector), None);
    for name in ["r1", "r2"] {
        let v = var(&program, &main, name);
        let a = alloc_sites(ci_result.points_to(&v), &main);
        let b = alloc_sites(cs_result.points_to(&v), &main);
        assert_eq!(a, b, "pt({name}) differs between ci and cs/ci");
    }
}

// SECTION: taint

#[test]
fn source_to_sink_flow() {
    let program = load(
        r#"
        class Net {
            static method read(): Object {
                let r: Object;
                r = new Object;
                return r;
            }
            static method leak(x: Object) {
                return;
            }
        }
        class Main {
            static method main() {
                let x: Object;
                x = static Net::read();
                static Net::leak(x);
                return;
            }
        }
        "#,
    )
    .unwrap();
    let config: TaintConfig = r#"
        source { method: Net::read(), type: secret }
        sink { method: Net::leak(Object), index: 0 }
    "#
    .parse()
    .unwrap();
    let main = main_of(&program);
    let plugin = TaintPlugin::new(&program.0, &config);
    let result = cs::analyze(&program, main.clone(), Box::new(CiSelector), Some(plugin));

    let flows: Vec<String> = result.taint_flows.iter().map(|f| f.to_string()).collect();
    assert_eq!(flows, vec!["Main::main()@0 -> Main::main()@1/0"]);
}

#[test]
fn transfer_relays_taint() {
    let program = load(
        r#"
        class Net {
            static method read(): Object {
                let r: Object;
                r = new Object;
                return r;
            }
            static method leak(x: Object) {
                return;
            }
        }
        class Text {
            method wrap(o: Object): Object {
                let r: Object;
                r = new Object;
                return r;
            }
        }
        class Main {
            static method main() {
                let t: Text, x: Object, y: Object;
                t = new Text;
                x = static Net::read();
                y = virtual t.wrap(x);
                static Net::leak(y);
                return;
            }
        }
        "#,
    )
    .unwrap();
    let config: TaintConfig = r#"
        source { method: Net::read(), type: secret }
        sink { method: Net::leak(Object), index: 0 }
        transfer { method: Text::wrap(Object), from: arg0, to: result, type: secret }
    "#
    .parse()
    .unwrap();
    let main = main_of(&program);
    let plugin = TaintPlugin::new(&program.0, &config);
    let result = cs::analyze(&program, main.clone(), Box::new(CiSelector), Some(plugin));

    let flows: Vec<String> = result.taint_flows.iter().map(|f| f.to_string()).collect();
    // wrap() itself returns a clean object; only the transfer carries the
    // marker from the argument to the result.
    assert_eq!(flows, vec!["Main::main()@1 -> Main::main()@3/0"]);
}

#[test]
fn no_flow_without_connection() {
    let program = load(
        r#"
        class Net {
            static method read(): Object {
                let r: Object;
                r = new Object;
                return r;
            }
            static method leak(x: Object) {
                return;
            }
        }
        class Main {
            static method main() {
                let x: Object, clean: Object;
                x = static Net::read();
                clean = new Object;
                static Net::leak(clean);
                return;
            }
        }
        "#,
    )
    .unwrap();
    let config: TaintConfig = r#"
        source { method: Net::read(), type: secret }
        sink { method: Net::leak(Object), index: 0 }
    "#
    .parse()
    .unwrap();
    let main = main_of(&program);
    let plugin = TaintPlugin::new(&program.0, &config);
    let result = cs::analyze(&program, main, Box::new(CiSelector), Some(plugin));
    assert!(result.taint_flows.is_empty());
}
