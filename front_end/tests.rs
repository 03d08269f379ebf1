// parsing and linking tests.

use pretty_assertions::assert_eq;

use super::load;
use crate::middle_end::lang::*;

#[test]
fn parses_and_links_a_class() {
    let program = load(
        r#"
        class A {
            field f: A;
            static field g: int;
            method m(x: int): int {
                let y: int;
                y = x + x;
                return y;
            }
        }
        "#,
    )
    .unwrap();
    let a = program.0.class(&class_id("A"));
    assert_eq!(a.fields.len(), 2);
    assert!(a.fields["g"].is_static());
    let m = &a.methods[&subsig("m", vec![Type::Int])];
    let ir = m.ir.as_ref().unwrap();
    assert_eq!(ir.params.len(), 1);
    assert_eq!(ir.stmts.len(), 2);
    // instance methods get an implicit `this`.
    assert_eq!(ir.this.as_ref().unwrap().typ(), &Type::Class(class_id("A")));
}

#[test]
fn implicit_object_root() {
    let program = load("class A { }").unwrap();
    let a = program.0.class(&class_id("A"));
    assert_eq!(a.super_class, Some(class_id(OBJECT)));
    assert!(program.0.classes.contains_key(&class_id(OBJECT)));
}

#[test]
fn field_access_resolves_to_declaring_class() {
    let program = load(
        r#"
        class A {
            field f: int;
        }
        class B extends A {
            method m(): int {
                let r: int;
                r = this.f;
                return r;
            }
        }
        "#,
    )
    .unwrap();
    let b = program.0.class(&class_id("B"));
    let ir = b.methods[&subsig("m", vec![])].ir.as_ref().unwrap();
    let StmtKind::LoadField { access, .. } = &ir.stmts[0].kind else {
        panic!("expected a field load");
    };
    // f is declared by A, not B.
    assert_eq!(access.field().class(), &class_id("A"));
}

#[test]
fn rejects_unknown_class() {
    let err = load("class A extends Nowhere { }").unwrap_err();
    assert!(err.contains("unknown class"), "{err}");
}

#[test]
fn rejects_undeclared_variable() {
    let err = load(
        r#"
        class A {
            static method m() {
                x = 1;
                return;
            }
        }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("undeclared variable"), "{err}");
}

#[test]
fn rejects_static_mismatch() {
    let err = load(
        r#"
        class A {
            method m() { return; }
            static method go() {
                static A::m();
                return;
            }
        }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("static-ness"), "{err}");
}

#[test]
fn rejects_missing_return() {
    let err = load(
        r#"
        class A {
            static method m() {
                let z: int;
                z = 1;
            }
        }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("fall off"), "{err}");
}

#[test]
fn rejects_bad_return_arity() {
    let err = load(
        r#"
        class A {
            static method m(): int {
                return;
            }
        }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("return"), "{err}");
}

#[test]
fn rejects_inheritance_cycle() {
    let err = load(
        r#"
        class A extends B { }
        class B extends A { }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("cycle"), "{err}");
}

#[test]
fn rejects_interface_with_body() {
    let err = load(
        r#"
        interface I {
            method m() { return; }
        }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("abstract method"), "{err}");
}

#[test]
fn parse_error_reports_line() {
    let err = load("class A {\n  field f int;\n}").unwrap_err();
    assert!(err.contains("line 2"), "{err}");
}
