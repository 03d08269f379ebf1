// General analysis tests

use std::io::{BufWriter, Write};

use collapse::*;
use pretty_assertions::assert_eq;

use crate::commons::Valid;
use crate::front_end::load;
use crate::middle_end::lang::*;

use super::constprop::{self, evaluate_binary, meet_value, Value};
use super::{deadcode, liveness, Cfg};

use Value::*;

// find a variable of a method by name.
fn var(ir: &Ir, name: &str) -> VarId {
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

// SECTION: lattice laws

#[test]
fn meet_laws() {
    let samples = [Undef, Nac, Const(0), Const(1), Const(-7)];
    for a in samples {
        for b in samples {
            assert_eq!(meet_value(a, b), meet_value(b, a));
            for c in samples {
                assert_eq!(
                    meet_value(a, meet_value(b, c)),
                    meet_value(meet_value(a, b), c)
                );
            }
        }
        assert_eq!(meet_value(a, Nac), Nac);
        assert_eq!(meet_value(a, Undef), a);
    }
    assert_eq!(meet_value(Const(3), Const(3)), Const(3));
    assert_eq!(meet_value(Const(3), Const(4)), Nac);
}

// SECTION: evaluator

#[test]
fn evaluator_folds_constants() {
    assert_eq!(evaluate_binary(BinOp::Add, Const(2), Const(3)), Const(5));
    assert_eq!(evaluate_binary(BinOp::Sub, Const(2), Const(3)), Const(-1));
    assert_eq!(evaluate_binary(BinOp::Mul, Const(4), Const(5)), Const(20));
    assert_eq!(evaluate_binary(BinOp::Div, Const(7), Const(2)), Const(3));
    assert_eq!(evaluate_binary(BinOp::Rem, Const(7), Const(2)), Const(1));
    // arithmetic wraps at 32 bits.
    assert_eq!(
        evaluate_binary(BinOp::Add, Const(i32::MAX), Const(1)),
        Const(i32::MIN)
    );
    assert_eq!(
        evaluate_binary(BinOp::Div, Const(i32::MIN), Const(-1)),
        Const(i32::MIN)
    );
}

#[test]
fn evaluator_bitwise_and_shifts() {
    assert_eq!(evaluate_binary(BinOp::And, Const(6), Const(3)), Const(2));
    assert_eq!(evaluate_binary(BinOp::Or, Const(6), Const(3)), Const(7));
    assert_eq!(evaluate_binary(BinOp::Xor, Const(6), Const(3)), Const(5));
    // shift counts are masked to five bits.
    assert_eq!(evaluate_binary(BinOp::Shl, Const(1), Const(33)), Const(2));
    // arithmetic vs logical right shift.
    assert_eq!(evaluate_binary(BinOp::Shr, Const(-8), Const(1)), Const(-4));
    assert_eq!(
        evaluate_binary(BinOp::Ushr, Const(-8), Const(1)),
        Const(0x7ffffffc)
    );
}

#[test]
fn evaluator_comparisons() {
    assert_eq!(evaluate_binary(BinOp::Lt, Const(1), Const(2)), Const(1));
    assert_eq!(evaluate_binary(BinOp::Ge, Const(1), Const(2)), Const(0));
    assert_eq!(evaluate_binary(BinOp::Eq, Const(5), Const(5)), Const(1));
    assert_eq!(evaluate_binary(BinOp::Ne, Const(5), Const(5)), Const(0));
}

#[test]
fn evaluator_lattice_propagation() {
    assert_eq!(evaluate_binary(BinOp::Add, Nac, Const(1)), Nac);
    assert_eq!(evaluate_binary(BinOp::Add, Undef, Const(1)), Undef);
    assert_eq!(evaluate_binary(BinOp::Add, Nac, Undef), Nac);
}

#[test]
fn division_by_constant_zero_is_undef() {
    // unreachable in concrete runs, so it contributes nothing to the join,
    // even for a NAC dividend.
    assert_eq!(evaluate_binary(BinOp::Div, Const(1), Const(0)), Undef);
    assert_eq!(evaluate_binary(BinOp::Rem, Const(1), Const(0)), Undef);
    assert_eq!(evaluate_binary(BinOp::Div, Nac, Const(0)), Undef);
    assert_eq!(evaluate_binary(BinOp::Rem, Nac, Const(0)), Undef);
    assert_eq!(evaluate_binary(BinOp::Div, Undef, Const(0)), Undef);
}

// SECTION: end-to-end constant propagation

#[test]
fn straight_line_arithmetic() {
    let program = load(
        r#"
        class Main {
            static method main() {
                let p0: int, p1: int, x: int;
                p0 = 1;
                p1 = 2;
                x = p0 + p1;
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = constprop::analyze(&program, &main);
    let ir = program.0.ir(&main).unwrap();
    let cfg = Cfg::new(ir);
    let exit = result.in_fact(cfg.exit);
    assert_eq!(exit.get(&var(ir, "x")), Const(3));
}

#[test]
fn constant_branch_keeps_constants() {
    let program = load(
        r#"
        class Main {
            static method main() {
                let p0: int, p1: int, x: int, y: int, c2: int;
                p0 = 1;
                p1 = 2;
                x = p0 + p1;
                c2 = 2;
                if x > c2 goto then;
                y = 0;
                goto done;
            then:
                y = x;
            done:
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = constprop::analyze(&program, &main);
    let ir = program.0.ir(&main).unwrap();
    let cfg = Cfg::new(ir);
    let exit = result.in_fact(cfg.exit);
    // the false branch is infeasible under the facts, so it contributes
    // nothing at the join.
    assert_eq!(exit.get(&var(ir, "x")), Const(3));
    assert_eq!(exit.get(&var(ir, "y")), Const(3));
}

#[test]
fn nac_divided_by_zero_is_undef() {
    let program = load(
        r#"
        class C {
            static method f(a: int): int {
                let b: int, c: int;
                b = 0;
                c = a / b;
                return c;
            }
        }
        "#,
    )
    .unwrap();
    let f = method_ref(class_id("C"), subsig("f", vec![Type::Int]));
    let result = constprop::analyze(&program, &f);
    let ir = program.0.ir(&f).unwrap();
    let cfg = Cfg::new(ir);
    let exit = result.in_fact(cfg.exit);
    // parameters are NAC at the boundary; the division by zero still
    // evaluates to UNDEF.
    assert_eq!(exit.get(&var(ir, "a")), Nac);
    assert_eq!(exit.get(&var(ir, "c")), Undef);
}

#[test]
fn loops_terminate() {
    let program = load(
        r#"
        class C {
            static method count(n: int): int {
                let i: int, one: int, t: int;
                i = 0;
                one = 1;
            loop:
                i = i + one;
                t = i < n;
                if t == one goto loop;
                return i;
            }
        }
        "#,
    )
    .unwrap();
    let f = method_ref(class_id("C"), subsig("count", vec![Type::Int]));
    let result = constprop::analyze(&program, &f);
    let ir = program.0.ir(&f).unwrap();
    let cfg = Cfg::new(ir);
    // i is 1 after the first pass and 2 after the second; the meet makes it
    // NAC, and the solver reaches the fixed point.
    assert_eq!(result.in_fact(cfg.exit).get(&var(ir, "i")), Nac);
}

// SECTION: liveness

#[test]
fn liveness_basic() {
    let program = load(
        r#"
        class Main {
            static method main() {
                let a: int, b: int, c: int;
                a = 1;
                b = a + a;
                c = 7;
                return;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let result = liveness::analyze(&program, &main);
    let ir = program.0.ir(&main).unwrap();
    let cfg = Cfg::new(ir);
    // a is live right after its definition (used by statement 1)...
    assert!(result.out_fact(cfg.node_of(0)).contains(&var(ir, "a")));
    // ...but b and c are never used.
    assert!(!result.out_fact(cfg.node_of(1)).contains(&var(ir, "b")));
    assert!(!result.out_fact(cfg.node_of(2)).contains(&var(ir, "c")));
}

// SECTION: dead code

#[test]
fn constant_condition_kills_branch() {
    let program = load(
        r#"
        class Main {
            static method main(): int {
                let x: int, c: int, y: int;
                x = 3;
                c = 2;
                if x > c goto big;
                y = 0;
                goto done;
            big:
                y = 1;
            done:
                return y;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let dead = deadcode::analyze(&program, &main);
    // `y = 0` (index 3) and the goto after it (index 4) are unreachable.
    assert_eq!(dead.into_iter().collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn dead_assignment_detected() {
    let program = load(
        r#"
        class Main {
            static method main(): int {
                let a: int, b: int, z: int;
                a = 1;
                b = a + a;
                z = 0;
                return b;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let dead = deadcode::analyze(&program, &main);
    // z is never read and the assignment has no side effect.
    assert_eq!(dead.into_iter().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn division_has_side_effects() {
    let program = load(
        r#"
        class Main {
            static method main(): int {
                let a: int, b: int, z: int;
                a = 1;
                b = 0;
                z = a / b;
                return a;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let dead = deadcode::analyze(&program, &main);
    // z is dead but the division may fault, so the statement stays.
    assert!(dead.is_empty());
}

#[test]
fn constant_switch_keeps_one_case() {
    let program = load(
        r#"
        class Main {
            static method main(): int {
                let k: int, y: int;
                k = 2;
                switch k { case 1: one; case 2: two; default: other; }
            one:
                y = 1;
                goto done;
            two:
                y = 2;
                goto done;
            other:
                y = 9;
                goto done;
            done:
                return y;
            }
        }
        "#,
    )
    .unwrap();
    let main = main_of(&program);
    let dead = deadcode::analyze(&program, &main);
    // only the `case 2` arm survives.
    assert_eq!(dead.into_iter().collect::<Vec<_>>(), vec![2, 3, 6, 7]);
}

// SECTION: golden tests against test-data

// Run constant propagation on the given test file and compare each method's
// exit fact to the expected results file.
fn run_constprop_test(test_name: &str) {
    let read = |input_file: &str| {
        String::from_utf8(
            std::fs::read(input_file)
                .unwrap_or_else(|_| panic!("Could not read the input file {input_file}")),
        )
        .expect("The input file does not contain valid utf-8 text")
    };

    let program = load(&read(&format!("test-data/{test_name}.jbc"))).unwrap();

    let mut w = BufWriter::new(Vec::new());
    for method in program.0.methods_with_ir() {
        let result = constprop::analyze(&program, &method);
        let cfg = Cfg::new(program.0.ir(&method).unwrap());
        write!(w, "{method}:\n\n{}\n", result.in_fact(cfg.exit)).unwrap();
    }
    let actual = String::from_utf8(w.into_inner().unwrap()).unwrap();

    let expected = read(&format!("test-data/{test_name}.constprop"));
    collapsed_eq!(&actual, &expected);
}

#[test]
fn golden_constprop() {
    run_constprop_test("arith");
}

#[test]
fn golden_constprop_branch() {
    run_constprop_test("branch");
}
