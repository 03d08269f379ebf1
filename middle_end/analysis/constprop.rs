//! Intraprocedural integer constant propagation, with no pointer information.

use std::collections::BTreeMap as Map;
use std::fmt::{self, Display, Formatter};

use crate::commons::Valid;
use crate::middle_end::lang::*;

use super::{Cfg, DataflowAnalysis, DataflowResult, EdgeKind, NodeId};

// SECTION: analysis interface

/// The constant lattice.  It represents the abstract value for an integer
/// variable: `Undef` is bottom (no information reaches here), `Nac` is top
/// ("not a constant").
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Value {
    Undef,
    Const(i32),
    Nac,
}

impl Value {
    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn is_nac(&self) -> bool {
        matches!(self, Value::Nac)
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn as_const(&self) -> Option<i32> {
        match self {
            Value::Const(c) => Some(*c),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => write!(f, "UNDEF"),
            Value::Const(c) => write!(f, "{c}"),
            Value::Nac => write!(f, "NAC"),
        }
    }
}

/// The lattice meet.
pub fn meet_value(v1: Value, v2: Value) -> Value {
    use Value::*;
    match (v1, v2) {
        (Nac, _) | (_, Nac) => Nac,
        (Undef, v) | (v, Undef) => v,
        (Const(a), Const(b)) => {
            if a == b {
                Const(a)
            } else {
                Nac
            }
        }
    }
}

/// A map from variables to lattice values.  Absent variables are `Undef`, and
/// the map never stores `Undef` explicitly, so equality is structural.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CPFact {
    values: Map<VarId, Value>,
}

impl CPFact {
    pub fn new() -> CPFact {
        CPFact::default()
    }

    pub fn get(&self, v: &VarId) -> Value {
        self.values.get(v).copied().unwrap_or(Value::Undef)
    }

    // set the value of a variable; returns whether the fact changed.
    pub fn update(&mut self, v: &VarId, value: Value) -> bool {
        if value == Value::Undef {
            return self.values.remove(v).is_some();
        }
        self.values.insert(v.clone(), value) != Some(value)
    }

    pub fn remove(&mut self, v: &VarId) -> Option<Value> {
        self.values.remove(v)
    }

    pub fn copy(&self) -> CPFact {
        self.clone()
    }

    // make self identical to other; returns whether self changed.
    pub fn copy_from(&mut self, other: &CPFact) -> bool {
        if self == other {
            false
        } else {
            self.values = other.values.clone();
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VarId, Value)> {
        self.values.iter().map(|(v, val)| (v, *val))
    }
}

impl Display for CPFact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (var, val) in &self.values {
            writeln!(f, "{var} -> {val}")?;
        }
        Ok(())
    }
}

// Performs the analysis over one method.
pub fn analyze(program: &Valid<Program>, method: &MethodRef) -> DataflowResult<CPFact> {
    let ir = program
        .0
        .ir(method)
        .unwrap_or_else(|| panic!("no IR for {method}"));
    let cfg = Cfg::new(ir);
    super::solve(&ConstantPropagation, &cfg, ir)
}

// SECTION: analysis implementation

pub struct ConstantPropagation;

impl DataflowAnalysis for ConstantPropagation {
    type Fact = CPFact;

    fn is_forward(&self) -> bool {
        true
    }

    fn new_boundary_fact(&self, cfg: &Cfg) -> CPFact {
        // parameters hold whatever the caller passes.
        let mut fact = CPFact::new();
        for p in &cfg.params {
            if p.typ().can_hold_int() {
                fact.update(p, Value::Nac);
            }
        }
        fact
    }

    fn new_initial_fact(&self) -> CPFact {
        CPFact::new()
    }

    fn meet_into(&self, fact: &CPFact, target: &mut CPFact) {
        for (v, val) in fact.iter() {
            let met = meet_value(val, target.get(v));
            target.update(v, met);
        }
    }

    fn transfer_node(
        &self,
        cfg: &Cfg,
        ir: &Ir,
        node: NodeId,
        input: &CPFact,
        out: &mut CPFact,
    ) -> bool {
        let mut tmp = input.copy();
        if let Some(stmt) = cfg.stmt(ir, node) {
            transfer_stmt(stmt, input, &mut tmp);
        }
        out.copy_from(&tmp)
    }

    // branch edges the facts decide against are infeasible: they carry
    // nothing and the wavefront does not cross them.
    fn transfer_edge(
        &self,
        cfg: &Cfg,
        ir: &Ir,
        src: NodeId,
        kind: EdgeKind,
        fact: &CPFact,
    ) -> Option<CPFact> {
        match cfg.stmt(ir, src).map(|s| &s.kind) {
            Some(StmtKind::If { op, lhs, rhs, .. }) => {
                let cond = evaluate_binary(*op, fact.get(lhs), fact.get(rhs));
                if let Some(c) = cond.as_const() {
                    let feasible = match kind {
                        EdgeKind::IfTrue => c != 0,
                        EdgeKind::IfFalse => c == 0,
                        _ => true,
                    };
                    if !feasible {
                        return None;
                    }
                }
                Some(fact.copy())
            }
            Some(StmtKind::Switch { key, cases, .. }) => {
                if let Value::Const(k) = fact.get(key) {
                    let feasible = match kind {
                        EdgeKind::SwitchCase(v) => v == k,
                        EdgeKind::SwitchDefault => !cases.iter().any(|(v, _)| *v == k),
                        _ => true,
                    };
                    if !feasible {
                        return None;
                    }
                }
                Some(fact.copy())
            }
            _ => Some(fact.copy()),
        }
    }
}

// the common assignment transfer, shared with the interprocedural analysis:
// re-evaluate an assignment into an int-holding variable, drop assignments
// into anything else.
pub fn transfer_stmt(stmt: &Stmt, input: &CPFact, fact: &mut CPFact) {
    if let Some(lhs) = stmt.def_var() {
        if lhs.typ().can_hold_int() {
            fact.update(lhs, evaluate_rhs(stmt, input));
        } else {
            fact.remove(lhs);
        }
    }
}

// abstract value of the right-hand side of a defining statement.
fn evaluate_rhs(stmt: &Stmt, input: &CPFact) -> Value {
    match &stmt.kind {
        StmtKind::Copy { rhs, .. } => input.get(rhs),
        StmtKind::Assign { rhs, .. } => evaluate(rhs, input),
        // heap loads, allocations, and call results are unknown here; the
        // interprocedural analysis refines loads through its heap map.
        StmtKind::New { .. }
        | StmtKind::LoadField { .. }
        | StmtKind::LoadArray { .. }
        | StmtKind::Invoke(_) => Value::Nac,
        _ => unreachable!("statement without a defined variable"),
    }
}

/// Evaluates an expression under the given fact.
pub fn evaluate(exp: &Exp, input: &CPFact) -> Value {
    match exp {
        Exp::Const(c) => Value::Const(*c),
        Exp::Cast { .. } => Value::Nac,
        Exp::Binary { op, lhs, rhs } => evaluate_binary(*op, input.get(lhs), input.get(rhs)),
    }
}

/// Evaluates `a op b` over lattice values.
pub fn evaluate_binary(op: BinOp, a: Value, b: Value) -> Value {
    use Value::*;

    // division and remainder by a constant zero are unreachable in any
    // concrete run, so they contribute nothing to the join, even when the
    // dividend is NAC.
    if matches!(op, BinOp::Div | BinOp::Rem) && b == Const(0) {
        return Undef;
    }
    let (a, b) = match (a, b) {
        (Nac, _) | (_, Nac) => return Nac,
        (Undef, _) | (_, Undef) => return Undef,
        (Const(a), Const(b)) => (a, b),
    };

    let result = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Rem => a.wrapping_rem(b),
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        // shift counts use the low five bits, as the concrete semantics do.
        BinOp::Shl => a.wrapping_shl(b as u32 & 0x1f),
        BinOp::Shr => a.wrapping_shr(b as u32 & 0x1f),
        BinOp::Ushr => ((a as u32).wrapping_shr(b as u32 & 0x1f)) as i32,
        BinOp::Eq => (a == b) as i32,
        BinOp::Ne => (a != b) as i32,
        BinOp::Lt => (a < b) as i32,
        BinOp::Le => (a <= b) as i32,
        BinOp::Gt => (a > b) as i32,
        BinOp::Ge => (a >= b) as i32,
    };
    Const(result)
}
