//! The program model the analyses run on: types, classes, interfaces, methods
//! and their statement-level IR.
//!
//! Identities (`ClassId`, `MethodRef`, `VarId`, ...) are small `Rc`-backed
//! values ordered by content so they can key `BTreeMap`s and print directly.

use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

// SECTION: types

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    Int,
    Boolean,
    Byte,
    Short,
    Char,
    Class(ClassId),
    Array(Rc<Type>),
}

impl Type {
    // whether a variable of this type holds an integer value abstractly; this
    // is the set of primitive kinds the constant-propagation lattice covers.
    pub fn can_hold_int(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Boolean | Type::Byte | Type::Short | Type::Char
        )
    }

    pub fn array_of(elem: Type) -> Type {
        Type::Array(Rc::new(elem))
    }

    // The class used for method dispatch on a receiver of this type, if any.
    // Arrays dispatch through the root class.
    pub fn dispatch_class(&self) -> Option<ClassId> {
        match self {
            Type::Class(c) => Some(c.clone()),
            Type::Array(_) => Some(class_id(OBJECT)),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Boolean => write!(f, "boolean"),
            Type::Byte => write!(f, "byte"),
            Type::Short => write!(f, "short"),
            Type::Char => write!(f, "char"),
            Type::Class(c) => write!(f, "{c}"),
            Type::Array(elem) => write!(f, "{elem}[]"),
        }
    }
}

// SECTION: identities

/// Name of the implicit root class.
pub const OBJECT: &str = "Object";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(Rc<str>);

pub fn class_id(name: &str) -> ClassId {
    ClassId(Rc::from(name))
}

impl ClassId {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A method subsignature: name plus parameter types.  Return types cannot
/// distinguish declarations in this language, so they are not part of it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subsig(Rc<SubsigData>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SubsigData {
    name: String,
    params: Vec<Type>,
}

pub fn subsig(name: &str, params: Vec<Type>) -> Subsig {
    Subsig(Rc::new(SubsigData {
        name: name.to_string(),
        params,
    }))
}

impl Subsig {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn params(&self) -> &[Type] {
        &self.0.params
    }

    pub fn arity(&self) -> usize {
        self.0.params.len()
    }
}

impl Display for Subsig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.0.name)?;
        for (i, t) in self.0.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, ")")
    }
}

/// A reference to a method declaration: declaring class + subsignature.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MethodRef(Rc<MethodRefData>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MethodRefData {
    class: ClassId,
    subsig: Subsig,
}

pub fn method_ref(class: ClassId, subsig: Subsig) -> MethodRef {
    MethodRef(Rc::new(MethodRefData { class, subsig }))
}

impl MethodRef {
    pub fn class(&self) -> &ClassId {
        &self.0.class
    }

    pub fn subsig(&self) -> &Subsig {
        &self.0.subsig
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.0.class, self.0.subsig)
    }
}

/// A resolved field reference carrying the *declaring* class.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldRef(Rc<FieldData>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FieldData {
    class: ClassId,
    name: String,
    typ: Type,
    is_static: bool,
}

pub fn field_ref(class: ClassId, name: &str, typ: Type, is_static: bool) -> FieldRef {
    FieldRef(Rc::new(FieldData {
        class,
        name: name.to_string(),
        typ,
        is_static,
    }))
}

impl FieldRef {
    pub fn class(&self) -> &ClassId {
        &self.0.class
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn typ(&self) -> &Type {
        &self.0.typ
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static
    }
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.class, self.0.name)
    }
}

/// A variable of some method (param, local, or `this`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarId(Rc<VarData>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct VarData {
    method: MethodRef,
    name: String,
    typ: Type,
}

pub fn var_id(method: MethodRef, name: &str, typ: Type) -> VarId {
    VarId(Rc::new(VarData {
        method,
        name: name.to_string(),
        typ,
    }))
}

impl VarId {
    pub fn method(&self) -> &MethodRef {
        &self.0.method
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn typ(&self) -> &Type {
        &self.0.typ
    }
}

impl Display for VarId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// A program point: a statement index within a method.  Used as call-site and
/// allocation-site identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Site {
    pub method: MethodRef,
    pub index: usize,
}

impl Site {
    pub fn new(method: MethodRef, index: usize) -> Site {
        Site { method, index }
    }
}

impl Display for Site {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.index)
    }
}

// SECTION: statements

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        use BinOp::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    pub fn symbol(&self) -> &'static str {
        use BinOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            And => "&",
            Or => "|",
            Xor => "^",
            Shl => "<<",
            Shr => ">>",
            Ushr => ">>>",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Right-hand sides that do not touch the heap or call anything.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Exp {
    Const(i32),
    Binary { op: BinOp, lhs: VarId, rhs: VarId },
    Cast { typ: Type, var: VarId },
}

impl Display for Exp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Const(c) => write!(f, "{c}"),
            Exp::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Exp::Cast { typ, var } => write!(f, "({typ}) {var}"),
        }
    }
}

/// A field access: either `base.f` with a receiver variable or a static
/// access on the declaring class.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldAccess {
    Instance { base: VarId, field: FieldRef },
    Static { field: FieldRef },
}

impl FieldAccess {
    pub fn field(&self) -> &FieldRef {
        match self {
            FieldAccess::Instance { field, .. } | FieldAccess::Static { field } => field,
        }
    }
}

impl Display for FieldAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FieldAccess::Instance { base, field } => write!(f, "{base}.{}", field.name()),
            FieldAccess::Static { field } => write!(f, "{field}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Invoke {
    pub kind: InvokeKind,
    pub lhs: Option<VarId>,
    /// Receiver variable; `None` exactly for static calls.
    pub recv: Option<VarId>,
    /// The declared target: named class + subsignature, before any dispatch.
    pub target: MethodRef,
    pub args: Vec<VarId>,
}

impl Display for Invoke {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(lhs) = &self.lhs {
            write!(f, "{lhs} = ")?;
        }
        let kw = match self.kind {
            InvokeKind::Static => "static",
            InvokeKind::Virtual => "virtual",
            InvokeKind::Interface => "interface",
            InvokeKind::Special => "special",
        };
        write!(f, "{kw} ")?;
        let name = self.target.subsig().name();
        match (&self.recv, self.kind) {
            (Some(r), InvokeKind::Special) => {
                write!(f, "{r}.{}::{name}", self.target.class())?
            }
            (Some(r), _) => write!(f, "{r}.{name}")?,
            (None, _) => write!(f, "{}::{name}", self.target.class())?,
        }
        write!(f, "(")?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StmtKind {
    /// `x = new T` or `x = new T[..]`: an allocation site.
    New { lhs: VarId, typ: Type },
    /// `x = y`.
    Copy { lhs: VarId, rhs: VarId },
    /// `x = <exp>` for literal, binary, and cast right-hand sides.
    Assign { lhs: VarId, rhs: Exp },
    LoadField { lhs: VarId, access: FieldAccess },
    StoreField { access: FieldAccess, rhs: VarId },
    LoadArray { lhs: VarId, base: VarId, index: VarId },
    StoreArray { base: VarId, index: VarId, rhs: VarId },
    Invoke(Invoke),
    /// `if lhs op rhs goto target` with fall-through otherwise.
    If { op: BinOp, lhs: VarId, rhs: VarId, target: usize },
    Goto { target: usize },
    Switch { key: VarId, cases: Vec<(i32, usize)>, default: usize },
    Return { value: Option<VarId> },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stmt {
    pub index: usize,
    pub kind: StmtKind,
}

impl Stmt {
    /// The variable this statement defines, if it is an assignment of any
    /// form (including invoke results).
    pub fn def_var(&self) -> Option<&VarId> {
        use StmtKind::*;
        match &self.kind {
            New { lhs, .. }
            | Copy { lhs, .. }
            | Assign { lhs, .. }
            | LoadField { lhs, .. }
            | LoadArray { lhs, .. } => Some(lhs),
            Invoke(inv) => inv.lhs.as_ref(),
            _ => None,
        }
    }

    /// The variables this statement reads.
    pub fn uses(&self) -> Vec<&VarId> {
        use StmtKind::*;
        match &self.kind {
            New { .. } => vec![],
            Copy { rhs, .. } => vec![rhs],
            Assign { rhs, .. } => match rhs {
                Exp::Const(_) => vec![],
                Exp::Binary { lhs, rhs, .. } => vec![lhs, rhs],
                Exp::Cast { var, .. } => vec![var],
            },
            LoadField { access, .. } => match access {
                FieldAccess::Instance { base, .. } => vec![base],
                FieldAccess::Static { .. } => vec![],
            },
            StoreField { access, rhs } => match access {
                FieldAccess::Instance { base, .. } => vec![base, rhs],
                FieldAccess::Static { .. } => vec![rhs],
            },
            LoadArray { base, index, .. } => vec![base, index],
            StoreArray { base, index, rhs } => vec![base, index, rhs],
            Invoke(inv) => {
                let mut vs: Vec<&VarId> = inv.recv.iter().collect();
                vs.extend(inv.args.iter());
                vs
            }
            If { lhs, rhs, .. } => vec![lhs, rhs],
            Goto { .. } => vec![],
            Switch { key, .. } => vec![key],
            Return { value } => value.iter().collect(),
        }
    }

    pub fn as_invoke(&self) -> Option<&Invoke> {
        match &self.kind {
            StmtKind::Invoke(inv) => Some(inv),
            _ => None,
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use StmtKind::*;
        match &self.kind {
            New { lhs, typ } => write!(f, "{lhs} = new {typ}"),
            Copy { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
            Assign { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
            LoadField { lhs, access } => write!(f, "{lhs} = {access}"),
            StoreField { access, rhs } => write!(f, "{access} = {rhs}"),
            LoadArray { lhs, base, index } => write!(f, "{lhs} = {base}[{index}]"),
            StoreArray { base, index, rhs } => write!(f, "{base}[{index}] = {rhs}"),
            Invoke(inv) => write!(f, "{inv}"),
            If { op, lhs, rhs, target } => write!(f, "if {lhs} {op} {rhs} goto #{target}"),
            Goto { target } => write!(f, "goto #{target}"),
            Switch { key, cases, default } => {
                write!(f, "switch {key} {{ ")?;
                for (v, t) in cases {
                    write!(f, "case {v}: #{t}; ")?;
                }
                write!(f, "default: #{default}; }}")
            }
            Return { value: Some(v) } => write!(f, "return {v}"),
            Return { value: None } => write!(f, "return"),
        }
    }
}

// SECTION: methods and classes

/// The IR of one method body, with the per-variable access indices the
/// points-to analyses walk when a receiver's points-to set grows.
#[derive(Clone, Debug)]
pub struct Ir {
    pub method: MethodRef,
    pub this: Option<VarId>,
    pub params: Vec<VarId>,
    pub locals: Vec<VarId>,
    pub stmts: Vec<Stmt>,
    /// Variables appearing in `return x` statements, in program order.
    pub return_vars: Vec<VarId>,
    /// Receiver variable -> indices of invokes on it.
    pub invokes_on: Map<VarId, Vec<usize>>,
    /// Base variable -> indices of instance field stores `base.f = ..`.
    pub field_stores_on: Map<VarId, Vec<usize>>,
    /// Base variable -> indices of instance field loads `.. = base.f`.
    pub field_loads_on: Map<VarId, Vec<usize>>,
    /// Base variable -> indices of array stores `base[i] = ..`.
    pub array_stores_on: Map<VarId, Vec<usize>>,
    /// Base variable -> indices of array loads `.. = base[i]`.
    pub array_loads_on: Map<VarId, Vec<usize>>,
}

impl Ir {
    /// Builds the derived tables from `stmts`; called once at link time.
    pub fn index_accesses(&mut self) {
        for stmt in &self.stmts {
            match &stmt.kind {
                StmtKind::Invoke(inv) => {
                    if let Some(recv) = &inv.recv {
                        self.invokes_on.entry(recv.clone()).or_default().push(stmt.index);
                    }
                }
                StmtKind::StoreField {
                    access: FieldAccess::Instance { base, .. },
                    ..
                } => {
                    self.field_stores_on.entry(base.clone()).or_default().push(stmt.index);
                }
                StmtKind::LoadField {
                    access: FieldAccess::Instance { base, .. },
                    ..
                } => {
                    self.field_loads_on.entry(base.clone()).or_default().push(stmt.index);
                }
                StmtKind::StoreArray { base, .. } => {
                    self.array_stores_on.entry(base.clone()).or_default().push(stmt.index);
                }
                StmtKind::LoadArray { base, .. } => {
                    self.array_loads_on.entry(base.clone()).or_default().push(stmt.index);
                }
                StmtKind::Return { value: Some(v) } => {
                    self.return_vars.push(v.clone());
                }
                _ => (),
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Method {
    pub id: MethodRef,
    pub ret: Option<Type>,
    pub is_static: bool,
    pub is_abstract: bool,
    /// `None` for abstract and interface methods: there is nothing to
    /// analyze, and reachability does not expand through them.
    pub ir: Option<Ir>,
}

#[derive(Clone, Debug)]
pub struct Class {
    pub id: ClassId,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// `None` only for the root class.
    pub super_class: Option<ClassId>,
    /// Implemented interfaces (classes) or extended interfaces (interfaces).
    pub interfaces: Set<ClassId>,
    pub fields: Map<String, FieldRef>,
    pub methods: Map<Subsig, Method>,
}

// SECTION: program and hierarchy

/// Inverted subtype edges, built once at link time.
#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    pub direct_subclasses: Map<ClassId, Set<ClassId>>,
    pub direct_subinterfaces: Map<ClassId, Set<ClassId>>,
    pub direct_implementors: Map<ClassId, Set<ClassId>>,
}

impl Hierarchy {
    pub fn direct_subclasses_of<'a>(&'a self, c: &ClassId) -> impl Iterator<Item = &'a ClassId> {
        self.direct_subclasses.get(c).into_iter().flatten()
    }

    pub fn direct_subinterfaces_of<'a>(&'a self, c: &ClassId) -> impl Iterator<Item = &'a ClassId> {
        self.direct_subinterfaces.get(c).into_iter().flatten()
    }

    pub fn direct_implementors_of<'a>(&'a self, c: &ClassId) -> impl Iterator<Item = &'a ClassId> {
        self.direct_implementors.get(c).into_iter().flatten()
    }
}

#[derive(Clone, Debug)]
pub struct Program {
    pub classes: Map<ClassId, Class>,
    pub hierarchy: Hierarchy,
}

impl Program {
    pub fn class(&self, id: &ClassId) -> &Class {
        &self.classes[id]
    }

    /// The method a `MethodRef` names, if its class declares that
    /// subsignature.
    pub fn declared_method(&self, class: &ClassId, subsig: &Subsig) -> Option<&Method> {
        self.classes.get(class).and_then(|c| c.methods.get(subsig))
    }

    pub fn method(&self, m: &MethodRef) -> &Method {
        self.declared_method(m.class(), m.subsig())
            .unwrap_or_else(|| panic!("unresolved method reference {m}"))
    }

    pub fn ir(&self, m: &MethodRef) -> Option<&Ir> {
        self.method(m).ir.as_ref()
    }

    /// The entry method: the unique `static method main()`.
    pub fn main_method(&self) -> Option<MethodRef> {
        let main = subsig("main", vec![]);
        self.classes
            .values()
            .find(|c| c.methods.get(&main).is_some_and(|m| m.is_static))
            .map(|c| method_ref(c.id.clone(), main.clone()))
    }

    /// All methods with a body, in deterministic order.
    pub fn methods_with_ir(&self) -> Vec<MethodRef> {
        self.classes
            .values()
            .flat_map(|c| c.methods.values())
            .filter(|m| m.ir.is_some())
            .map(|m| m.id.clone())
            .collect()
    }
}
