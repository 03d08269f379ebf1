// resolve a raw parsed program into the linked program model: class
// hierarchy, field/method references, and per-method IR.  all checks that
// make a program analyzable happen here:
//
// - class/interface references resolve; no duplicate or cyclic declarations.
// - field accesses resolve to their declaring class and match static-ness.
// - invokes resolve to a declared subsignature with matching arity and
//   static-ness; ambiguous overloads are rejected.
// - every used variable is declared; labels resolve; bodies cannot fall off
//   the end; `return x` only in value-returning methods.
//
// a program that passes comes out as `Valid<Program>`, which is what every
// analysis takes.

use std::collections::{BTreeMap as Map, BTreeSet as Set};

use derive_more::Display;

use super::ast;
use crate::commons::Valid;
use crate::middle_end::lang::*;

// SECTION: interface

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub struct LinkError(pub String);
impl std::error::Error for LinkError {}

pub fn link(raw: &ast::Program) -> Result<Valid<Program>, LinkError> {
    let mut linker = Linker::default();
    linker.declare_classes(raw)?;
    linker.build_hierarchy()?;
    linker.link_bodies(raw)?;
    Ok(Valid(Program {
        classes: linker.classes,
        hierarchy: linker.hierarchy,
    }))
}

fn err<T>(line: usize, msg: impl std::fmt::Display) -> Result<T, LinkError> {
    Err(LinkError(format!("line {line}: {msg}")))
}

// SECTION: linker state

#[derive(Default)]
struct Linker {
    classes: Map<ClassId, Class>,
    hierarchy: Hierarchy,
}

impl Linker {
    // first pass: declare every class with its fields and method signatures,
    // without looking at bodies.
    fn declare_classes(&mut self, raw: &ast::Program) -> Result<(), LinkError> {
        let mut declared: Set<&str> = Set::new();
        for decl in &raw.decls {
            if !declared.insert(&decl.name) {
                return err(decl.line, format!("duplicate class `{}`", decl.name));
            }
        }

        // the implicit root, unless the program declares it.
        if !declared.contains(OBJECT) {
            let object = class_id(OBJECT);
            self.classes.insert(
                object.clone(),
                Class {
                    id: object,
                    is_interface: false,
                    is_abstract: false,
                    super_class: None,
                    interfaces: Set::new(),
                    fields: Map::new(),
                    methods: Map::new(),
                },
            );
        }

        let resolve_name = |name: &str, line: usize| -> Result<ClassId, LinkError> {
            if name == OBJECT || declared.contains(name) {
                Ok(class_id(name))
            } else {
                err(line, format!("unknown class `{name}`"))
            }
        };

        for decl in &raw.decls {
            let id = class_id(&decl.name);

            let super_class = if decl.is_interface || decl.name == OBJECT {
                None
            } else {
                match decl.extends.first() {
                    Some(name) => Some(resolve_name(name, decl.line)?),
                    None => Some(class_id(OBJECT)),
                }
            };

            let mut interfaces = Set::new();
            let iface_names = if decl.is_interface {
                &decl.extends
            } else {
                &decl.implements
            };
            for name in iface_names {
                interfaces.insert(resolve_name(name, decl.line)?);
            }

            let mut fields = Map::new();
            for f in &decl.fields {
                let typ = self.lower_type(&f.typ, &declared, f.line)?;
                let fr = field_ref(id.clone(), &f.name, typ, f.is_static);
                if fields.insert(f.name.clone(), fr).is_some() {
                    return err(f.line, format!("duplicate field `{}`", f.name));
                }
            }

            let mut methods = Map::new();
            for m in &decl.methods {
                let params: Vec<Type> = m
                    .params
                    .iter()
                    .map(|(_, t)| self.lower_type(t, &declared, m.line))
                    .collect::<Result<_, _>>()?;
                let sig = subsig(&m.name, params);
                let ret = match &m.ret {
                    Some(t) => Some(self.lower_type(t, &declared, m.line)?),
                    None => None,
                };
                let is_abstract = m.is_abstract || decl.is_interface;
                if is_abstract && m.is_static {
                    return err(m.line, format!("static method `{}` cannot be abstract", m.name));
                }
                if is_abstract && m.body.is_some() {
                    return err(m.line, format!("abstract method `{}` has a body", m.name));
                }
                if !is_abstract && m.body.is_none() {
                    return err(m.line, format!("method `{}` has no body", m.name));
                }
                if is_abstract && !decl.is_interface && !decl.is_abstract {
                    return err(
                        m.line,
                        format!("abstract method `{}` in non-abstract class", m.name),
                    );
                }
                let method = Method {
                    id: method_ref(id.clone(), sig.clone()),
                    ret,
                    is_static: m.is_static,
                    is_abstract,
                    ir: None, // bodies are linked in a later pass
                };
                if methods.insert(sig.clone(), method).is_some() {
                    return err(m.line, format!("duplicate method `{sig}`"));
                }
            }

            self.classes.insert(
                id.clone(),
                Class {
                    id,
                    is_interface: decl.is_interface,
                    is_abstract: decl.is_abstract,
                    super_class,
                    interfaces,
                    fields,
                    methods,
                },
            );
        }
        Ok(())
    }

    fn lower_type(
        &self,
        raw: &ast::RawType,
        declared: &Set<&str>,
        line: usize,
    ) -> Result<Type, LinkError> {
        Ok(match raw {
            ast::RawType::Int => Type::Int,
            ast::RawType::Boolean => Type::Boolean,
            ast::RawType::Byte => Type::Byte,
            ast::RawType::Short => Type::Short,
            ast::RawType::Char => Type::Char,
            ast::RawType::Named(name) => {
                if name == OBJECT || declared.contains(name.as_str()) {
                    Type::Class(class_id(name))
                } else {
                    return err(line, format!("unknown class `{name}`"));
                }
            }
            ast::RawType::Array(elem) => Type::array_of(self.lower_type(elem, declared, line)?),
        })
    }

    // second pass: invert the subtype edges and reject inheritance cycles.
    fn build_hierarchy(&mut self) -> Result<(), LinkError> {
        for class in self.classes.values() {
            if let Some(sup) = &class.super_class {
                let sup_class = &self.classes[sup];
                if sup_class.is_interface {
                    return Err(LinkError(format!(
                        "class `{}` extends interface `{sup}`",
                        class.id
                    )));
                }
                self.hierarchy
                    .direct_subclasses
                    .entry(sup.clone())
                    .or_default()
                    .insert(class.id.clone());
            }
            for iface in &class.interfaces {
                if !self.classes[iface].is_interface {
                    return Err(LinkError(format!(
                        "`{}` implements non-interface `{iface}`",
                        class.id
                    )));
                }
                let entry = if class.is_interface {
                    self.hierarchy.direct_subinterfaces.entry(iface.clone())
                } else {
                    self.hierarchy.direct_implementors.entry(iface.clone())
                };
                entry.or_default().insert(class.id.clone());
            }
        }

        // cycle check over extends + interface-extends edges.
        for start in self.classes.keys() {
            let mut seen = Set::new();
            let mut stack = vec![start.clone()];
            while let Some(c) = stack.pop() {
                if !seen.insert(c.clone()) {
                    continue;
                }
                let class = &self.classes[&c];
                if let Some(sup) = &class.super_class {
                    if sup == start {
                        return Err(LinkError(format!("inheritance cycle through `{start}`")));
                    }
                    stack.push(sup.clone());
                }
                for iface in &class.interfaces {
                    if iface == start {
                        return Err(LinkError(format!("inheritance cycle through `{start}`")));
                    }
                    stack.push(iface.clone());
                }
            }
        }
        Ok(())
    }

    // third pass: resolve method bodies into IR.
    fn link_bodies(&mut self, raw: &ast::Program) -> Result<(), LinkError> {
        let snapshot = self.classes.clone();
        let declared: Set<&str> = snapshot.keys().map(|c| c.name()).collect();
        for decl in &raw.decls {
            let class = class_id(&decl.name);
            for m in &decl.methods {
                let Some(body) = &m.body else { continue };
                let params: Vec<Type> = m
                    .params
                    .iter()
                    .map(|(_, t)| self.lower_type(t, &declared, m.line))
                    .collect::<Result<_, _>>()?;
                let sig = subsig(&m.name, params);
                let mref = method_ref(class.clone(), sig.clone());
                let ir = BodyLinker {
                    classes: &snapshot,
                    method: mref.clone(),
                    is_static: m.is_static,
                    has_ret: m.ret.is_some(),
                }
                .link(m, body)?;
                self.classes
                    .get_mut(&class)
                    .unwrap()
                    .methods
                    .get_mut(&sig)
                    .unwrap()
                    .ir = Some(ir);
            }
        }
        Ok(())
    }
}

// SECTION: per-body linking

struct BodyLinker<'a> {
    classes: &'a Map<ClassId, Class>,
    method: MethodRef,
    is_static: bool,
    has_ret: bool,
}

impl BodyLinker<'_> {
    fn link(&self, decl: &ast::MethodDecl, body: &ast::Body) -> Result<Ir, LinkError> {
        let declared: Set<&str> = self.classes.keys().map(|c| c.name()).collect();
        let mut vars: Map<String, VarId> = Map::new();

        let this = if self.is_static {
            None
        } else {
            let t = var_id(
                self.method.clone(),
                "this",
                Type::Class(self.method.class().clone()),
            );
            vars.insert("this".to_string(), t.clone());
            Some(t)
        };

        let mut params = vec![];
        for (name, typ) in &decl.params {
            let typ = self.lower_type(typ, &declared, decl.line)?;
            let v = var_id(self.method.clone(), name, typ);
            if vars.insert(name.clone(), v.clone()).is_some() {
                return err(decl.line, format!("duplicate parameter `{name}`"));
            }
            params.push(v);
        }

        let mut locals = vec![];
        for (name, typ) in &body.locals {
            let typ = self.lower_type(typ, &declared, decl.line)?;
            let v = var_id(self.method.clone(), name, typ);
            if vars.insert(name.clone(), v.clone()).is_some() {
                return err(decl.line, format!("duplicate variable `{name}`"));
            }
            locals.push(v);
        }

        // collect label targets first so forward jumps resolve.
        let mut labels: Map<&str, usize> = Map::new();
        for (i, s) in body.stmts.iter().enumerate() {
            if let Some(l) = &s.label {
                if labels.insert(l.as_str(), i).is_some() {
                    return err(s.line, format!("duplicate label `{l}`"));
                }
            }
        }

        let mut stmts = vec![];
        for (i, s) in body.stmts.iter().enumerate() {
            let kind = self.link_stmt(s, &vars, &labels, &declared)?;
            stmts.push(Stmt { index: i, kind });
        }

        // bodies cannot fall off the end.
        match stmts.last().map(|s| &s.kind) {
            Some(StmtKind::Return { .. }) | Some(StmtKind::Goto { .. })
            | Some(StmtKind::Switch { .. }) => (),
            _ => {
                return err(
                    decl.line,
                    format!("method `{}` can fall off the end of its body", self.method),
                )
            }
        }

        let mut ir = Ir {
            method: self.method.clone(),
            this,
            params,
            locals,
            stmts,
            return_vars: vec![],
            invokes_on: Map::new(),
            field_stores_on: Map::new(),
            field_loads_on: Map::new(),
            array_stores_on: Map::new(),
            array_loads_on: Map::new(),
        };
        ir.index_accesses();
        Ok(ir)
    }

    fn lower_type(
        &self,
        raw: &ast::RawType,
        declared: &Set<&str>,
        line: usize,
    ) -> Result<Type, LinkError> {
        Ok(match raw {
            ast::RawType::Int => Type::Int,
            ast::RawType::Boolean => Type::Boolean,
            ast::RawType::Byte => Type::Byte,
            ast::RawType::Short => Type::Short,
            ast::RawType::Char => Type::Char,
            ast::RawType::Named(name) => {
                if declared.contains(name.as_str()) {
                    Type::Class(class_id(name))
                } else {
                    return err(line, format!("unknown class `{name}`"));
                }
            }
            ast::RawType::Array(elem) => Type::array_of(self.lower_type(elem, declared, line)?),
        })
    }

    fn var(&self, name: &str, vars: &Map<String, VarId>, line: usize) -> Result<VarId, LinkError> {
        vars.get(name)
            .cloned()
            .ok_or_else(|| LinkError(format!("line {line}: undeclared variable `{name}`")))
    }

    fn int_var(
        &self,
        name: &str,
        vars: &Map<String, VarId>,
        line: usize,
    ) -> Result<VarId, LinkError> {
        let v = self.var(name, vars, line)?;
        if !v.typ().can_hold_int() {
            return err(line, format!("variable `{name}` is not integer-valued"));
        }
        Ok(v)
    }

    fn label(&self, name: &str, labels: &Map<&str, usize>, line: usize) -> Result<usize, LinkError> {
        labels
            .get(name)
            .copied()
            .ok_or_else(|| LinkError(format!("line {line}: unknown label `{name}`")))
    }

    // search the superclass chain for a declared field.
    fn resolve_field(&self, class: &ClassId, name: &str) -> Option<FieldRef> {
        let mut cur = Some(class.clone());
        while let Some(c) = cur {
            let cls = self.classes.get(&c)?;
            if let Some(f) = cls.fields.get(name) {
                return Some(f.clone());
            }
            cur = cls.super_class.clone();
        }
        None
    }

    // find the unique declared method with the given name and arity, walking
    // the superclass chain (and superinterfaces for interface receivers).
    fn resolve_subsig(
        &self,
        class: &ClassId,
        name: &str,
        arity: usize,
        walk_supers: bool,
        line: usize,
    ) -> Result<Subsig, LinkError> {
        let mut work = vec![class.clone()];
        let mut seen = Set::new();
        while let Some(c) = work.pop() {
            if !seen.insert(c.clone()) {
                continue;
            }
            let Some(cls) = self.classes.get(&c) else { continue };
            let matches: Vec<&Subsig> = cls
                .methods
                .keys()
                .filter(|s| s.name() == name && s.arity() == arity)
                .collect();
            match matches.len() {
                0 => (),
                1 => return Ok(matches[0].clone()),
                _ => {
                    return err(
                        line,
                        format!("ambiguous call to `{name}/{arity}` on `{class}`"),
                    )
                }
            }
            if walk_supers {
                if let Some(sup) = &cls.super_class {
                    work.push(sup.clone());
                }
                for iface in &cls.interfaces {
                    work.push(iface.clone());
                }
            }
        }
        err(line, format!("no method `{name}/{arity}` on `{class}`"))
    }

    fn link_stmt(
        &self,
        s: &ast::RawStmt,
        vars: &Map<String, VarId>,
        labels: &Map<&str, usize>,
        declared: &Set<&str>,
    ) -> Result<StmtKind, LinkError> {
        use ast::RawStmtKind as R;
        let line = s.line;
        Ok(match &s.kind {
            R::Const { lhs, value } => StmtKind::Assign {
                lhs: self.int_var(lhs, vars, line)?,
                rhs: Exp::Const(*value),
            },
            R::Copy { lhs, rhs } => StmtKind::Copy {
                lhs: self.var(lhs, vars, line)?,
                rhs: self.var(rhs, vars, line)?,
            },
            R::Binary { lhs, op, l, r } => StmtKind::Assign {
                lhs: self.int_var(lhs, vars, line)?,
                rhs: Exp::Binary {
                    op: *op,
                    lhs: self.int_var(l, vars, line)?,
                    rhs: self.int_var(r, vars, line)?,
                },
            },
            R::Cast { lhs, typ, rhs } => StmtKind::Assign {
                lhs: self.var(lhs, vars, line)?,
                rhs: Exp::Cast {
                    typ: self.lower_type(typ, declared, line)?,
                    var: self.var(rhs, vars, line)?,
                },
            },
            R::New { lhs, typ, is_array } => {
                let typ = self.lower_type(typ, declared, line)?;
                let typ = if *is_array { Type::array_of(typ) } else { typ };
                if !*is_array && !matches!(typ, Type::Class(_)) {
                    return err(line, "`new` of a non-class type requires `[..]`");
                }
                StmtKind::New {
                    lhs: self.var(lhs, vars, line)?,
                    typ,
                }
            }
            R::Load { lhs, base, field } => StmtKind::LoadField {
                lhs: self.var(lhs, vars, line)?,
                access: self.field_access(base, field, vars, line)?,
            },
            R::Store { base, field, rhs } => StmtKind::StoreField {
                access: self.field_access(base, field, vars, line)?,
                rhs: self.var(rhs, vars, line)?,
            },
            R::LoadArray { lhs, base, index } => StmtKind::LoadArray {
                lhs: self.var(lhs, vars, line)?,
                base: self.array_var(base, vars, line)?,
                index: self.int_var(index, vars, line)?,
            },
            R::StoreArray { base, index, rhs } => StmtKind::StoreArray {
                base: self.array_var(base, vars, line)?,
                index: self.int_var(index, vars, line)?,
                rhs: self.var(rhs, vars, line)?,
            },
            R::Invoke {
                lhs,
                kind,
                recv,
                class,
                method,
                args,
            } => StmtKind::Invoke(self.link_invoke(
                lhs.as_deref(),
                *kind,
                recv.as_deref(),
                class.as_deref(),
                method,
                args,
                vars,
                line,
            )?),
            R::If { op, l, r, target } => StmtKind::If {
                op: *op,
                lhs: self.int_var(l, vars, line)?,
                rhs: self.int_var(r, vars, line)?,
                target: self.label(target, labels, line)?,
            },
            R::Goto { target } => StmtKind::Goto {
                target: self.label(target, labels, line)?,
            },
            R::Switch { key, cases, default } => {
                let mut linked = vec![];
                let mut values = Set::new();
                for (v, t) in cases {
                    if !values.insert(*v) {
                        return err(line, format!("duplicate switch case `{v}`"));
                    }
                    linked.push((*v, self.label(t, labels, line)?));
                }
                StmtKind::Switch {
                    key: self.int_var(key, vars, line)?,
                    cases: linked,
                    default: self.label(default, labels, line)?,
                }
            }
            R::Return { value } => {
                let value = match value {
                    Some(v) => {
                        if !self.has_ret {
                            return err(line, "`return <var>` in a method without a return type");
                        }
                        Some(self.var(v, vars, line)?)
                    }
                    None => {
                        if self.has_ret {
                            return err(line, "bare `return` in a value-returning method");
                        }
                        None
                    }
                };
                StmtKind::Return { value }
            }
        })
    }

    fn array_var(
        &self,
        name: &str,
        vars: &Map<String, VarId>,
        line: usize,
    ) -> Result<VarId, LinkError> {
        let v = self.var(name, vars, line)?;
        if !matches!(v.typ(), Type::Array(_)) {
            return err(line, format!("variable `{name}` is not an array"));
        }
        Ok(v)
    }

    // `base.f` where `base` is either a variable (instance access) or a class
    // name (static access).
    fn field_access(
        &self,
        base: &str,
        field: &str,
        vars: &Map<String, VarId>,
        line: usize,
    ) -> Result<FieldAccess, LinkError> {
        if let Some(v) = vars.get(base) {
            let Type::Class(c) = v.typ() else {
                return err(line, format!("`{base}` is not of class type"));
            };
            let f = self
                .resolve_field(c, field)
                .ok_or_else(|| LinkError(format!("line {line}: no field `{field}` on `{c}`")))?;
            if f.is_static() {
                return err(line, format!("field `{field}` is static; access it via `{}`", f.class()));
            }
            return Ok(FieldAccess::Instance {
                base: v.clone(),
                field: f,
            });
        }
        let c = class_id(base);
        if self.classes.contains_key(&c) {
            let f = self
                .resolve_field(&c, field)
                .ok_or_else(|| LinkError(format!("line {line}: no field `{field}` on `{c}`")))?;
            if !f.is_static() {
                return err(line, format!("field `{field}` is not static"));
            }
            return Ok(FieldAccess::Static { field: f });
        }
        err(line, format!("`{base}` is neither a variable nor a class"))
    }

    #[allow(clippy::too_many_arguments)]
    fn link_invoke(
        &self,
        lhs: Option<&str>,
        kind: InvokeKind,
        recv: Option<&str>,
        class: Option<&str>,
        method: &str,
        args: &[String],
        vars: &Map<String, VarId>,
        line: usize,
    ) -> Result<Invoke, LinkError> {
        let lhs = lhs.map(|l| self.var(l, vars, line)).transpose()?;
        let recv = recv.map(|r| self.var(r, vars, line)).transpose()?;
        let args: Vec<VarId> = args
            .iter()
            .map(|a| self.var(a, vars, line))
            .collect::<Result<_, _>>()?;

        // the class the call names: explicit for static/special, the
        // receiver's static type for virtual/interface.
        let named = match (&recv, class) {
            (_, Some(c)) => {
                let id = class_id(c);
                if !self.classes.contains_key(&id) {
                    return err(line, format!("unknown class `{c}`"));
                }
                id
            }
            (Some(r), None) => match r.typ() {
                Type::Class(c) => c.clone(),
                t => return err(line, format!("receiver `{r}` of non-class type `{t}`")),
            },
            (None, None) => unreachable!("parser guarantees a class or receiver"),
        };

        let named_class = &self.classes[&named];
        match kind {
            InvokeKind::Interface if !named_class.is_interface => {
                return err(line, format!("`{named}` is not an interface"));
            }
            InvokeKind::Virtual if named_class.is_interface => {
                return err(line, format!("`{named}` is an interface; use `interface`"));
            }
            _ => (),
        }

        // static calls must name the declaring class itself; the others
        // search the hierarchy.
        let walk_supers = kind != InvokeKind::Static;
        let sig = self.resolve_subsig(&named, method, args.len(), walk_supers, line)?;

        // static-ness of the declaration must match the call kind.
        let declaring = self.find_declaring(&named, &sig);
        if let Some(m) = declaring {
            if m.is_static != (kind == InvokeKind::Static) {
                return err(
                    line,
                    format!(
                        "call kind does not match static-ness of `{}::{sig}`",
                        m.id.class()
                    ),
                );
            }
        }

        Ok(Invoke {
            kind,
            lhs,
            recv,
            target: method_ref(named, sig),
            args,
        })
    }

    fn find_declaring(&self, class: &ClassId, sig: &Subsig) -> Option<&Method> {
        let mut work = vec![class.clone()];
        let mut seen = Set::new();
        while let Some(c) = work.pop() {
            if !seen.insert(c.clone()) {
                continue;
            }
            let cls = self.classes.get(&c)?;
            if let Some(m) = cls.methods.get(sig) {
                return Some(m);
            }
            if let Some(sup) = &cls.super_class {
                work.push(sup.clone());
            }
            for iface in &cls.interfaces {
                work.push(iface.clone());
            }
        }
        None
    }
}
