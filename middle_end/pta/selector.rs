//! Pluggable context selectors: how method and heap contexts are chosen.

use std::fmt::Debug;

use crate::middle_end::lang::{ClassId, MethodRef, Site, OBJECT};

use super::context::{Context, ContextElem, ContextManager};
use super::heap::Obj;

/// The three decisions a context-sensitivity policy makes: the context of a
/// statically-resolved callee, the context of a dispatched callee given its
/// receiver, and the heap context of an allocation.
pub trait ContextSelector: Debug {
    fn select_context(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        site: &Site,
        callee: &MethodRef,
    ) -> Context;

    fn select_context_with_recv(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        site: &Site,
        recv_ctx: &Context,
        recv_obj: &Obj,
        callee: &MethodRef,
    ) -> Context;

    fn select_heap_context(
        &self,
        mgr: &mut ContextManager,
        method_ctx: &Context,
        obj: &Obj,
    ) -> Context;
}

/// Context-insensitive: everything lives in the empty context.
#[derive(Clone, Copy, Debug)]
pub struct CiSelector;

impl ContextSelector for CiSelector {
    fn select_context(
        &self,
        mgr: &mut ContextManager,
        _caller_ctx: &Context,
        _site: &Site,
        _callee: &MethodRef,
    ) -> Context {
        mgr.empty()
    }

    fn select_context_with_recv(
        &self,
        mgr: &mut ContextManager,
        _caller_ctx: &Context,
        _site: &Site,
        _recv_ctx: &Context,
        _recv_obj: &Obj,
        _callee: &MethodRef,
    ) -> Context {
        mgr.empty()
    }

    fn select_heap_context(
        &self,
        mgr: &mut ContextManager,
        _method_ctx: &Context,
        _obj: &Obj,
    ) -> Context {
        mgr.empty()
    }
}

/// k-call-string sensitivity: contexts are the last k call sites.
#[derive(Clone, Copy, Debug)]
pub struct KCallSelector {
    pub k: usize,
}

impl ContextSelector for KCallSelector {
    fn select_context(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        site: &Site,
        _callee: &MethodRef,
    ) -> Context {
        mgr.append_limited(caller_ctx, ContextElem::Site(site.clone()), self.k)
    }

    fn select_context_with_recv(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        site: &Site,
        _recv_ctx: &Context,
        _recv_obj: &Obj,
        _callee: &MethodRef,
    ) -> Context {
        mgr.append_limited(caller_ctx, ContextElem::Site(site.clone()), self.k)
    }

    fn select_heap_context(
        &self,
        mgr: &mut ContextManager,
        method_ctx: &Context,
        _obj: &Obj,
    ) -> Context {
        mgr.truncate(method_ctx, self.k.saturating_sub(1))
    }
}

/// k-object sensitivity: contexts are the last k receiver allocation sites.
#[derive(Clone, Copy, Debug)]
pub struct KObjSelector {
    pub k: usize,
}

impl ContextSelector for KObjSelector {
    // static calls have no receiver: keep the caller's view, k-limited.
    fn select_context(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        _site: &Site,
        _callee: &MethodRef,
    ) -> Context {
        mgr.truncate(caller_ctx, self.k)
    }

    fn select_context_with_recv(
        &self,
        mgr: &mut ContextManager,
        _caller_ctx: &Context,
        _site: &Site,
        recv_ctx: &Context,
        recv_obj: &Obj,
        _callee: &MethodRef,
    ) -> Context {
        mgr.append_limited(recv_ctx, ContextElem::Obj(recv_obj.clone()), self.k)
    }

    fn select_heap_context(
        &self,
        mgr: &mut ContextManager,
        method_ctx: &Context,
        _obj: &Obj,
    ) -> Context {
        mgr.truncate(method_ctx, self.k.saturating_sub(1))
    }
}

/// k-type sensitivity: like object sensitivity, but contexts record the
/// class declaring the receiver's allocated type.
#[derive(Clone, Copy, Debug)]
pub struct KTypeSelector {
    pub k: usize,
}

fn type_of(obj: &Obj) -> ClassId {
    obj.typ()
        .and_then(|t| t.dispatch_class())
        .unwrap_or_else(|| crate::middle_end::lang::class_id(OBJECT))
}

impl ContextSelector for KTypeSelector {
    fn select_context(
        &self,
        mgr: &mut ContextManager,
        caller_ctx: &Context,
        _site: &Site,
        _callee: &MethodRef,
    ) -> Context {
        mgr.truncate(caller_ctx, self.k)
    }

    fn select_context_with_recv(
        &self,
        mgr: &mut ContextManager,
        _caller_ctx: &Context,
        _site: &Site,
        recv_ctx: &Context,
        recv_obj: &Obj,
        _callee: &MethodRef,
    ) -> Context {
        mgr.append_limited(recv_ctx, ContextElem::Type(type_of(recv_obj)), self.k)
    }

    fn select_heap_context(
        &self,
        mgr: &mut ContextManager,
        method_ctx: &Context,
        _obj: &Obj,
    ) -> Context {
        mgr.truncate(method_ctx, self.k.saturating_sub(1))
    }
}

/// Parse a selector name as used on the command line: `ci`, `1-call`,
/// `2-call`, `1-obj`, `2-obj`, `2-type`, ...
pub fn by_name(name: &str) -> Option<Box<dyn ContextSelector>> {
    if name == "ci" {
        return Some(Box::new(CiSelector));
    }
    let (k, family) = name.split_once('-')?;
    let k: usize = k.parse().ok()?;
    if k == 0 {
        return None;
    }
    match family {
        "call" => Some(Box::new(KCallSelector { k })),
        "obj" => Some(Box::new(KObjSelector { k })),
        "type" => Some(Box::new(KTypeSelector { k })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::middle_end::lang::{class_id, method_ref, subsig, Site};

    fn site(i: usize) -> Site {
        Site::new(method_ref(class_id("A"), subsig("m", vec![])), i)
    }

    #[test]
    fn call_string_suffixes() {
        let mut mgr = ContextManager::new();
        let sel = KCallSelector { k: 2 };
        let callee = method_ref(class_id("A"), subsig("m", vec![]));

        let empty = mgr.empty();
        let c1 = sel.select_context(&mut mgr, &empty, &site(1), &callee);
        assert_eq!(c1.elems(), &[ContextElem::Site(site(1))]);
        let c2 = sel.select_context(&mut mgr, &c1, &site(2), &callee);
        let c3 = sel.select_context(&mut mgr, &c2, &site(3), &callee);
        // only the last two call sites survive.
        assert_eq!(
            c3.elems(),
            &[ContextElem::Site(site(2)), ContextElem::Site(site(3))]
        );
    }

    #[test]
    fn one_call_keeps_single_site() {
        let mut mgr = ContextManager::new();
        let sel = KCallSelector { k: 1 };
        let callee = method_ref(class_id("A"), subsig("m", vec![]));
        let empty = mgr.empty();
        let c1 = sel.select_context(&mut mgr, &empty, &site(1), &callee);
        let c2 = sel.select_context(&mut mgr, &c1, &site(2), &callee);
        assert_eq!(c2.elems(), &[ContextElem::Site(site(2))]);
        // 1-call heap contexts are empty.
        let h = sel.select_heap_context(&mut mgr, &c2, &taint_free_obj());
        assert!(h.is_empty());
    }

    fn taint_free_obj() -> crate::middle_end::pta::heap::Obj {
        let mut heap = crate::middle_end::pta::heap::HeapModel::new();
        heap.obj_at(site(9), crate::middle_end::lang::Type::Class(class_id("A")))
    }

    #[test]
    fn contexts_are_interned() {
        let mut mgr = ContextManager::new();
        let a = mgr.make(vec![ContextElem::Site(site(1))]);
        let b = mgr.make(vec![ContextElem::Site(site(1))]);
        assert_eq!(a, b);
    }
}
