//! The allocation-site heap model.

use std::collections::BTreeMap as Map;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use crate::middle_end::lang::{Site, Type};

/// An abstract heap object.  Regular objects are identified by their
/// allocation site; taint analysis issues marker objects identified by the
/// source call site and a taint label.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Obj(Rc<ObjData>);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ObjData {
    Alloc { site: Site, typ: Type },
    Taint { source: Site, label: String },
}

impl Obj {
    /// The declared type of the allocation; taint markers carry none.
    pub fn typ(&self) -> Option<&Type> {
        match &*self.0 {
            ObjData::Alloc { typ, .. } => Some(typ),
            ObjData::Taint { .. } => None,
        }
    }

    pub fn is_taint(&self) -> bool {
        matches!(&*self.0, ObjData::Taint { .. })
    }

    pub fn alloc_site(&self) -> Option<&Site> {
        match &*self.0 {
            ObjData::Alloc { site, .. } => Some(site),
            ObjData::Taint { .. } => None,
        }
    }

    /// For taint markers: the call site of the source that issued it.
    pub fn taint_source(&self) -> Option<(&Site, &str)> {
        match &*self.0 {
            ObjData::Taint { source, label } => Some((source, label)),
            ObjData::Alloc { .. } => None,
        }
    }
}

impl Display for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ObjData::Alloc { site, typ } => write!(f, "new {typ}/{site}"),
            ObjData::Taint { source, label } => write!(f, "taint[{label}]/{source}"),
        }
    }
}

/// Interns one abstract object per allocation site.
#[derive(Clone, Debug, Default)]
pub struct HeapModel {
    objs: Map<Site, Obj>,
}

impl HeapModel {
    pub fn new() -> HeapModel {
        HeapModel::default()
    }

    pub fn obj_at(&mut self, site: Site, typ: Type) -> Obj {
        self.objs
            .entry(site.clone())
            .or_insert_with(|| Obj(Rc::new(ObjData::Alloc { site, typ })))
            .clone()
    }
}

/// Interns taint marker objects per (source site, label) pair.
#[derive(Clone, Debug, Default)]
pub struct TaintObjManager {
    objs: Map<(Site, String), Obj>,
}

impl TaintObjManager {
    pub fn make_taint(&mut self, source: Site, label: &str) -> Obj {
        self.objs
            .entry((source.clone(), label.to_string()))
            .or_insert_with(|| {
                Obj(Rc::new(ObjData::Taint {
                    source,
                    label: label.to_string(),
                }))
            })
            .clone()
    }
}
