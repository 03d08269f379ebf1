//! Points-to sets: insertion-ordered sets of abstract heap objects, and the
//! solver worklist over them.

use std::collections::VecDeque;
use std::collections::{BTreeMap as Map, BTreeSet as Set};
use std::fmt::{self, Display, Formatter};

/// A monotone set of abstract objects.  Iteration follows insertion order,
/// which keeps worklist processing and result printing deterministic.
#[derive(Clone, Debug)]
pub struct PointsToSet<T: Ord + Clone> {
    order: Vec<T>,
    members: Set<T>,
}

impl<T: Ord + Clone> Default for PointsToSet<T> {
    fn default() -> Self {
        PointsToSet::new()
    }
}

impl<T: Ord + Clone> PointsToSet<T> {
    pub fn new() -> PointsToSet<T> {
        PointsToSet {
            order: vec![],
            members: Set::new(),
        }
    }

    pub fn singleton(obj: T) -> PointsToSet<T> {
        let mut s = PointsToSet::new();
        s.add(obj);
        s
    }

    // insert an object; returns whether the set grew.
    pub fn add(&mut self, obj: T) -> bool {
        if self.members.insert(obj.clone()) {
            self.order.push(obj);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, obj: &T) -> bool {
        self.members.contains(obj)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T: Ord + Clone> FromIterator<T> for PointsToSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut s = PointsToSet::new();
        for obj in iter {
            s.add(obj);
        }
        s
    }
}

impl<T: Ord + Clone + Display> Display for PointsToSet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, obj) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{obj}")?;
        }
        write!(f, "}}")
    }
}

/// The points-to worklist: entries for the same pointer collapse by merging
/// their pending deltas, so each pop sees one combined set.
#[derive(Clone, Debug)]
pub struct WorkList<P: Ord + Clone, T: Ord + Clone> {
    queue: VecDeque<P>,
    pending: Map<P, PointsToSet<T>>,
}

impl<P: Ord + Clone, T: Ord + Clone> Default for WorkList<P, T> {
    fn default() -> Self {
        WorkList {
            queue: VecDeque::new(),
            pending: Map::new(),
        }
    }
}

impl<P: Ord + Clone, T: Ord + Clone> WorkList<P, T> {
    pub fn new() -> Self {
        WorkList::default()
    }

    pub fn add(&mut self, pointer: P, pts: &PointsToSet<T>) {
        if pts.is_empty() {
            return;
        }
        let entry = self.pending.entry(pointer.clone()).or_default();
        if entry.is_empty() {
            self.queue.push_back(pointer);
        }
        for obj in pts.iter() {
            entry.add(obj.clone());
        }
    }

    pub fn add_obj(&mut self, pointer: P, obj: T) {
        self.add(pointer, &PointsToSet::singleton(obj));
    }

    pub fn pop(&mut self) -> Option<(P, PointsToSet<T>)> {
        let pointer = self.queue.pop_front()?;
        let pts = self.pending.remove(&pointer).unwrap_or_default();
        Some((pointer, pts))
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
