//! Bucket nodes: the recursive unit of the partition tree.
//!
//! A node is either a *leaf* holding a bounded list of entries or an
//! *internal* node holding a fixed-arity array of optional children and the
//! split state the strategy computed when the leaf overflowed. Every node
//! caches the entry count of its subtree; counts are maintained incrementally
//! on the way back up from each mutation and rebuilt by traversal only when a
//! subtree condenses back into a leaf.

use std::cmp::Ordering;
use std::mem;

use smallvec::SmallVec;

use crate::space::Space;

/// An owned `(point, value)` pair stored in a leaf.
///
/// The point is immutable once stored; the value can be replaced in place
/// without disturbing the entry's identity in the tree.
#[derive(Debug, Clone)]
pub struct Entry<P, V> {
    point: P,
    value: V,
}

impl<P, V> Entry<P, V> {
    pub(crate) fn new(point: P, value: V) -> Self {
        Self { point, value }
    }

    /// The point this entry is stored under.
    pub fn point(&self) -> &P {
        &self.point
    }

    /// The stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Mutable access to the stored value.
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Replace the value in place, returning the previous one.
    pub fn set_value(&mut self, value: V) -> V {
        mem::replace(&mut self.value, value)
    }

    /// Consume the entry, keeping only its value.
    pub fn into_value(self) -> V {
        self.value
    }
}

pub(crate) struct BucketNode<S: Space, V> {
    /// Entries reachable in this subtree.
    pub(crate) count: usize,
    pub(crate) kind: NodeKind<S, V>,
}

pub(crate) enum NodeKind<S: Space, V> {
    Leaf(Vec<Entry<S::Point, V>>),
    Internal {
        split: S::Split,
        children: Vec<Option<Box<BucketNode<S, V>>>>,
    },
}

impl<S: Space, V> BucketNode<S, V> {
    pub(crate) fn leaf() -> Self {
        Self {
            count: 0,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Insert `entry` into this subtree. No duplicate-key check happens at
    /// this level; callers pre-check with [`find`](Self::find).
    pub(crate) fn insert(&mut self, space: &S, capacity: usize, entry: Entry<S::Point, V>) {
        let overflowing = matches!(&self.kind, NodeKind::Leaf(entries) if entries.len() >= capacity);
        if overflowing {
            self.split_leaf(space, capacity);
        }
        match &mut self.kind {
            NodeKind::Leaf(entries) => {
                entries.push(entry);
                self.count += 1;
            }
            NodeKind::Internal { split, children } => {
                let code = space.insert_location(split, entry.point());
                let idx = (0..children.len())
                    .find(|&i| space.child_matches(split, i, code))
                    .expect("strict location code matched no child");
                let child = children[idx].get_or_insert_with(|| Box::new(Self::leaf()));
                child.insert(space, capacity, entry);
                self.count += 1;
            }
        }
    }

    /// Convert an at-capacity leaf into an internal node, redistributing its
    /// entries through the strategy's strict insert locations.
    fn split_leaf(&mut self, space: &S, capacity: usize) {
        let old = mem::replace(&mut self.kind, NodeKind::Leaf(Vec::new()));
        let NodeKind::Leaf(entries) = old else {
            unreachable!("split_leaf on an internal node");
        };
        let points: Vec<&S::Point> = entries.iter().map(|e| e.point()).collect();
        let split = space.compute_split(&points);
        let mut children = Vec::with_capacity(space.arity());
        children.resize_with(space.arity(), || None);
        self.kind = NodeKind::Internal { split, children };
        self.count = 0;
        for entry in entries {
            self.insert(space, capacity, entry);
        }
    }

    pub(crate) fn find(&self, space: &S, p: &S::Point) -> Option<&Entry<S::Point, V>> {
        match &self.kind {
            NodeKind::Leaf(entries) => entries.iter().find(|e| space.points_equal(e.point(), p)),
            NodeKind::Internal { split, children } => {
                let code = space.search_location(split, p);
                children.iter().enumerate().find_map(|(idx, child)| {
                    let child = child.as_deref()?;
                    if space.child_matches(split, idx, code) {
                        child.find(space, p)
                    } else {
                        None
                    }
                })
            }
        }
    }

    pub(crate) fn find_mut(&mut self, space: &S, p: &S::Point) -> Option<&mut Entry<S::Point, V>> {
        match &mut self.kind {
            NodeKind::Leaf(entries) => {
                entries.iter_mut().find(|e| space.points_equal(e.point(), p))
            }
            NodeKind::Internal { split, children } => {
                let code = space.search_location(split, p);
                children.iter_mut().enumerate().find_map(|(idx, child)| {
                    let child = child.as_deref_mut()?;
                    if space.child_matches(split, idx, code) {
                        child.find_mut(space, p)
                    } else {
                        None
                    }
                })
            }
        }
    }

    /// Remove the entry stored under `p`, updating counts on the unwind.
    ///
    /// Each internal node applies the deferred condensation rule to the child
    /// the removal went through: the child collapses back into a leaf only
    /// when its count has dropped to the threshold while this node's own
    /// count is still above it. Otherwise the collapse waits for a higher
    /// ancestor (or the engine, for a root).
    pub(crate) fn remove(
        &mut self,
        space: &S,
        capacity: usize,
        p: &S::Point,
    ) -> Option<Entry<S::Point, V>> {
        match &mut self.kind {
            NodeKind::Leaf(entries) => {
                let idx = entries.iter().position(|e| space.points_equal(e.point(), p))?;
                self.count -= 1;
                Some(entries.remove(idx))
            }
            NodeKind::Internal { split, children } => {
                let code = space.search_location(split, p);
                for idx in 0..children.len() {
                    if !space.child_matches(split, idx, code) {
                        continue;
                    }
                    let Some(child) = children[idx].as_deref_mut() else {
                        continue;
                    };
                    let Some(entry) = child.remove(space, capacity, p) else {
                        continue;
                    };
                    self.count -= 1;
                    let threshold = capacity / 2;
                    if child.count == 0 {
                        children[idx] = None;
                    } else if !child.is_leaf()
                        && child.count <= threshold
                        && self.count > threshold
                    {
                        child.collapse_into_leaf();
                    }
                    return Some(entry);
                }
                None
            }
        }
    }

    /// Remove one entry, preferring the subtree under `preferred`.
    ///
    /// A leaf surrenders its last-stored entry. An internal node probes
    /// children starting at `preferred` and walking outward, upward from the
    /// lower half of the arity and downward from the upper half, wrapping
    /// modulo arity, recursing with the same preferred index, and stopping at
    /// the first child that yields an entry. An emptied child is detached.
    /// Only the migration step calls this.
    pub(crate) fn remove_last_along_index_path(
        &mut self,
        preferred: usize,
    ) -> Option<Entry<S::Point, V>> {
        match &mut self.kind {
            NodeKind::Leaf(entries) => {
                let entry = entries.pop()?;
                self.count -= 1;
                Some(entry)
            }
            NodeKind::Internal { children, .. } => {
                let arity = children.len();
                let forward = preferred < arity / 2;
                for step in 0..arity {
                    let idx = if forward {
                        (preferred + step) % arity
                    } else {
                        (preferred + arity - step) % arity
                    };
                    let Some(child) = children[idx].as_deref_mut() else {
                        continue;
                    };
                    let Some(entry) = child.remove_last_along_index_path(preferred) else {
                        continue;
                    };
                    if child.count == 0 {
                        children[idx] = None;
                    }
                    self.count -= 1;
                    return Some(entry);
                }
                None
            }
        }
    }

    /// Branch-and-bound single-result search. `best` carries the incumbent
    /// from a previously searched tree so pruning spans both roots.
    ///
    /// An internal node sorts its present children by the cheap bound the
    /// strategy reports for each region and visits them in that order; once
    /// the incumbent is no worse than the next bound, no deeper point in any
    /// later child can beat it either, so the walk stops.
    pub(crate) fn find_extreme<'a>(
        &'a self,
        space: &S,
        query: &S::Point,
        farthest: bool,
        mut best: Option<(&'a Entry<S::Point, V>, f64)>,
    ) -> Option<(&'a Entry<S::Point, V>, f64)> {
        match &self.kind {
            NodeKind::Leaf(entries) => {
                for entry in entries {
                    let d = space.distance(query, entry.point());
                    let better = match best {
                        None => true,
                        Some((incumbent, bd)) => {
                            let improves = if farthest {
                                space.gt(d, bd)
                            } else {
                                space.lt(d, bd)
                            };
                            let worsens = if farthest {
                                space.lt(d, bd)
                            } else {
                                space.gt(d, bd)
                            };
                            improves
                                || (!worsens
                                    && space.disambiguate(entry.point(), incumbent.point())
                                        == Ordering::Less)
                        }
                    };
                    if better {
                        best = Some((entry, d));
                    }
                }
                best
            }
            NodeKind::Internal { split, children } => {
                let code = space.search_location(split, query);
                let mut order: SmallVec<[(f64, usize); 8]> = SmallVec::new();
                for (idx, child) in children.iter().enumerate() {
                    if child.is_none() {
                        continue;
                    }
                    let bound = if farthest {
                        space.max_child_distance(split, idx, query, code)
                    } else {
                        space.min_child_distance(split, idx, query, code)
                    };
                    order.push((bound, idx));
                }
                if farthest {
                    order.sort_by(|a, b| b.0.total_cmp(&a.0));
                } else {
                    order.sort_by(|a, b| a.0.total_cmp(&b.0));
                }
                for (bound, idx) in order {
                    if let Some((_, bd)) = best {
                        let still_beatable = if farthest {
                            space.gt(bound, bd)
                        } else {
                            space.lt(bound, bd)
                        };
                        if !still_beatable {
                            break;
                        }
                    }
                    let child = children[idx].as_deref().expect("present child");
                    best = child.find_extreme(space, query, farthest, best);
                }
                best
            }
        }
    }

    /// Positional lookup by left-to-right leaf order, using cached counts.
    pub(crate) fn entry_at(&self, index: usize) -> Option<&Entry<S::Point, V>> {
        if index >= self.count {
            return None;
        }
        match &self.kind {
            NodeKind::Leaf(entries) => entries.get(index),
            NodeKind::Internal { children, .. } => {
                let mut index = index;
                for child in children.iter().flatten() {
                    if index < child.count {
                        return child.entry_at(index);
                    }
                    index -= child.count;
                }
                None
            }
        }
    }

    /// Condense the whole subtree back into a single leaf. This is the one
    /// place where the entry set is rebuilt by full traversal.
    pub(crate) fn collapse_into_leaf(&mut self) {
        let old = mem::replace(&mut self.kind, NodeKind::Leaf(Vec::new()));
        let mut entries = Vec::with_capacity(self.count);
        Self::gather(old, &mut entries);
        debug_assert_eq!(entries.len(), self.count, "condensed count drifted");
        self.count = entries.len();
        self.kind = NodeKind::Leaf(entries);
    }

    fn gather(kind: NodeKind<S, V>, out: &mut Vec<Entry<S::Point, V>>) {
        match kind {
            NodeKind::Leaf(mut entries) => out.append(&mut entries),
            NodeKind::Internal { children, .. } => {
                for child in children.into_iter().flatten() {
                    Self::gather(child.kind, out);
                }
            }
        }
    }
}

impl<S: Space, V: Clone> Clone for BucketNode<S, V>
where
    S::Split: Clone,
{
    fn clone(&self) -> Self {
        Self {
            count: self.count,
            kind: self.kind.clone(),
        }
    }
}

impl<S: Space, V: Clone> Clone for NodeKind<S, V>
where
    S::Split: Clone,
{
    fn clone(&self) -> Self {
        match self {
            NodeKind::Leaf(entries) => NodeKind::Leaf(entries.clone()),
            NodeKind::Internal { split, children } => NodeKind::Internal {
                split: split.clone(),
                children: children.clone(),
            },
        }
    }
}
