//! The dual-root map engine.
//!
//! Two independent bucket trees back one map. Inserts land in the `primary`
//! tree; the moment the primary's root leaf splits, the whole tree is demoted
//! to `secondary` and a fresh leaf takes its place. Every subsequent
//! insertion then also migrates one entry from the aging secondary back into
//! the primary ("point folding"), zig-zagging across the secondary's
//! top-level regions, so the new tree's low levels are seeded with a
//! geometrically diverse sample of old data rather than whatever order the
//! caller happened to insert in. The secondary is destroyed the instant it
//! drains.
//!
//! A monotonically increasing version counter tracks structural changes;
//! detached [`Cursor`]s compare against it on every call and fail fast on a
//! mismatch.

use std::fmt;
use std::mem;

use crate::node::{BucketNode, Entry, NodeKind};
use crate::query::DistanceOrdered;
use crate::space::Space;
use crate::FoldError;

/// Number of entries a leaf holds before it splits, unless overridden with
/// [`FoldMap::with_capacity`].
pub const DEFAULT_LEAF_CAPACITY: usize = 16;

/// A point-to-value map over a pluggable [`Space`], self-balancing through
/// dual-root point folding.
pub struct FoldMap<S: Space, V> {
    space: S,
    capacity: usize,
    primary: BucketNode<S, V>,
    secondary: Option<Box<BucketNode<S, V>>>,
    version: u64,
}

impl<S: Space, V> FoldMap<S, V> {
    /// Create an empty map with [`DEFAULT_LEAF_CAPACITY`].
    pub fn new(space: S) -> Self {
        Self::with_capacity(space, DEFAULT_LEAF_CAPACITY)
    }

    /// Create an empty map with a custom leaf capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2` or the space reports an arity below 2.
    pub fn with_capacity(space: S, capacity: usize) -> Self {
        assert!(capacity >= 2, "leaf capacity must be at least 2");
        assert!(space.arity() >= 2, "partition arity must be at least 2");
        Self {
            space,
            capacity,
            primary: BucketNode::leaf(),
            secondary: None,
            version: 0,
        }
    }

    /// The space this map partitions points with.
    pub fn space(&self) -> &S {
        &self.space
    }

    /// Number of stored entries. O(1): both roots cache their counts.
    pub fn len(&self) -> usize {
        self.primary.count + self.secondary.as_ref().map_or(0, |s| s.count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value` under `point`, or replace the value stored there.
    ///
    /// Returns the previous value when the point was already present.
    /// Replacing a value is not a structural change: the version is untouched
    /// and live cursors keep working.
    pub fn put(&mut self, point: S::Point, value: V) -> Result<Option<V>, FoldError> {
        if !self.space.is_finite(&point) {
            return Err(FoldError::NonFinitePoint);
        }
        if let Some(entry) = self.find_entry_mut(&point) {
            return Ok(Some(entry.set_value(value)));
        }
        self.primary
            .insert(&self.space, self.capacity, Entry::new(point, value));
        self.on_entry_added();
        Ok(None)
    }

    /// Look up the value stored under `point`.
    pub fn get(&self, point: &S::Point) -> Result<Option<&V>, FoldError> {
        Ok(self.find_entry(point)?.map(Entry::value))
    }

    /// Mutable access to the value stored under `point`.
    pub fn get_mut(&mut self, point: &S::Point) -> Result<Option<&mut V>, FoldError> {
        if !self.space.is_finite(point) {
            return Err(FoldError::NonFinitePoint);
        }
        Ok(self.find_entry_mut(point).map(Entry::value_mut))
    }

    pub fn contains_key(&self, point: &S::Point) -> Result<bool, FoldError> {
        Ok(self.find_entry(point)?.is_some())
    }

    /// Whether any entry holds `value`. A full linear scan over both roots;
    /// there is no value index.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|(_, v)| v == value)
    }

    /// Remove the entry stored under `point`, returning its value.
    pub fn remove(&mut self, point: &S::Point) -> Result<Option<V>, FoldError> {
        if !self.space.is_finite(point) {
            return Err(FoldError::NonFinitePoint);
        }
        Ok(self.remove_entry(point).map(Entry::into_value))
    }

    /// Drop every entry. Outstanding cursors observe a structural conflict.
    pub fn clear(&mut self) {
        self.primary = BucketNode::leaf();
        self.secondary = None;
        self.version += 1;
    }

    /// The entry nearest to `point`, exact ties broken deterministically.
    pub fn nearest_entry(
        &self,
        point: &S::Point,
    ) -> Result<Option<&Entry<S::Point, V>>, FoldError> {
        self.extreme_entry(point, false)
    }

    /// The entry farthest from `point`, exact ties broken deterministically.
    pub fn farthest_entry(
        &self,
        point: &S::Point,
    ) -> Result<Option<&Entry<S::Point, V>>, FoldError> {
        self.extreme_entry(point, true)
    }

    /// Lazy best-first sequence of all entries by increasing distance to
    /// `point`.
    pub fn near_to_far(&self, point: S::Point) -> Result<DistanceOrdered<'_, S, V>, FoldError> {
        if !self.space.is_finite(&point) {
            return Err(FoldError::NonFinitePoint);
        }
        Ok(DistanceOrdered::new(self, point, false))
    }

    /// Lazy best-first sequence of all entries by decreasing distance to
    /// `point`.
    pub fn far_to_near(&self, point: S::Point) -> Result<DistanceOrdered<'_, S, V>, FoldError> {
        if !self.space.is_finite(&point) {
            return Err(FoldError::NonFinitePoint);
        }
        Ok(DistanceOrdered::new(self, point, true))
    }

    /// Read-only iteration over every entry: the aging secondary tree first,
    /// then the primary, in left-to-right leaf order.
    pub fn iter(&self) -> Iter<'_, S, V> {
        let mut stack = Vec::new();
        stack.push(&self.primary);
        if let Some(secondary) = self.secondary.as_deref() {
            stack.push(secondary);
        }
        Iter {
            stack,
            current: None,
        }
    }

    /// Start a fail-fast cursor positioned before the first entry.
    pub fn cursor(&self) -> Cursor<S::Point> {
        Cursor {
            expected_version: self.version,
            index: 0,
            current: None,
        }
    }

    pub(crate) fn roots(&self) -> (&BucketNode<S, V>, Option<&BucketNode<S, V>>) {
        (&self.primary, self.secondary.as_deref())
    }

    fn find_entry(&self, point: &S::Point) -> Result<Option<&Entry<S::Point, V>>, FoldError> {
        if !self.space.is_finite(point) {
            return Err(FoldError::NonFinitePoint);
        }
        if let Some(entry) = self.primary.find(&self.space, point) {
            return Ok(Some(entry));
        }
        Ok(self
            .secondary
            .as_deref()
            .and_then(|s| s.find(&self.space, point)))
    }

    fn find_entry_mut(&mut self, point: &S::Point) -> Option<&mut Entry<S::Point, V>> {
        if let Some(entry) = self.primary.find_mut(&self.space, point) {
            return Some(entry);
        }
        self.secondary
            .as_deref_mut()
            .and_then(|s| s.find_mut(&self.space, point))
    }

    /// Post-insert bookkeeping: versioning, demotion, one folding step.
    fn on_entry_added(&mut self) {
        self.version += 1;
        if !self.primary.is_leaf() && self.secondary.is_none() {
            // The primary just split its root leaf: age it out and start a
            // rebalancing pass into a fresh tree.
            let aged = mem::replace(&mut self.primary, BucketNode::leaf());
            self.secondary = Some(Box::new(aged));
        }
        self.fold_step();
        if self.secondary.as_ref().is_some_and(|s| s.count == 0) {
            self.secondary = None;
        }
    }

    /// One point-folding migration step: pull a single entry out of the
    /// secondary tree and reinsert it into the primary.
    ///
    /// `version % arity` drives a zig-zag over the secondary's top-level
    /// child indices (arity-1, 0, arity-2, 1, ...), alternating between the
    /// high and low ends of the partition regardless of where insertions
    /// cluster.
    fn fold_step(&mut self) {
        let Some(secondary) = self.secondary.as_deref_mut() else {
            return;
        };
        let arity = self.space.arity();
        let offset = (self.version % arity as u64) as usize;
        let idx = if offset % 2 == 1 {
            offset / 2
        } else {
            arity - 1 - offset / 2
        };
        if let Some(entry) = secondary.remove_last_along_index_path(idx) {
            self.primary.insert(&self.space, self.capacity, entry);
        }
    }

    /// Removal shared by [`remove`](Self::remove) and cursor-driven removal.
    /// The point is assumed finite.
    fn remove_entry(&mut self, point: &S::Point) -> Option<Entry<S::Point, V>> {
        let mut removed = self.primary.remove(&self.space, self.capacity, point);
        if removed.is_none() {
            if let Some(secondary) = self.secondary.as_deref_mut() {
                removed = secondary.remove(&self.space, self.capacity, point);
            }
        }
        if removed.is_some() {
            self.version += 1;
            self.condense_roots();
        }
        removed
    }

    /// Root-level condensation. Roots have no parent, so the deferral rule
    /// resolves immediately: an internal root at or below the threshold
    /// collapses back into a leaf. A drained secondary is destroyed.
    fn condense_roots(&mut self) {
        let threshold = self.capacity / 2;
        if !self.primary.is_leaf() && self.primary.count <= threshold {
            self.primary.collapse_into_leaf();
        }
        if self.secondary.as_ref().is_some_and(|s| s.count == 0) {
            self.secondary = None;
        } else if let Some(secondary) = self.secondary.as_deref_mut() {
            if !secondary.is_leaf() && secondary.count <= threshold {
                secondary.collapse_into_leaf();
            }
        }
    }

    fn extreme_entry(
        &self,
        point: &S::Point,
        farthest: bool,
    ) -> Result<Option<&Entry<S::Point, V>>, FoldError> {
        if !self.space.is_finite(point) {
            return Err(FoldError::NonFinitePoint);
        }
        let mut best = self.primary.find_extreme(&self.space, point, farthest, None);
        if let Some(secondary) = self.secondary.as_deref() {
            best = secondary.find_extreme(&self.space, point, farthest, best);
        }
        Ok(best.map(|(entry, _)| entry))
    }

    /// Positional lookup across both roots in cursor order.
    fn entry_at(&self, index: usize) -> Option<&Entry<S::Point, V>> {
        if let Some(secondary) = self.secondary.as_deref() {
            if index < secondary.count {
                return secondary.entry_at(index);
            }
            return self.primary.entry_at(index - secondary.count);
        }
        self.primary.entry_at(index)
    }
}

impl<S: Space + Default, V> Default for FoldMap<S, V> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: Space + Clone, V: Clone> Clone for FoldMap<S, V>
where
    S::Split: Clone,
{
    fn clone(&self) -> Self {
        Self {
            space: self.space.clone(),
            capacity: self.capacity,
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            version: self.version,
        }
    }
}

impl<S: Space, V: fmt::Debug> fmt::Debug for FoldMap<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Read-only depth-first iterator over both roots.
pub struct Iter<'a, S: Space, V> {
    stack: Vec<&'a BucketNode<S, V>>,
    current: Option<std::slice::Iter<'a, Entry<S::Point, V>>>,
}

impl<'a, S: Space, V> Iterator for Iter<'a, S, V> {
    type Item = (&'a S::Point, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entries) = self.current.as_mut() {
                if let Some(entry) = entries.next() {
                    return Some((entry.point(), entry.value()));
                }
                self.current = None;
            }
            let node = self.stack.pop()?;
            match &node.kind {
                NodeKind::Leaf(entries) => self.current = Some(entries.iter()),
                NodeKind::Internal { children, .. } => {
                    for child in children.iter().rev().flatten() {
                        self.stack.push(child);
                    }
                }
            }
        }
    }
}

/// A detached fail-fast cursor over the map's entries.
///
/// The cursor holds no borrow; each call takes the map and first compares the
/// version snapshot taken at creation against the live counter. Any
/// structural change made outside the cursor (insert, remove, clear)
/// invalidates it. Removals made *through* the cursor re-synchronize the
/// snapshot instead.
pub struct Cursor<P> {
    expected_version: u64,
    index: usize,
    current: Option<P>,
}

impl<P> Cursor<P> {
    fn check<S: Space<Point = P>, V>(&self, map: &FoldMap<S, V>) -> Result<(), FoldError> {
        if self.expected_version != map.version {
            return Err(FoldError::StructuralConflict);
        }
        Ok(())
    }

    /// Advance to the next entry, or report exhaustion with `Ok(None)`.
    pub fn next<'m, S: Space<Point = P>, V>(
        &mut self,
        map: &'m FoldMap<S, V>,
    ) -> Result<Option<(&'m P, &'m V)>, FoldError>
    where
        P: Clone,
    {
        self.check(map)?;
        match map.entry_at(self.index) {
            Some(entry) => {
                self.index += 1;
                self.current = Some(entry.point().clone());
                Ok(Some((entry.point(), entry.value())))
            }
            None => {
                self.current = None;
                Ok(None)
            }
        }
    }

    /// Number of entries, version-checked like every other cursor call.
    pub fn size<S: Space<Point = P>, V>(&self, map: &FoldMap<S, V>) -> Result<usize, FoldError> {
        self.check(map)?;
        Ok(map.len())
    }

    /// Remove the entry last returned by [`next`](Self::next) and return its
    /// value.
    ///
    /// Fails with [`FoldError::NoCurrentEntry`] before the first `next`,
    /// after exhaustion, or when called twice for one element.
    pub fn remove<S: Space<Point = P>, V>(
        &mut self,
        map: &mut FoldMap<S, V>,
    ) -> Result<V, FoldError> {
        self.check(map)?;
        let point = self.current.take().ok_or(FoldError::NoCurrentEntry)?;
        let entry = map
            .remove_entry(&point)
            .expect("cursor entry vanished without a version bump");
        self.index -= 1;
        self.expected_version = map.version;
        Ok(entry.into_value())
    }
}

#[cfg(test)]
impl<S: Space, V> FoldMap<S, V> {
    /// Structural invariant check used by the test suites.
    pub(crate) fn validate(&self) {
        fn check<S: Space, V>(node: &BucketNode<S, V>, capacity: usize) -> usize {
            match &node.kind {
                NodeKind::Leaf(entries) => {
                    assert!(entries.len() <= capacity, "leaf over capacity");
                    assert_eq!(node.count, entries.len(), "leaf count mismatch");
                    entries.len()
                }
                NodeKind::Internal { children, .. } => {
                    let mut total = 0;
                    let mut present = 0;
                    for child in children.iter().flatten() {
                        assert!(child.count >= 1, "present child must hold entries");
                        present += 1;
                        total += check(child, capacity);
                    }
                    assert!(present >= 1, "internal node with no children");
                    assert_eq!(node.count, total, "internal count mismatch");
                    total
                }
            }
        }

        let mut total = check(&self.primary, self.capacity);
        if let Some(secondary) = self.secondary.as_deref() {
            assert!(secondary.count > 0, "drained secondary must be destroyed");
            total += check(secondary, self.capacity);
        }
        assert_eq!(total, self.len(), "cached size drifted");
    }

    pub(crate) fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub(crate) fn secondary_len(&self) -> usize {
        self.secondary.as_ref().map_or(0, |s| s.count)
    }

    pub(crate) fn primary_is_leaf(&self) -> bool {
        self.primary.is_leaf()
    }
}
