//! Collaborator traits for concrete point spaces.
//!
//! The tree itself is geometry-agnostic. Everything space-specific is routed
//! through a single stateless object implementing [`Metric`] (point type,
//! distance, precision semantics) and [`Space`] (partition strategy: how an
//! overflowing leaf splits, how points map to children, how child regions
//! bound distances). The engine shares that object by reference across the
//! whole tree.

use std::cmp::Ordering;
use std::fmt::Debug;

/// Comparison tolerance used by the shipped spaces.
pub(crate) const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Point type, distance function, and tolerant floating-point semantics.
///
/// Distances and split bounds come out of chained floating-point arithmetic,
/// so every ordering decision made during search goes through the tolerant
/// comparators below rather than raw `<`/`>`. `disambiguate` must be a total
/// order on points; it is consulted only to break exact distance ties so that
/// query results are deterministic.
pub trait Metric {
    type Point: Clone + Debug;

    /// Whether every coordinate of `p` is finite. Non-finite points are
    /// rejected before they can enter the tree.
    fn is_finite(&self, p: &Self::Point) -> bool;

    /// Tolerant point equality, used for exact-key lookup and removal.
    fn points_equal(&self, a: &Self::Point, b: &Self::Point) -> bool;

    /// Total, deterministic order used only to break exact distance ties.
    fn disambiguate(&self, a: &Self::Point, b: &Self::Point) -> Ordering;

    /// Distance between two points.
    fn distance(&self, a: &Self::Point, b: &Self::Point) -> f64;

    /// Tolerance applied by the default comparators.
    fn tolerance(&self) -> f64;

    /// `a` is less than `b` beyond tolerance.
    fn lt(&self, a: f64, b: f64) -> bool {
        a < b - self.tolerance()
    }

    /// `a` is less than or within tolerance of `b`.
    fn lte(&self, a: f64, b: f64) -> bool {
        a <= b + self.tolerance()
    }

    /// `a` is greater than `b` beyond tolerance.
    fn gt(&self, a: f64, b: f64) -> bool {
        a > b + self.tolerance()
    }
}

/// Partition strategy: the per-space decisions the tree delegates when a
/// leaf splits and when children are selected or pruned.
///
/// Location codes are opaque to the tree; only the strategy interprets them.
/// An *insert* code is strict and matches exactly one child. A *search* code
/// may be non-strict: a point lying within tolerance of a split boundary
/// matches every child touching that boundary.
pub trait Space: Metric {
    /// Split state stored in internal nodes.
    type Split;

    /// Fixed fan-out of internal nodes. At least 2.
    fn arity(&self) -> usize;

    /// Split state for a leaf about to overflow, computed from its points.
    fn compute_split(&self, points: &[&Self::Point]) -> Self::Split;

    /// Strict location code for `p`.
    fn insert_location(&self, split: &Self::Split, p: &Self::Point) -> u32;

    /// Non-strict location code for lookups.
    fn search_location(&self, split: &Self::Split, p: &Self::Point) -> u32;

    /// Whether `child` is covered by `code`.
    fn child_matches(&self, split: &Self::Split, child: usize, code: u32) -> bool;

    /// Lower bound on the distance from `p` to any point in `child`'s region.
    fn min_child_distance(
        &self,
        split: &Self::Split,
        child: usize,
        p: &Self::Point,
        code: u32,
    ) -> f64;

    /// Upper bound on the distance from `p` to any point in `child`'s
    /// region, or `f64::INFINITY` when the region is unbounded.
    fn max_child_distance(
        &self,
        split: &Self::Split,
        child: usize,
        p: &Self::Point,
        code: u32,
    ) -> f64;
}
