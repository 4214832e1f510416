//! # foldmap
//!
//! A generic multidimensional point map backed by a bucket/partition tree
//! that stays balanced under adversarial insertion order.
//!
//! The balancing scheme is *point folding*: the map owns two independent
//! trees. Inserts fill the `primary` tree until its root leaf splits; the
//! split tree is then demoted to `secondary` and a fresh primary starts
//! over, while every further insertion also migrates one entry from the
//! secondary back into the primary, sampled zig-zag across the secondary's
//! partition regions. New trees therefore grow out of a geometrically
//! diverse sample of old data instead of whatever order the caller inserted
//! in.
//!
//! Geometry is pluggable: a [`Space`] supplies the point type, tolerant
//! precision semantics, and the partition strategy. [`EuclideanSpace`] and
//! [`AngularSpace`] ship with the crate.
//!
//! ## Example
//!
//! ```rust
//! use foldmap::{EuclideanSpace, FoldMap};
//!
//! let mut map = FoldMap::new(EuclideanSpace::<2>::new());
//! map.put([1.0, 2.0], "a").unwrap();
//! map.put([4.0, -1.5], "b").unwrap();
//!
//! assert_eq!(map.get(&[1.0, 2.0]).unwrap(), Some(&"a"));
//!
//! let nearest = map.nearest_entry(&[0.0, 0.0]).unwrap().unwrap();
//! assert_eq!(*nearest.value(), "a");
//!
//! for hit in map.near_to_far([0.0, 0.0]).unwrap() {
//!     println!("{:?} at {}", hit.value().point(), hit.distance());
//! }
//! ```

#![forbid(unsafe_code)]

mod angular;
mod euclid;
mod map;
mod node;
mod query;
mod space;

pub use angular::AngularSpace;
pub use euclid::EuclideanSpace;
pub use map::{Cursor, FoldMap, Iter, DEFAULT_LEAF_CAPACITY};
pub use node::Entry;
pub use query::{DistanceOrdered, DistancedValue};
pub use space::{Metric, Space};

use thiserror::Error;

/// Errors reported by [`FoldMap`] operations.
///
/// Lookup misses and empty query results are `Ok(None)`, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FoldError {
    /// A point with a non-finite coordinate was passed to an operation that
    /// stores or searches points. The operation had no effect.
    #[error("point has a non-finite coordinate")]
    NonFinitePoint,
    /// A cursor was used after the map was structurally modified behind its
    /// back.
    #[error("map was structurally modified while a cursor was active")]
    StructuralConflict,
    /// A cursor removal was attempted with no current entry: before the
    /// first `next`, after exhaustion, or twice for one element.
    #[error("cursor has no current entry")]
    NoCurrentEntry,
}

#[cfg(test)]
mod proptests;
