//! Lazy distance-ordered queries.
//!
//! Two priority queues drive a single pull-based sequence: one holds
//! unexpanded nodes keyed by the cheap bound distance from the query point to
//! their region, the other holds resolved entries keyed by exact distance. A
//! queued entry is emitted only once no unexpanded node could still contain a
//! better one, so entries come out in distance order without ever
//! materializing or sorting the whole map. Both roots are seeded into the
//! same node queue and compete on equal terms.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::map::FoldMap;
use crate::node::{BucketNode, Entry, NodeKind};
use crate::space::Space;

/// A value paired with its distance to a query point.
#[derive(Debug, Clone, Copy)]
pub struct DistancedValue<T> {
    value: T,
    distance: f64,
}

impl<T> DistancedValue<T> {
    fn new(value: T, distance: f64) -> Self {
        Self { value, distance }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Max-heap cell. For near-to-far traversal the key is the negated distance
/// so the smallest distance surfaces first.
struct HeapCell<T> {
    key: f64,
    item: DistancedValue<T>,
}

impl<T> PartialEq for HeapCell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key.total_cmp(&other.key) == Ordering::Equal
    }
}

impl<T> Eq for HeapCell<T> {}

impl<T> PartialOrd for HeapCell<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapCell<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.total_cmp(&other.key)
    }
}

/// Lazy best-first iterator over all entries, ordered by distance to a fixed
/// query point. Created by [`FoldMap::near_to_far`] and
/// [`FoldMap::far_to_near`]; holds its own queues and borrows the map for
/// its whole lifetime.
pub struct DistanceOrdered<'a, S: Space, V> {
    space: &'a S,
    query: S::Point,
    farthest: bool,
    nodes: BinaryHeap<HeapCell<&'a BucketNode<S, V>>>,
    entries: BinaryHeap<HeapCell<&'a Entry<S::Point, V>>>,
}

impl<'a, S: Space, V> DistanceOrdered<'a, S, V> {
    pub(crate) fn new(map: &'a FoldMap<S, V>, query: S::Point, farthest: bool) -> Self {
        let mut this = Self {
            space: map.space(),
            query,
            farthest,
            nodes: BinaryHeap::new(),
            entries: BinaryHeap::new(),
        };
        let seed = if farthest { f64::INFINITY } else { 0.0 };
        let (primary, secondary) = map.roots();
        this.push_node(primary, seed);
        if let Some(secondary) = secondary {
            this.push_node(secondary, seed);
        }
        this
    }

    fn key(&self, distance: f64) -> f64 {
        if self.farthest {
            distance
        } else {
            -distance
        }
    }

    fn push_node(&mut self, node: &'a BucketNode<S, V>, bound: f64) {
        if node.count > 0 {
            self.nodes.push(HeapCell {
                key: self.key(bound),
                item: DistancedValue::new(node, bound),
            });
        }
    }

    /// Expand nodes until the best queued entry is guaranteed correct
    /// relative to every unexpanded region, then emit it.
    fn queue_next(&mut self) -> Option<DistancedValue<&'a Entry<S::Point, V>>> {
        while let Some(top_node) = self.nodes.peek() {
            let settled = match self.entries.peek() {
                None => false,
                Some(top_entry) => {
                    let e = top_entry.item.distance;
                    let n = top_node.item.distance;
                    if self.farthest {
                        self.space.gt(e, n)
                    } else {
                        self.space.lt(e, n)
                    }
                }
            };
            if settled {
                break;
            }
            let node = self.nodes.pop().expect("peeked node").item.into_value();
            match &node.kind {
                NodeKind::Leaf(entries) => {
                    for entry in entries {
                        let d = self.space.distance(&self.query, entry.point());
                        self.entries.push(HeapCell {
                            key: self.key(d),
                            item: DistancedValue::new(entry, d),
                        });
                    }
                }
                NodeKind::Internal { split, children } => {
                    let code = self.space.search_location(split, &self.query);
                    for (idx, child) in children.iter().enumerate() {
                        let Some(child) = child.as_deref() else {
                            continue;
                        };
                        let bound = if self.farthest {
                            self.space.max_child_distance(split, idx, &self.query, code)
                        } else {
                            self.space.min_child_distance(split, idx, &self.query, code)
                        };
                        self.push_node(child, bound);
                    }
                }
            }
        }
        self.entries.pop().map(|cell| cell.item)
    }
}

impl<'a, S: Space, V> Iterator for DistanceOrdered<'a, S, V> {
    type Item = DistancedValue<&'a Entry<S::Point, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue_next()
    }
}

#[cfg(test)]
mod tests {
    use crate::euclid::EuclideanSpace;
    use crate::space::Metric;
    use crate::FoldMap;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn populated(n: usize, seed: u64) -> (FoldMap<EuclideanSpace<2>, usize>, Vec<[f64; 2]>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut map = FoldMap::with_capacity(EuclideanSpace::new(), 4);
        let mut points = Vec::new();
        while points.len() < n {
            let p = [rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0)];
            if map.put(p, points.len()).unwrap().is_none() {
                points.push(p);
            }
        }
        (map, points)
    }

    #[test]
    fn test_empty_map_yields_nothing() {
        let map: FoldMap<EuclideanSpace<2>, usize> = FoldMap::new(EuclideanSpace::new());
        assert_eq!(map.near_to_far([0.0, 0.0]).unwrap().count(), 0);
        assert_eq!(map.far_to_near([0.0, 0.0]).unwrap().count(), 0);
    }

    #[test]
    fn test_near_to_far_matches_brute_force() {
        let (map, points) = populated(200, 11);
        let space = EuclideanSpace::<2>::new();
        let q = [3.0, -4.0];

        let mut expected: Vec<f64> = points.iter().map(|p| space.distance(&q, p)).collect();
        expected.sort_by(|a, b| a.total_cmp(b));

        let got: Vec<f64> = map.near_to_far(q).unwrap().map(|dv| dv.distance()).collect();
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(&expected) {
            assert!((g - e).abs() < 1e-9, "order diverged: {g} vs {e}");
        }
    }

    #[test]
    fn test_far_to_near_is_reverse_ordered() {
        let (map, points) = populated(150, 23);
        let q = [0.0, 0.0];
        let got: Vec<f64> = map.far_to_near(q).unwrap().map(|dv| dv.distance()).collect();
        assert_eq!(got.len(), points.len());
        for pair in got.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "far-to-near went forwards");
        }
    }

    #[test]
    fn test_sequences_cover_the_full_entry_set() {
        let (map, _) = populated(120, 31);
        let q = [1.0, 1.0];
        let mut near: Vec<usize> = map.near_to_far(q).unwrap().map(|dv| *dv.value().value()).collect();
        let mut far: Vec<usize> = map.far_to_near(q).unwrap().map(|dv| *dv.value().value()).collect();
        near.sort_unstable();
        far.sort_unstable();
        let expected: Vec<usize> = (0..120).collect();
        assert_eq!(near, expected);
        assert_eq!(far, expected);
    }

    #[test]
    fn test_interleaves_both_roots() {
        // Small capacity keeps a secondary root alive while we query.
        let (map, _) = populated(7, 5);
        assert!(map.has_secondary(), "scenario needs a live secondary");
        let q = [0.0, 0.0];
        let got: Vec<f64> = map.near_to_far(q).unwrap().map(|dv| dv.distance()).collect();
        assert_eq!(got.len(), 7);
        for pair in got.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9);
        }
    }
}
