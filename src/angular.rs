//! Wrap-around angular space: points on the unit circle.

use std::cmp::Ordering;
use std::f64::consts::{PI, TAU};

use crate::space::{Metric, Space, DEFAULT_TOLERANCE};

/// 1-D angular space over `f64` radians with wrap-around at `2π`.
///
/// An overflowing leaf splits the circle into `sectors` equal arcs anchored
/// at the circular mean of its points. Location codes are sector bitmasks;
/// a search code also sets the neighboring sector's bit when the point lies
/// within tolerance of an arc boundary, including across the `0 ≈ 2π` seam.
/// Unlike Euclidean orthants, arcs are bounded, so farthest searches get a
/// finite upper bound (at most `π`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularSpace {
    sectors: usize,
    tolerance: f64,
}

impl AngularSpace {
    pub fn new(sectors: usize) -> Self {
        Self::with_tolerance(sectors, DEFAULT_TOLERANCE)
    }

    /// # Panics
    ///
    /// Panics outside `2..=32` sectors (sector sets must fit a `u32`
    /// bitmask) or for a negative or non-finite tolerance.
    pub fn with_tolerance(sectors: usize, tolerance: f64) -> Self {
        assert!((2..=32).contains(&sectors), "sectors must be in 2..=32");
        assert!(tolerance >= 0.0 && tolerance.is_finite());
        Self { sectors, tolerance }
    }

    fn normalize(angle: f64) -> f64 {
        angle.rem_euclid(TAU)
    }

    /// Shorter-arc separation of two angles, in `[0, π]`.
    fn separation(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(TAU);
        d.min(TAU - d)
    }

    fn sector_width(&self) -> f64 {
        TAU / self.sectors as f64
    }

    fn sector_of(&self, anchor: f64, p: f64) -> usize {
        let rel = Self::normalize(p - anchor);
        ((rel / self.sector_width()) as usize).min(self.sectors - 1)
    }
}

impl Metric for AngularSpace {
    type Point = f64;

    fn is_finite(&self, p: &f64) -> bool {
        p.is_finite()
    }

    fn points_equal(&self, a: &f64, b: &f64) -> bool {
        Self::separation(*a, *b) <= self.tolerance
    }

    fn disambiguate(&self, a: &f64, b: &f64) -> Ordering {
        Self::normalize(*a).total_cmp(&Self::normalize(*b))
    }

    fn distance(&self, a: &f64, b: &f64) -> f64 {
        Self::separation(*a, *b)
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Space for AngularSpace {
    /// Anchor angle; sector `i` covers `[anchor + i·w, anchor + (i+1)·w)`
    /// with `w = 2π / sectors`.
    type Split = f64;

    fn arity(&self) -> usize {
        self.sectors
    }

    fn compute_split(&self, points: &[&f64]) -> f64 {
        // Circular mean; falls back to the first point when the resultant
        // vector cancels out.
        let (mut s, mut c) = (0.0, 0.0);
        for p in points {
            s += p.sin();
            c += p.cos();
        }
        if s.hypot(c) < 1e-9 {
            points.first().map_or(0.0, |p| Self::normalize(**p))
        } else {
            Self::normalize(s.atan2(c))
        }
    }

    fn insert_location(&self, split: &f64, p: &f64) -> u32 {
        1 << self.sector_of(*split, *p)
    }

    fn search_location(&self, split: &f64, p: &f64) -> u32 {
        let idx = self.sector_of(*split, *p);
        let mut code = 1u32 << idx;
        let w = self.sector_width();
        let rel = Self::normalize(p - split);
        if rel - idx as f64 * w <= self.tolerance {
            code |= 1 << ((idx + self.sectors - 1) % self.sectors);
        }
        if (idx as f64 + 1.0) * w - rel <= self.tolerance {
            code |= 1 << ((idx + 1) % self.sectors);
        }
        code
    }

    fn child_matches(&self, _split: &f64, child: usize, code: u32) -> bool {
        code & (1 << child) != 0
    }

    fn min_child_distance(&self, split: &f64, child: usize, p: &f64, _code: u32) -> f64 {
        let w = self.sector_width();
        let rel = Self::normalize(p - split);
        let start = child as f64 * w;
        let end = start + w;
        if rel >= start && rel <= end {
            0.0
        } else {
            Self::separation(rel, start).min(Self::separation(rel, end))
        }
    }

    fn max_child_distance(&self, split: &f64, child: usize, p: &f64, _code: u32) -> f64 {
        let w = self.sector_width();
        let rel = Self::normalize(p - split);
        let start = child as f64 * w;
        let end = start + w;
        let antipode = Self::normalize(rel + PI);
        if antipode >= start && antipode <= end {
            PI
        } else {
            Self::separation(rel, start).max(Self::separation(rel, end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FoldMap;

    #[test]
    fn test_separation_wraps() {
        let s = AngularSpace::new(4);
        assert!((s.distance(&0.1, &(TAU - 0.1)) - 0.2).abs() < 1e-12);
        assert!((s.distance(&0.0, &PI) - PI).abs() < 1e-12);
        assert!(s.points_equal(&0.0, &TAU));
    }

    #[test]
    fn test_sector_bounds() {
        let s = AngularSpace::new(4);
        let anchor = 0.0;
        // A point inside sector 0 has a zero bound there.
        let p = 0.5;
        let code = s.search_location(&anchor, &p);
        assert_eq!(s.min_child_distance(&anchor, 0, &p, code), 0.0);
        assert!(s.min_child_distance(&anchor, 2, &p, code) > 0.0);
        // The sector containing the antipode bounds at π.
        assert_eq!(s.max_child_distance(&anchor, 2, &p, code), PI);
    }

    #[test]
    fn test_nearest_across_the_seam() {
        let mut map: FoldMap<AngularSpace, &'static str> =
            FoldMap::with_capacity(AngularSpace::new(6), 2);
        map.put(0.05, "east").unwrap();
        map.put(TAU - 0.02, "just-west-of-east").unwrap();
        map.put(PI, "west").unwrap();
        map.put(PI / 2.0, "north").unwrap();
        map.put(3.0 * PI / 2.0, "south").unwrap();

        let nearest = map.nearest_entry(&0.01).unwrap().unwrap();
        assert_eq!(*nearest.value(), "just-west-of-east");
        let farthest = map.farthest_entry(&0.01).unwrap().unwrap();
        assert_eq!(*farthest.value(), "west");
    }

    #[test]
    fn test_ordered_sweep_on_the_circle() {
        let mut map: FoldMap<AngularSpace, usize> =
            FoldMap::with_capacity(AngularSpace::new(8), 3);
        let n = 40;
        for i in 0..n {
            map.put(i as f64 * TAU / n as f64, i).unwrap();
        }
        assert_eq!(map.len(), n);
        let seq: Vec<f64> = map
            .near_to_far(0.0)
            .unwrap()
            .map(|dv| dv.distance())
            .collect();
        assert_eq!(seq.len(), n);
        for pair in seq.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-9, "angular sweep went backwards");
        }
        // Two neighbors tie at each distance except the origin and antipode.
        assert!(seq[0] < 1e-12);
        assert!((seq[n - 1] - PI).abs() < 1e-9);
    }
}
