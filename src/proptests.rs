use proptest::prelude::*;

use crate::euclid::EuclideanSpace;
use crate::space::Metric;
use crate::FoldMap;

const CAPACITY: usize = 8;

type Map = FoldMap<EuclideanSpace<2>, u64>;
type Model = Vec<([f64; 2], u64)>;

fn new_map() -> Map {
    FoldMap::with_capacity(EuclideanSpace::new(), CAPACITY)
}

#[derive(Clone, Debug)]
enum Op {
    Put([f64; 2], u64),
    Remove([f64; 2]),
    Get([f64; 2]),
    Nearest([f64; 2]),
    Clear,
}

// A small lattice keeps collisions frequent enough to exercise the
// replace/remove paths while staying far apart relative to the tolerance.
fn point() -> impl Strategy<Value = [f64; 2]> + Clone {
    (-6i32..=6, -6i32..=6).prop_map(|(x, y)| [f64::from(x) * 0.5, f64::from(y) * 0.5])
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let p = point();
    let op = prop_oneof![
        45 => (p.clone(), any::<u64>()).prop_map(|(p, v)| Op::Put(p, v)),
        25 => p.clone().prop_map(Op::Remove),
        15 => p.clone().prop_map(Op::Get),
        13 => p.prop_map(Op::Nearest),
        2 => Just(Op::Clear),
    ];
    prop::collection::vec(op, 0..=400)
}

fn model_get(model: &Model, p: &[f64; 2]) -> Option<u64> {
    model.iter().find(|(q, _)| q == p).map(|(_, v)| *v)
}

proptest! {
    #[test]
    fn model_cross_check(ops in ops()) {
        let mut map = new_map();
        let mut model: Model = Vec::new();
        let space = EuclideanSpace::<2>::new();

        for op in ops {
            match op {
                Op::Put(p, v) => {
                    let expected = model
                        .iter_mut()
                        .find(|(q, _)| *q == p)
                        .map(|e| std::mem::replace(&mut e.1, v));
                    if expected.is_none() {
                        model.push((p, v));
                    }
                    prop_assert_eq!(map.put(p, v).unwrap(), expected);
                }
                Op::Remove(p) => {
                    let expected = model
                        .iter()
                        .position(|(q, _)| *q == p)
                        .map(|i| model.remove(i).1);
                    prop_assert_eq!(map.remove(&p).unwrap(), expected);
                }
                Op::Get(p) => {
                    prop_assert_eq!(map.get(&p).unwrap().copied(), model_get(&model, &p));
                    prop_assert_eq!(map.contains_key(&p).unwrap(), model_get(&model, &p).is_some());
                }
                Op::Nearest(p) => {
                    let got = map.nearest_entry(&p).unwrap();
                    let brute = model
                        .iter()
                        .map(|(q, _)| space.distance(&p, q))
                        .min_by(|a, b| a.total_cmp(b));
                    match (got, brute) {
                        (None, None) => {}
                        (Some(entry), Some(best)) => {
                            let d = space.distance(&p, entry.point());
                            prop_assert!((d - best).abs() < 1e-9, "nearest off: {} vs {}", d, best);
                        }
                        (got, brute) => {
                            prop_assert!(false, "presence mismatch: {:?} vs {:?}", got.is_some(), brute.is_some());
                        }
                    }
                }
                Op::Clear => {
                    map.clear();
                    model.clear();
                }
            }
            map.validate();
            prop_assert_eq!(map.len(), model.len());
        }
    }

    #[test]
    fn distance_order_laws(
        raw in prop::collection::vec(point(), 0..=120),
        q in point(),
    ) {
        let mut map = new_map();
        for (i, p) in raw.iter().enumerate() {
            map.put(*p, i as u64).unwrap();
        }
        map.validate();
        let space = EuclideanSpace::<2>::new();

        let near: Vec<([f64; 2], f64)> = map
            .near_to_far(q)
            .unwrap()
            .map(|dv| (*dv.value().point(), dv.distance()))
            .collect();
        let far: Vec<([f64; 2], f64)> = map
            .far_to_near(q)
            .unwrap()
            .map(|dv| (*dv.value().point(), dv.distance()))
            .collect();

        prop_assert_eq!(near.len(), map.len());
        prop_assert_eq!(far.len(), map.len());
        for pair in near.windows(2) {
            prop_assert!(pair[1].1 >= pair[0].1 - 1e-9, "near-to-far went backwards");
        }
        for pair in far.windows(2) {
            prop_assert!(pair[1].1 <= pair[0].1 + 1e-9, "far-to-near went forwards");
        }
        for (p, d) in near.iter().chain(&far) {
            prop_assert!((space.distance(&q, p) - d).abs() < 1e-12);
        }

        // Both sequences cover the exact entry set once each.
        let canonical = |mut v: Vec<([f64; 2], f64)>| {
            v.sort_by(|a, b| a.0[0].total_cmp(&b.0[0]).then(a.0[1].total_cmp(&b.0[1])));
            v.into_iter().map(|(p, _)| p).collect::<Vec<_>>()
        };
        let mut expected: Vec<[f64; 2]> = map.iter().map(|(p, _)| *p).collect();
        expected.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
        prop_assert_eq!(canonical(near), expected.clone());
        prop_assert_eq!(canonical(far), expected);
    }

    #[test]
    fn cursor_drains_the_map(raw in prop::collection::vec(point(), 0..=80)) {
        let mut map = new_map();
        for (i, p) in raw.iter().enumerate() {
            map.put(*p, i as u64).unwrap();
        }
        let total = map.len();
        let mut cursor = map.cursor();
        prop_assert_eq!(cursor.size(&map).unwrap(), total);
        let mut seen = 0;
        while cursor.next(&map).unwrap().is_some() {
            cursor.remove(&mut map).unwrap();
            seen += 1;
            map.validate();
        }
        prop_assert_eq!(seen, total);
        prop_assert!(map.is_empty());
    }
}
