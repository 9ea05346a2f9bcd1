//! Broad phase: per-layer axis sweep over shape AABBs (spec §4.B step 2).
//!
//! A strict full sweep-and-prune on each axis, every tick, per Design Notes
//! §9 ("a reimplementation may substitute a grid or BVH for scale; keep the
//! test property that no overlap is missed"). This crate keeps the sweep —
//! the bodies in scope here are in the hundreds, not the tens of thousands.

use std::collections::BTreeSet;

use crate::physics::body::RigidBody;

/// A candidate pair of body indices, `a < b`, that may be in contact this
/// step. Deduplicated across shapes and collision layers.
pub type CandidatePair = (usize, usize);

#[derive(Clone, Copy)]
struct Endpoint {
    value: f64,
    body: usize,
    is_open: bool,
}

fn sweep_axis(endpoints: &mut [Endpoint]) -> BTreeSet<CandidatePair> {
    endpoints.sort_by(|a, b| a.value.partial_cmp(&b.value).unwrap());
    let mut open: Vec<usize> = Vec::new();
    let mut pairs = BTreeSet::new();
    for ep in endpoints.iter() {
        if ep.is_open {
            for &other in &open {
                if other == ep.body {
                    // Same body's own shapes overlapping each other isn't a
                    // collision candidate (spec §3 allows a body to own
                    // multiple shapes).
                    continue;
                }
                pairs.insert(if other < ep.body { (other, ep.body) } else { (ep.body, other) });
            }
            open.push(ep.body);
        } else {
            open.retain(|&b| b != ep.body);
        }
    }
    pairs
}

/// Collects candidate body-index pairs whose shapes' AABBs overlap on both
/// axes, restricted to bodies sharing at least one collision layer, skipping
/// pairs where both bodies are static.
pub fn find_candidate_pairs(bodies: &[RigidBody]) -> Vec<CandidatePair> {
    let mut layers: BTreeSet<u32> = BTreeSet::new();
    for body in bodies {
        layers.extend(body.collision_layers.iter().copied());
    }

    let mut all_pairs: BTreeSet<CandidatePair> = BTreeSet::new();

    for layer in layers {
        let mut x_endpoints = Vec::new();
        let mut y_endpoints = Vec::new();

        for (idx, body) in bodies.iter().enumerate() {
            if !body.on_layer(layer) {
                continue;
            }
            for shape in &body.shapes {
                let aabb = shape.aabb();
                x_endpoints.push(Endpoint { value: aabb.min.x, body: idx, is_open: true });
                x_endpoints.push(Endpoint { value: aabb.max.x, body: idx, is_open: false });
                y_endpoints.push(Endpoint { value: aabb.min.y, body: idx, is_open: true });
                y_endpoints.push(Endpoint { value: aabb.max.y, body: idx, is_open: false });
            }
        }

        let x_pairs = sweep_axis(&mut x_endpoints);
        let y_pairs = sweep_axis(&mut y_endpoints);

        for pair in x_pairs.intersection(&y_pairs) {
            let (a, b) = *pair;
            if bodies[a].is_static && bodies[b].is_static {
                continue;
            }
            all_pairs.insert(*pair);
        }
    }

    all_pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::math::Vec2;
    use crate::physics::shape::CollisionShape;

    fn box_body(x: f64, layer: u32) -> RigidBody {
        let mut body = RigidBody::new(1.0, 1.0);
        body.position = Vec2::new(x, 0.0);
        let mut shape = CollisionShape::polygon(vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]);
        shape.sync_to_body(body.position, body.rotation);
        body.shapes.push(shape);
        body.collision_layers.push(layer);
        body
    }

    #[test]
    fn disjoint_bodies_produce_no_candidates() {
        let bodies = vec![box_body(0.0, 0), box_body(2.0, 0)];
        assert!(find_candidate_pairs(&bodies).is_empty());
    }

    #[test]
    fn overlapping_bodies_produce_one_candidate() {
        let bodies = vec![box_body(0.0, 0), box_body(0.9, 0)];
        assert_eq!(find_candidate_pairs(&bodies), vec![(0, 1)]);
    }

    #[test]
    fn both_static_pair_is_skipped() {
        let mut a = box_body(0.0, 0);
        let mut b = box_body(0.2, 0);
        a.is_static = true;
        b.is_static = true;
        assert!(find_candidate_pairs(&[a, b]).is_empty());
    }

    #[test]
    fn different_layers_do_not_collide() {
        let bodies = vec![box_body(0.0, 0), box_body(0.2, 1)];
        assert!(find_candidate_pairs(&bodies).is_empty());
    }

    #[test]
    fn hundred_disjoint_bodies_spaced_two_apart_yield_no_candidates() {
        let bodies: Vec<RigidBody> = (0..100).map(|i| box_body(i as f64 * 2.0, 0)).collect();
        assert!(find_candidate_pairs(&bodies).is_empty());
    }

    #[test]
    fn a_bodys_own_overlapping_shapes_never_self_pair() {
        let mut body = box_body(0.0, 0);
        let mut second_shape = CollisionShape::polygon(vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]);
        second_shape.sync_to_body(body.position, body.rotation);
        body.shapes.push(second_shape);

        assert!(find_candidate_pairs(&[body]).is_empty());
    }
}
