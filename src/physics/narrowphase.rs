//! Narrow phase: exact SAT collision test plus contact manifold clipping
//! (spec §4.B steps 3-4).
//!
//! Circle shapes are not tested via a literal synthetic triangle; instead
//! the closest point on the other shape's boundary to the circle center is
//! found directly, which is the same contact (tangent to the circle at the
//! point closest to the other shape's nearest feature) the synthetic
//! triangle construction would have produced, without building one.

use crate::physics::math::Vec2;
use crate::physics::shape::{CollisionShape, ShapeGeometry};

#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub point_on_a: Vec2,
    pub point_on_b: Vec2,
    pub depth: f64,
}

#[derive(Debug, Clone)]
pub struct Manifold {
    /// Points from shape A toward shape B.
    pub normal: Vec2,
    pub contacts: Vec<Contact>,
}

pub fn collide(a: &CollisionShape, b: &CollisionShape) -> Option<Manifold> {
    match (&a.geometry, &b.geometry) {
        (ShapeGeometry::Circle { radius: ra }, ShapeGeometry::Circle { radius: rb }) => {
            circle_vs_circle(a.world_position(), *ra, b.world_position(), *rb)
        }
        (ShapeGeometry::Polygon { .. }, ShapeGeometry::Circle { radius }) => {
            polygon_vs_circle(a, b.world_position(), *radius)
        }
        (ShapeGeometry::Circle { radius }, ShapeGeometry::Polygon { .. }) => {
            polygon_vs_circle(b, a.world_position(), *radius).map(|m| Manifold {
                normal: -m.normal,
                contacts: m
                    .contacts
                    .into_iter()
                    .map(|c| Contact { point_on_a: c.point_on_b, point_on_b: c.point_on_a, depth: c.depth })
                    .collect(),
            })
        }
        (ShapeGeometry::Polygon { .. }, ShapeGeometry::Polygon { .. }) => polygon_vs_polygon(a, b),
    }
}

fn circle_vs_circle(pos_a: Vec2, radius_a: f64, pos_b: Vec2, radius_b: f64) -> Option<Manifold> {
    let delta = pos_b - pos_a;
    let dist = delta.length();
    let depth = radius_a + radius_b - dist;
    if depth <= 0.0 {
        return None;
    }
    let normal = if dist > 1e-9 { delta / dist } else { Vec2::new(1.0, 0.0) };
    let point_on_a = pos_a + normal * radius_a;
    let point_on_b = pos_b - normal * radius_b;
    Some(Manifold { normal, contacts: vec![Contact { point_on_a, point_on_b, depth }] })
}

fn polygon_vs_circle(polygon: &CollisionShape, circle_center: Vec2, radius: f64) -> Option<Manifold> {
    let corners = polygon.world_corners();
    let mut best_point = corners[0];
    let mut best_dist_sq = f64::MAX;

    for i in 0..corners.len() {
        let a = corners[i];
        let b = corners[(i + 1) % corners.len()];
        let edge = b - a;
        let len_sq = edge.length_squared();
        let t = if len_sq > 1e-12 { ((circle_center - a).dot(edge) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
        let closest = a + edge * t;
        let dist_sq = (circle_center - closest).length_squared();
        if dist_sq < best_dist_sq {
            best_dist_sq = dist_sq;
            best_point = closest;
        }
    }

    let dist = best_dist_sq.sqrt();
    let depth = radius - dist;
    if depth <= 0.0 {
        return None;
    }

    let center_is_inside = point_in_polygon(corners, circle_center);
    let normal = if center_is_inside {
        (best_point - circle_center).normalized()
    } else {
        (circle_center - best_point).normalized()
    };
    let normal = if normal == Vec2::ZERO { Vec2::new(0.0, 1.0) } else { normal };

    let point_on_a = best_point;
    let point_on_b = circle_center - normal * radius;
    Some(Manifold { normal, contacts: vec![Contact { point_on_a, point_on_b, depth }] })
}

fn point_in_polygon(corners: &[Vec2], point: Vec2) -> bool {
    let n = corners.len();
    (0..n).all(|i| {
        let a = corners[i];
        let b = corners[(i + 1) % n];
        (b - a).cross(point - a) >= 0.0
    })
}

/// Finds the axis (edge normal) of least penetration by scanning one
/// shape's edges against the other's support point. Returns `None` if a
/// separating axis is found (shapes are disjoint).
fn find_min_penetration_axis(reference: &CollisionShape, incident: &CollisionShape) -> Option<(usize, f64)> {
    let ref_corners = reference.world_corners();
    let ref_normals = reference.edge_normals();
    let inc_corners = incident.world_corners();

    let mut best_edge = 0;
    let mut best_overlap = f64::MAX;

    for (i, &normal) in ref_normals.iter().enumerate() {
        let edge_value = ref_corners[i].dot(normal);
        let min_support = inc_corners.iter().map(|c| c.dot(normal)).fold(f64::MAX, f64::min);
        let overlap = edge_value - min_support;
        if overlap < 0.0 {
            return None;
        }
        if overlap < best_overlap {
            best_overlap = overlap;
            best_edge = i;
        }
    }
    Some((best_edge, best_overlap))
}

fn polygon_vs_polygon(a: &CollisionShape, b: &CollisionShape) -> Option<Manifold> {
    let (edge_a, overlap_a) = find_min_penetration_axis(a, b)?;
    let (edge_b, overlap_b) = find_min_penetration_axis(b, a)?;

    let (reference, incident, ref_edge, flip) =
        if overlap_a <= overlap_b { (a, b, edge_a, false) } else { (b, a, edge_b, true) };

    let ref_normals = reference.edge_normals();
    let ref_normal = ref_normals[ref_edge];

    let inc_normals = incident.edge_normals();
    let incident_edge = inc_normals
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.dot(ref_normal).partial_cmp(&y.dot(ref_normal)).unwrap())
        .map(|(i, _)| i)?;

    let inc_corners = incident.world_corners();
    let n = inc_corners.len();
    let mut points = vec![inc_corners[incident_edge], inc_corners[(incident_edge + 1) % n]];

    let ref_corners = reference.world_corners();
    let m = ref_corners.len();
    let v1 = ref_corners[ref_edge];
    let v2 = ref_corners[(ref_edge + 1) % m];
    let tangent = (v2 - v1).normalized();

    points = clip_segment(points, -tangent, -tangent.dot(v1))?;
    points = clip_segment(points, tangent, tangent.dot(v2))?;

    let mut contacts = Vec::new();
    for p in points {
        let depth = ref_normal.dot(p - v1);
        if depth <= 0.0 {
            let (point_on_a, point_on_b) =
                if flip { (p, p - ref_normal * depth) } else { (p - ref_normal * depth, p) };
            contacts.push(Contact { point_on_a, point_on_b, depth: -depth });
        }
    }

    if contacts.is_empty() {
        return None;
    }

    let normal = if flip { -ref_normal } else { ref_normal };
    Some(Manifold { normal, contacts })
}

/// Clips a two-point segment against the half-plane `dot(p, normal) <= offset`.
fn clip_segment(points: Vec<Vec2>, normal: Vec2, offset: f64) -> Option<Vec<Vec2>> {
    let mut out = Vec::with_capacity(2);
    let d0 = normal.dot(points[0]) - offset;
    let d1 = normal.dot(points[1]) - offset;

    if d0 <= 0.0 {
        out.push(points[0]);
    }
    if d1 <= 0.0 {
        out.push(points[1]);
    }
    if d0 * d1 < 0.0 {
        let t = d0 / (d0 - d1);
        out.push(points[0] + (points[1] - points[0]) * t);
    }
    if out.len() < 2 { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(pos: Vec2) -> CollisionShape {
        let mut shape = CollisionShape::polygon(vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]);
        shape.sync_to_body(pos, 0.0);
        shape
    }

    fn circle(pos: Vec2, radius: f64) -> CollisionShape {
        let mut shape = CollisionShape::circle(radius);
        shape.sync_to_body(pos, 0.0);
        shape
    }

    #[test]
    fn disjoint_boxes_do_not_collide() {
        assert!(collide(&unit_box(Vec2::new(0.0, 0.0)), &unit_box(Vec2::new(3.0, 0.0))).is_none());
    }

    #[test]
    fn overlapping_boxes_collide_symmetrically() {
        let a = unit_box(Vec2::new(0.0, 0.0));
        let b = unit_box(Vec2::new(0.8, 0.0));
        let ab = collide(&a, &b).unwrap();
        let ba = collide(&b, &a).unwrap();
        assert!((ab.normal.length() - 1.0).abs() < 1e-9);
        assert!((ab.normal.x + ba.normal.x).abs() < 1e-9);
        assert!((ab.normal.y + ba.normal.y).abs() < 1e-9);
    }

    #[test]
    fn touching_circles_collide() {
        let a = circle(Vec2::new(0.0, 0.0), 1.0);
        let b = circle(Vec2::new(1.5, 0.0), 1.0);
        let m = collide(&a, &b).unwrap();
        assert!((m.depth_for_test() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn circle_resting_on_ground_polygon() {
        let ground = unit_box(Vec2::new(0.0, -0.5));
        let ball = circle(Vec2::new(0.0, 0.4), 0.5);
        let m = collide(&ground, &ball).unwrap();
        assert!(m.normal.y > 0.0);
    }

    impl Manifold {
        fn depth_for_test(&self) -> f64 {
            self.contacts[0].depth
        }
    }
}
