//! Collision shapes: convex polygons and circles, per spec §3/§4.B.
//!
//! Each shape caches its world-space position/rotation and, for polygons,
//! its rotated corners and edge normals, refreshed once per step from the
//! owning body rather than recomputed per narrow-phase pair.

use crate::physics::math::Vec2;

#[derive(Debug, Clone)]
pub enum ShapeGeometry {
    /// Ordered corners, counter-clockwise, in body-local space. Edges are
    /// implicit: corner[i] -> corner[i+1 % n].
    Polygon { local_corners: Vec<Vec2> },
    Circle { radius: f64 },
}

#[derive(Debug, Clone)]
pub struct CollisionShape {
    pub geometry: ShapeGeometry,
    /// World-space cache, refreshed by `sync_to_body` once per step.
    world_position: Vec2,
    world_rotation: f64,
    world_corners: Vec<Vec2>,
    edge_normals: Vec<Vec2>,
}

impl CollisionShape {
    pub fn polygon(local_corners: Vec<Vec2>) -> Self {
        assert!(local_corners.len() >= 3, "a polygon needs at least 3 corners");
        Self {
            geometry: ShapeGeometry::Polygon { local_corners },
            world_position: Vec2::ZERO,
            world_rotation: 0.0,
            world_corners: Vec::new(),
            edge_normals: Vec::new(),
        }
    }

    pub fn circle(radius: f64) -> Self {
        Self {
            geometry: ShapeGeometry::Circle { radius },
            world_position: Vec2::ZERO,
            world_rotation: 0.0,
            world_corners: Vec::new(),
            edge_normals: Vec::new(),
        }
    }

    pub fn world_position(&self) -> Vec2 {
        self.world_position
    }

    pub fn world_rotation(&self) -> f64 {
        self.world_rotation
    }

    /// Recomputes the world-space cache from the owning body's pose. Must be
    /// called once per step before broad/narrow phase read this shape.
    pub fn sync_to_body(&mut self, body_position: Vec2, body_rotation: f64) {
        self.world_position = body_position;
        self.world_rotation = body_rotation;

        if let ShapeGeometry::Polygon { local_corners } = &self.geometry {
            self.world_corners = local_corners
                .iter()
                .map(|&c| body_position + c.rotated(body_rotation))
                .collect();

            let n = self.world_corners.len();
            self.edge_normals = (0..n)
                .map(|i| {
                    let a = self.world_corners[i];
                    let b = self.world_corners[(i + 1) % n];
                    (b - a).perp().normalized()
                })
                .collect();
        }
    }

    pub fn world_corners(&self) -> &[Vec2] {
        &self.world_corners
    }

    pub fn edge_normals(&self) -> &[Vec2] {
        &self.edge_normals
    }

    pub fn radius(&self) -> Option<f64> {
        match self.geometry {
            ShapeGeometry::Circle { radius } => Some(radius),
            ShapeGeometry::Polygon { .. } => None,
        }
    }

    /// Axis-aligned bounding box in world space, used by the broad phase.
    pub fn aabb(&self) -> Aabb {
        match &self.geometry {
            ShapeGeometry::Circle { radius } => Aabb {
                min: Vec2::new(self.world_position.x - radius, self.world_position.y - radius),
                max: Vec2::new(self.world_position.x + radius, self.world_position.y + radius),
            },
            ShapeGeometry::Polygon { .. } => {
                let mut min = Vec2::new(f64::MAX, f64::MAX);
                let mut max = Vec2::new(f64::MIN, f64::MIN);
                for c in &self.world_corners {
                    min.x = min.x.min(c.x);
                    min.y = min.y.min(c.y);
                    max.x = max.x.max(c.x);
                    max.y = max.y.max(c.y);
                }
                Aabb { min, max }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_caches_world_corners_and_normals() {
        let mut square = CollisionShape::polygon(vec![
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ]);
        square.sync_to_body(Vec2::new(5.0, 0.0), 0.0);
        assert_eq!(square.world_corners().len(), 4);
        assert_eq!(square.edge_normals().len(), 4);
        assert!((square.world_corners()[0].x - 4.0).abs() < 1e-9);
    }

    #[test]
    fn circle_aabb_is_centered_box() {
        let mut circle = CollisionShape::circle(2.0);
        circle.sync_to_body(Vec2::new(0.0, 0.0), 0.0);
        let aabb = circle.aabb();
        assert!((aabb.min.x + 2.0).abs() < 1e-9);
        assert!((aabb.max.x - 2.0).abs() < 1e-9);
    }
}
