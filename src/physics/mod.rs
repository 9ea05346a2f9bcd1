//! Rigid-body physics core: broad phase, narrow phase, and the
//! sequential-impulse solver driving one authoritative `step(dt)` (spec §4.B).

pub mod body;
pub mod broadphase;
pub mod math;
pub mod narrowphase;
pub mod shape;
pub mod solver;

pub use body::RigidBody;
pub use math::{Mat22, Vec2};
pub use shape::{Aabb, CollisionShape};
pub use solver::PhysicsError;

use broadphase::CandidatePair;
use narrowphase::Manifold;
use solver::PairConstraint;

/// Fired after the solver settles, before position integration, mirroring
/// the contact-callback ordering in spec §4.B.
pub trait CollisionCallbacks {
    fn on_collision(&mut self, _body_a: usize, _body_b: usize, _manifold: &Manifold) {}
    fn constraint_created(&mut self, _body_a: usize, _body_b: usize) {}
    fn constraint_removed(&mut self, _body_a: usize, _body_b: usize) {}
    fn constraint_broke(&mut self, _body_a: usize, _body_b: usize) {}
}

/// A no-op callback sink for callers that don't need collision hooks.
pub struct NoCallbacks;
impl CollisionCallbacks for NoCallbacks {}

/// Owns a flat list of rigid bodies and advances them through one authoritative
/// physics step. Bodies are addressed by their index in `bodies`; callers
/// that need stable ids across additions/removals layer that over this (see
/// `object::Handler`, which keeps physics body indices keyed by object id).
#[derive(Default)]
pub struct World {
    pub bodies: Vec<RigidBody>,
}

impl World {
    pub fn new() -> Self {
        Self { bodies: Vec::new() }
    }

    pub fn add_body(&mut self, body: RigidBody) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn remove_body(&mut self, index: usize) -> RigidBody {
        self.bodies.remove(index)
    }

    /// Runs the seven steps of spec §4.B in order. Returns the set of pairs
    /// whose constraints broke this step, after the relevant callbacks have
    /// already fired on `callbacks`.
    pub fn step(&mut self, dt: f64, callbacks: &mut impl CollisionCallbacks) -> Vec<(usize, usize)> {
        // 1. Integrate velocities, reset accumulators.
        for body in &mut self.bodies {
            body.integrate_velocity(dt);
            body.sync_shapes();
        }

        // 2. Broad phase.
        let candidates: Vec<CandidatePair> = broadphase::find_candidate_pairs(&self.bodies);

        // 3 & 4. Narrow phase + manifold construction.
        let mut manifolds: Vec<((usize, usize), Manifold)> = Vec::new();
        for (a, b) in candidates {
            let (shape_a, shape_b) = match self.first_colliding_shape_pair(a, b) {
                Some(pair) => pair,
                None => continue,
            };
            if let Some(manifold) = narrowphase::collide(shape_a, shape_b) {
                callbacks.on_collision(a, b, &manifold);
                manifolds.push(((a, b), manifold));
            }
        }

        // 5. Build contact constraints.
        let mut constraints: Vec<PairConstraint> = Vec::with_capacity(manifolds.len());
        for ((a, b), manifold) in &manifolds {
            let (body_a, body_b) = (&self.bodies[*a], &self.bodies[*b]);
            constraints.push(solver::build_constraints((*a, *b), manifold, body_a, body_b, dt));
            callbacks.constraint_created(*a, *b);
        }

        // 6. Sequential-impulse solve.
        let broken = solver::solve(&mut constraints, &mut self.bodies, dt);
        for (a, b) in &broken {
            callbacks.constraint_broke(*a, *b);
        }
        for ((a, b), _) in &manifolds {
            if !broken.contains(&(*a, *b)) {
                callbacks.constraint_removed(*a, *b);
            }
        }

        // 7. Integrate positions.
        for body in &mut self.bodies {
            body.integrate_position(dt);
        }

        broken
    }

    /// Narrow phase only needs the first shape pair whose AABBs actually
    /// overlap; bodies with multiple shapes on the same candidate pair are
    /// rare in this engine's scope (see spec §4.B step 2's de-duplication).
    fn first_colliding_shape_pair(&self, a: usize, b: usize) -> Option<(&CollisionShape, &CollisionShape)> {
        let body_a = &self.bodies[a];
        let body_b = &self.bodies[b];
        for shape_a in &body_a.shapes {
            for shape_b in &body_b.shapes {
                if shape_a.aabb().overlaps(&shape_b.aabb()) {
                    return Some((shape_a, shape_b));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_body_is_invariant_across_a_step() {
        let mut world = World::new();
        let mut ground = RigidBody::new_static();
        ground.shapes.push(CollisionShape::polygon(vec![
            Vec2::new(-10.0, -1.0),
            Vec2::new(10.0, -1.0),
            Vec2::new(10.0, 1.0),
            Vec2::new(-10.0, 1.0),
        ]));
        ground.collision_layers.push(0);
        world.add_body(ground);

        let before = world.bodies[0].position;
        world.step(1.0 / 60.0, &mut NoCallbacks);
        assert_eq!(world.bodies[0].velocity, Vec2::ZERO);
        assert_eq!(world.bodies[0].angular_velocity, 0.0);
        assert_eq!(world.bodies[0].position, before);
    }

    #[test]
    fn falling_circle_lands_on_static_ground() {
        let mut world = World::new();

        let mut ground = RigidBody::new_static();
        let mut ground_shape = CollisionShape::polygon(vec![
            Vec2::new(-10.0, -1.0),
            Vec2::new(10.0, -1.0),
            Vec2::new(10.0, 1.0),
            Vec2::new(-10.0, 1.0),
        ]);
        ground_shape.sync_to_body(Vec2::ZERO, 0.0);
        ground.shapes.push(ground_shape);
        ground.collision_layers.push(0);
        world.add_body(ground);

        let mut ball = RigidBody::new(1.0, 1.0);
        ball.position = Vec2::new(0.0, 1.5);
        ball.velocity = Vec2::new(0.0, -10.0);
        let mut ball_shape = CollisionShape::circle(1.0);
        ball_shape.sync_to_body(ball.position, 0.0);
        ball.shapes.push(ball_shape);
        ball.collision_layers.push(0);
        world.add_body(ball);

        for _ in 0..120 {
            world.step(1.0 / 60.0, &mut NoCallbacks);
        }

        assert!(world.bodies[1].velocity.y.abs() < 5.0);
        assert!(world.bodies[1].position.y >= 1.0 - 0.2);
    }
}
