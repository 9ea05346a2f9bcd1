//! Sequential-impulse constraint solver (spec §4.B steps 5-6).
//!
//! Two contact points on one pair are solved as a 2x2 block (using
//! [`Mat22`]'s closed-form inverse) rather than two independent scalar
//! constraints, since solving them independently fights itself when both
//! points are active at once. A single point falls back to the scalar
//! effective mass.

use crate::physics::body::RigidBody;
use crate::physics::math::{Mat22, Vec2};
use crate::physics::narrowphase::Manifold;

const BETA: f64 = 0.2;
const SLOP_PENETRATION: f64 = 0.05;
const SLOP_RESTITUTION: f64 = 1.0;
const MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum PhysicsError {
    SingularEffectiveMass,
    ConstraintBroke { body_a: usize, body_b: usize },
}

impl std::fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhysicsError::SingularEffectiveMass => write!(f, "singular effective mass matrix"),
            PhysicsError::ConstraintBroke { body_a, body_b } => {
                write!(f, "constraint between bodies {body_a} and {body_b} broke")
            }
        }
    }
}

impl std::error::Error for PhysicsError {}

struct ContactPoint {
    r_a: Vec2,
    r_b: Vec2,
    bias: f64,
    normal_impulse: f64,
    tangent_impulse: f64,
}

pub struct PairConstraint {
    pub body_a: usize,
    pub body_b: usize,
    normal: Vec2,
    tangent: Vec2,
    friction: f64,
    points: Vec<ContactPoint>,
}

/// The upper clamp on accumulated impulse past which a constraint is
/// considered broken and its `constraint_broke` callback should fire.
pub const IMPULSE_BREAK_THRESHOLD: f64 = 1.0e6;

pub fn build_constraints(
    pair: (usize, usize),
    manifold: &Manifold,
    body_a: &RigidBody,
    body_b: &RigidBody,
    dt: f64,
) -> PairConstraint {
    let normal = manifold.normal;
    let tangent = normal.perp();
    let restitution = (body_a.bounciness + body_b.bounciness) * 0.5;
    let friction = (body_a.friction + body_b.friction) * 0.5;

    let points = manifold
        .contacts
        .iter()
        .map(|contact| {
            let p = (contact.point_on_a + contact.point_on_b) * 0.5;
            let r_a = p - body_a.position;
            let r_b = p - body_b.position;

            let v_rel = relative_velocity(body_a, body_b, r_a, r_b);
            // Positive when the bodies are approaching along the normal.
            let approach_speed = -v_rel.dot(normal);

            let bias = -(BETA / dt) * (contact.depth - SLOP_PENETRATION).max(0.0)
                - restitution * (approach_speed - SLOP_RESTITUTION).max(0.0);

            ContactPoint { r_a, r_b, bias, normal_impulse: 0.0, tangent_impulse: 0.0 }
        })
        .collect();

    PairConstraint { body_a: pair.0, body_b: pair.1, normal, tangent, friction, points }
}

fn relative_velocity(a: &RigidBody, b: &RigidBody, r_a: Vec2, r_b: Vec2) -> Vec2 {
    (b.velocity + Vec2::cross_scalar(b.angular_velocity, r_b)) - (a.velocity + Vec2::cross_scalar(a.angular_velocity, r_a))
}

/// Runs the iterative solve for one tick's worth of contact pairs, applying
/// impulses directly to each body's velocity/angular velocity. Returns the
/// pairs whose accumulated normal impulse exceeded the break threshold.
pub fn solve(
    constraints: &mut [PairConstraint],
    bodies: &mut [RigidBody],
    dt: f64,
) -> Vec<(usize, usize)> {
    let threshold = 0.1 * 10f64.powf(-dt);
    let mut broken = Vec::new();

    for _ in 0..MAX_ITERATIONS {
        let mut max_delta = 0.0_f64;

        for constraint in constraints.iter_mut() {
            let PairConstraint { body_a: ia, body_b: ib, normal, tangent, friction, points } = constraint;
            let ia = *ia;
            let ib = *ib;

            if points.len() == 2 {
                max_delta = max_delta.max(solve_two_point_block(points, bodies, ia, ib, *normal));
            } else if let Some(point) = points.first_mut() {
                let (a, b) = borrow_pair(bodies, ia, ib);
                let v_rel = relative_velocity(a, b, point.r_a, point.r_b);
                let v_n = v_rel.dot(*normal);
                let eff_mass = {
                    let rn_a = point.r_a.cross(*normal);
                    let rn_b = point.r_b.cross(*normal);
                    let k = a.inv_mass()
                        + b.inv_mass()
                        + a.inv_moment_of_inertia() * rn_a * rn_a
                        + b.inv_moment_of_inertia() * rn_b * rn_b;
                    if k > 1e-12 { 1.0 / k } else { 0.0 }
                };
                let mut delta = eff_mass * (-v_n - point.bias);
                let new_impulse = (point.normal_impulse + delta).max(0.0);
                delta = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                apply_impulse(a, b, point.r_a, point.r_b, *normal * delta);
                max_delta = max_delta.max(delta.abs());
            }

            for point in points.iter_mut() {
                let (a, b) = borrow_pair(bodies, ia, ib);
                let v_rel = relative_velocity(a, b, point.r_a, point.r_b);
                let v_t = v_rel.dot(*tangent);
                let rt_a = point.r_a.cross(*tangent);
                let rt_b = point.r_b.cross(*tangent);
                let k_t = a.inv_mass() + b.inv_mass() + a.inv_moment_of_inertia() * rt_a * rt_a + b.inv_moment_of_inertia() * rt_b * rt_b;
                let eff_mass_t = if k_t > 1e-12 { 1.0 / k_t } else { 0.0 };

                let mut delta_t = eff_mass_t * -v_t;
                let max_friction = *friction * point.normal_impulse;
                let new_tangent = (point.tangent_impulse + delta_t).clamp(-max_friction, max_friction);
                delta_t = new_tangent - point.tangent_impulse;
                point.tangent_impulse = new_tangent;

                apply_impulse(a, b, point.r_a, point.r_b, *tangent * delta_t);
                max_delta = max_delta.max(delta_t.abs());
            }

            if points.iter().any(|p| p.normal_impulse.abs() > IMPULSE_BREAK_THRESHOLD) {
                broken.push((ia, ib));
            }
        }

        if max_delta < threshold {
            break;
        }
    }

    broken
}

fn solve_two_point_block(points: &mut [ContactPoint], bodies: &mut [RigidBody], ia: usize, ib: usize, normal: Vec2) -> f64 {
    let (a, b) = borrow_pair(bodies, ia, ib);

    let rn1_a = points[0].r_a.cross(normal);
    let rn1_b = points[0].r_b.cross(normal);
    let rn2_a = points[1].r_a.cross(normal);
    let rn2_b = points[1].r_b.cross(normal);

    let k11 = a.inv_mass() + b.inv_mass() + a.inv_moment_of_inertia() * rn1_a * rn1_a + b.inv_moment_of_inertia() * rn1_b * rn1_b;
    let k22 = a.inv_mass() + b.inv_mass() + a.inv_moment_of_inertia() * rn2_a * rn2_a + b.inv_moment_of_inertia() * rn2_b * rn2_b;
    let k12 = a.inv_mass() + b.inv_mass() + a.inv_moment_of_inertia() * rn1_a * rn2_a + b.inv_moment_of_inertia() * rn1_b * rn2_b;

    let k = Mat22::new(k11, k12, k12, k22);
    let Some(k_inv) = k.inverse() else {
        return solve_two_point_independently(points, a, b, normal);
    };

    let v1 = relative_velocity(a, b, points[0].r_a, points[0].r_b).dot(normal);
    let v2 = relative_velocity(a, b, points[1].r_a, points[1].r_b).dot(normal);

    let rhs = Vec2::new(-v1 - points[0].bias, -v2 - points[1].bias);
    let old_impulse = Vec2::new(points[0].normal_impulse, points[1].normal_impulse);
    let delta_unclamped = k_inv.mul_vec(rhs);
    let new_impulse_raw = old_impulse + delta_unclamped;
    let new_impulse = Vec2::new(new_impulse_raw.x.max(0.0), new_impulse_raw.y.max(0.0));
    let delta = new_impulse - old_impulse;

    points[0].normal_impulse = new_impulse.x;
    points[1].normal_impulse = new_impulse.y;

    apply_impulse(a, b, points[0].r_a, points[0].r_b, normal * delta.x);
    apply_impulse(a, b, points[1].r_a, points[1].r_b, normal * delta.y);

    delta.x.abs().max(delta.y.abs())
}

fn solve_two_point_independently(points: &mut [ContactPoint], a: &mut RigidBody, b: &mut RigidBody, normal: Vec2) -> f64 {
    let mut max_delta = 0.0;
    for point in points.iter_mut() {
        let v_rel = relative_velocity(a, b, point.r_a, point.r_b);
        let v_n = v_rel.dot(normal);
        let rn_a = point.r_a.cross(normal);
        let rn_b = point.r_b.cross(normal);
        let k = a.inv_mass() + b.inv_mass() + a.inv_moment_of_inertia() * rn_a * rn_a + b.inv_moment_of_inertia() * rn_b * rn_b;
        let eff_mass = if k > 1e-12 { 1.0 / k } else { 0.0 };
        let mut delta = eff_mass * (-v_n - point.bias);
        let new_impulse = (point.normal_impulse + delta).max(0.0);
        delta = new_impulse - point.normal_impulse;
        point.normal_impulse = new_impulse;
        apply_impulse(a, b, point.r_a, point.r_b, normal * delta);
        max_delta = max_delta.max(delta.abs());
    }
    max_delta
}

fn apply_impulse(a: &mut RigidBody, b: &mut RigidBody, r_a: Vec2, r_b: Vec2, impulse: Vec2) {
    a.velocity = a.velocity - impulse * a.inv_mass();
    a.angular_velocity -= a.inv_moment_of_inertia() * r_a.cross(impulse);
    b.velocity = b.velocity + impulse * b.inv_mass();
    b.angular_velocity += b.inv_moment_of_inertia() * r_b.cross(impulse);
}

fn borrow_pair(bodies: &mut [RigidBody], ia: usize, ib: usize) -> (&mut RigidBody, &mut RigidBody) {
    assert_ne!(ia, ib, "a body cannot collide with itself");
    if ia < ib {
        let (left, right) = bodies.split_at_mut(ib);
        (&mut left[ia], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(ia);
        (&mut right[0], &mut left[ib])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_exits_within_iteration_cap_for_resting_contact() {
        let mut ground = RigidBody::new_static();
        let mut ball = RigidBody::new(1.0, 1.0);
        ball.position = Vec2::new(0.0, 1.0);

        let manifold = Manifold {
            normal: Vec2::new(0.0, 1.0),
            contacts: vec![crate::physics::narrowphase::Contact {
                point_on_a: Vec2::new(0.0, 0.0),
                point_on_b: Vec2::new(0.0, 0.0),
                depth: 0.01,
            }],
        };
        let mut constraints = vec![build_constraints((0, 1), &manifold, &ground, &ball, 1.0 / 60.0)];
        let mut bodies = vec![ground, ball];
        let broken = solve(&mut constraints, &mut bodies, 1.0 / 60.0);
        assert!(broken.is_empty());
    }

    #[test]
    fn static_body_never_receives_impulse_velocity() {
        let mut ground = RigidBody::new_static();
        let mut ball = RigidBody::new(1.0, 1.0);
        ball.position = Vec2::new(0.0, 0.5);
        ball.velocity = Vec2::new(0.0, -10.0);

        let manifold = Manifold {
            normal: Vec2::new(0.0, 1.0),
            contacts: vec![crate::physics::narrowphase::Contact {
                point_on_a: Vec2::new(0.0, 0.0),
                point_on_b: Vec2::new(0.0, 0.0),
                depth: 0.01,
            }],
        };
        let mut constraints = vec![build_constraints((0, 1), &manifold, &ground, &ball, 1.0 / 60.0)];
        let mut bodies = vec![ground, ball];
        solve(&mut constraints, &mut bodies, 1.0 / 60.0);
        assert_eq!(bodies[0].velocity, Vec2::ZERO);
    }
}
