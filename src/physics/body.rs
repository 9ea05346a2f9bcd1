//! Rigid body state: mass properties, per-tick force accumulation, and the
//! scratch velocity the solver operates on (spec §4.B step 1).

use crate::physics::math::Vec2;
use crate::physics::shape::CollisionShape;

#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: Vec2,
    pub rotation: f64,
    pub velocity: Vec2,
    pub angular_velocity: f64,

    mass: f64,
    inv_mass: f64,
    moment_of_inertia: f64,
    inv_moment_of_inertia: f64,

    force: Vec2,
    torque: f64,

    pub bounciness: f64,
    pub friction: f64,
    pub is_static: bool,

    pub shapes: Vec<CollisionShape>,
    pub collision_layers: Vec<u32>,
}

impl RigidBody {
    pub fn new(mass: f64, moment_of_inertia: f64) -> Self {
        let mut body = Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            moment_of_inertia: 0.0,
            inv_moment_of_inertia: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            bounciness: 0.0,
            friction: 0.0,
            is_static: false,
            shapes: Vec::new(),
            collision_layers: Vec::new(),
        };
        body.set_mass(mass);
        body.set_moment_of_inertia(moment_of_inertia);
        body
    }

    pub fn new_static() -> Self {
        let mut body = RigidBody::new(0.0, 0.0);
        body.is_static = true;
        body
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
        self.inv_mass = if self.is_static || mass <= 0.0 { 0.0 } else { 1.0 / mass };
    }

    pub fn set_moment_of_inertia(&mut self, moment: f64) {
        self.moment_of_inertia = moment;
        self.inv_moment_of_inertia = if self.is_static || moment <= 0.0 { 0.0 } else { 1.0 / moment };
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn moment_of_inertia(&self) -> f64 {
        self.moment_of_inertia
    }

    pub fn inv_mass(&self) -> f64 {
        if self.is_static { 0.0 } else { self.inv_mass }
    }

    pub fn inv_moment_of_inertia(&self) -> f64 {
        if self.is_static { 0.0 } else { self.inv_moment_of_inertia }
    }

    pub fn apply_force(&mut self, force: Vec2) {
        if !self.is_static {
            self.force = self.force + force;
        }
    }

    pub fn apply_torque(&mut self, torque: f64) {
        if !self.is_static {
            self.torque += torque;
        }
    }

    /// Step 1 of `World::step`: integrate velocities from accumulated force
    /// and torque, then reset the accumulators. Static bodies are pinned.
    pub fn integrate_velocity(&mut self, dt: f64) {
        if self.is_static {
            self.velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
            return;
        }
        self.velocity = self.velocity + self.force * (self.inv_mass * dt);
        self.angular_velocity += self.torque * self.inv_moment_of_inertia * dt;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Step 7: integrate position from the post-solve velocity, guarded
    /// against denormal drift for near-zero velocities.
    pub fn integrate_position(&mut self, dt: f64) {
        if self.is_static {
            return;
        }
        const DRIFT_THRESHOLD: f64 = 1e-5;
        if self.velocity.length_squared().sqrt() >= DRIFT_THRESHOLD {
            self.position = self.position + self.velocity * dt;
        }
        if self.angular_velocity.abs() >= DRIFT_THRESHOLD {
            self.rotation += self.angular_velocity * dt;
        }
        for shape in &mut self.shapes {
            shape.sync_to_body(self.position, self.rotation);
        }
    }

    /// Refreshes cached world-space shape geometry without moving the body;
    /// called once before broad phase so shapes reflect any position set
    /// directly by game logic during this tick.
    pub fn sync_shapes(&mut self) {
        for shape in &mut self.shapes {
            shape.sync_to_body(self.position, self.rotation);
        }
    }

    pub fn on_layer(&self, layer: u32) -> bool {
        self.collision_layers.contains(&layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_body_has_zero_inverse_mass() {
        let body = RigidBody::new_static();
        assert_eq!(body.inv_mass(), 0.0);
        assert_eq!(body.inv_moment_of_inertia(), 0.0);
    }

    #[test]
    fn integrate_velocity_applies_force_then_resets() {
        let mut body = RigidBody::new(2.0, 1.0);
        body.apply_force(Vec2::new(4.0, 0.0));
        body.integrate_velocity(1.0);
        assert!((body.velocity.x - 2.0).abs() < 1e-9);
        body.integrate_velocity(1.0);
        assert!((body.velocity.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn static_body_ignores_applied_force() {
        let mut body = RigidBody::new_static();
        body.apply_force(Vec2::new(100.0, 0.0));
        body.integrate_velocity(1.0);
        assert_eq!(body.velocity, Vec2::ZERO);
    }

    #[test]
    fn integrate_position_skips_denormal_drift() {
        let mut body = RigidBody::new(1.0, 1.0);
        body.velocity = Vec2::new(1e-9, 0.0);
        let start = body.position;
        body.integrate_position(1.0);
        assert_eq!(body.position, start);
    }
}
