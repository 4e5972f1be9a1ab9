//! Simulated sphere bodies and the per-tick physics world
//!
//! Every entity the client renders is backed by a `Body` in a `BodyRegistry`:
//! the local player, one shadow body per remote player, and any decorative
//! spheres. The registry is read and written only from inside the simulation
//! tick; network updates are applied as plain state writes before a tick runs.

use shared::{
    platform_positions, Vec3, BALL_MASS, BALL_RADIUS, GRAVITY, LINEAR_DAMPING, PLATFORM_SIZE,
    PLATFORM_TOP_Y,
};
use std::collections::HashMap;

/// Vertical slack when testing whether a sphere rests on a platform top face.
const SUPPORT_TOLERANCE: f32 = 0.1;

/// What a body stands for, so systems can tell the scoring-relevant player
/// spheres from purely cosmetic ones without inspecting geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Player,
    Decorative,
}

/// A physically simulated sphere.
///
/// Forces and impulses accumulate over a tick and are consumed by
/// `BodyRegistry::step`. All bodies share the same radius and mass.
#[derive(Debug, Clone)]
pub struct Body {
    pub id: u32,
    pub kind: BodyKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub radius: f32,
    pub mass: f32,
    pub spawn_position: Vec3,
    pub grounded: bool,
    pub accumulated_force: Vec3,
    pub accumulated_impulse: Vec3,
}

impl Body {
    pub fn new(id: u32, kind: BodyKind, spawn_position: Vec3) -> Self {
        Self {
            id,
            kind,
            position: spawn_position,
            velocity: Vec3::default(),
            angular_velocity: Vec3::default(),
            radius: BALL_RADIUS,
            mass: BALL_MASS,
            spawn_position,
            grounded: false,
            accumulated_force: Vec3::default(),
            accumulated_impulse: Vec3::default(),
        }
    }

    /// Queues a continuous force for the next integration step.
    pub fn apply_force(&mut self, force: Vec3) {
        self.accumulated_force = self.accumulated_force.add(&force);
    }

    /// Queues an instantaneous impulse for the next integration step.
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.accumulated_impulse = self.accumulated_impulse.add(&impulse);
    }
}

/// Explicit id -> body registry owning every sphere in the local simulation.
#[derive(Debug, Default)]
pub struct BodyRegistry {
    bodies: HashMap<u32, Body>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
        }
    }

    pub fn insert(&mut self, body: Body) {
        self.bodies.insert(body.id, body);
    }

    /// Removes a body. Safe to call for ids that are already gone.
    pub fn remove(&mut self, id: u32) -> Option<Body> {
        self.bodies.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.bodies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Integrates every body forward by `dt` seconds, consuming the force and
    /// impulse accumulators, then resolves platform support.
    pub fn step(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            let acceleration = body.accumulated_force.scale(1.0 / body.mass);
            body.velocity = body.velocity.add(&acceleration.scale(dt));
            body.velocity = body
                .velocity
                .add(&body.accumulated_impulse.scale(1.0 / body.mass));
            body.velocity.y -= GRAVITY * dt;

            let damping = (1.0 - LINEAR_DAMPING * dt).max(0.0);
            body.velocity = body.velocity.scale(damping);

            body.position = body.position.add(&body.velocity.scale(dt));

            // Support only near the top face; a body already past the slab
            // keeps falling even when horizontally over a platform.
            let rest_y = PLATFORM_TOP_Y + body.radius;
            if body.velocity.y <= 0.0
                && body.position.y <= rest_y + SUPPORT_TOLERANCE
                && body.position.y >= PLATFORM_TOP_Y - body.radius
                && over_platform(&body.position)
            {
                body.position.y = rest_y;
                body.velocity.y = 0.0;
                body.grounded = true;
            } else {
                body.grounded = false;
            }

            // Cosmetic rolling spin, derived from horizontal travel.
            if body.grounded {
                body.angular_velocity =
                    Vec3::new(body.velocity.z / body.radius, 0.0, -body.velocity.x / body.radius);
            }

            body.accumulated_force = Vec3::default();
            body.accumulated_impulse = Vec3::default();
        }
    }
}

/// True if the point is horizontally within any platform quadrant.
fn over_platform(position: &Vec3) -> bool {
    let half = PLATFORM_SIZE / 2.0;
    platform_positions().iter().any(|center| {
        (position.x - center.x).abs() <= half && (position.z - center.z).abs() <= half
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::SPAWN_HEIGHT;

    fn spawn_on_platform() -> Vec3 {
        let center = platform_positions()[0];
        Vec3::new(center.x, SPAWN_HEIGHT, center.z)
    }

    #[test]
    fn test_body_settles_onto_platform() {
        let mut registry = BodyRegistry::new();
        registry.insert(Body::new(1, BodyKind::Player, spawn_on_platform()));

        for _ in 0..120 {
            registry.step(1.0 / 60.0);
        }

        let body = registry.get(1).unwrap();
        assert!(body.grounded);
        assert_approx_eq!(body.position.y, PLATFORM_TOP_Y + BALL_RADIUS, 0.001);
        assert_approx_eq!(body.velocity.y, 0.0, 0.001);
    }

    #[test]
    fn test_body_falls_through_gap() {
        // The arena center sits in the gap between all four platforms.
        let mut registry = BodyRegistry::new();
        registry.insert(Body::new(1, BodyKind::Player, Vec3::new(0.0, SPAWN_HEIGHT, 0.0)));

        for _ in 0..600 {
            registry.step(1.0 / 60.0);
        }

        let body = registry.get(1).unwrap();
        assert!(!body.grounded);
        assert!(body.position.y < shared::FALL_THRESHOLD_Y);
    }

    #[test]
    fn test_impulse_changes_velocity_once() {
        let mut registry = BodyRegistry::new();
        registry.insert(Body::new(1, BodyKind::Player, spawn_on_platform()));
        for _ in 0..120 {
            registry.step(1.0 / 60.0);
        }

        registry.get_mut(1).unwrap().apply_impulse(Vec3::new(2.0, 0.0, 0.0));
        registry.step(1.0 / 60.0);
        let after_impulse = registry.get(1).unwrap().velocity.x;
        assert!(after_impulse > 1.0);

        // Accumulator was consumed; subsequent steps only damp.
        registry.step(1.0 / 60.0);
        assert!(registry.get(1).unwrap().velocity.x < after_impulse);
    }

    #[test]
    fn test_damping_slows_horizontal_drift() {
        let mut registry = BodyRegistry::new();
        let mut body = Body::new(1, BodyKind::Player, spawn_on_platform());
        body.velocity = Vec3::new(3.0, 0.0, 0.0);
        registry.insert(body);

        registry.step(1.0 / 60.0);
        let first = registry.get(1).unwrap().velocity.x;
        registry.step(1.0 / 60.0);
        let second = registry.get(1).unwrap().velocity.x;

        assert!(first < 3.0);
        assert!(second < first);
    }

    #[test]
    fn test_registry_remove_is_idempotent() {
        let mut registry = BodyRegistry::new();
        registry.insert(Body::new(1, BodyKind::Decorative, spawn_on_platform()));

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert!(registry.is_empty());
    }
}
