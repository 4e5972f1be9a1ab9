//! Impulse-based sphere collision resolution and proximity separation
//!
//! The same resolver runs over every registered body, local or remote, so
//! any sphere can push or be pushed regardless of who controls it. The
//! impulse model deliberately treats the other body as an equal-mass
//! partner; correcting that would change game feel.

use crate::body::BodyRegistry;
use shared::Vec3;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct CollisionConfig {
    /// Minimum gap between impulse responses for the same body pair.
    pub cooldown_ms: u64,
    /// Normal-velocity projection below which contact is left alone.
    pub impact_threshold: f32,
    /// Restitution coefficient of the impulse response.
    pub restitution: f32,
    /// Impulse length above which an upward pop is added.
    pub upward_threshold: f32,
    pub max_upward_impulse: f32,
    /// History entries beyond this trigger a prune pass.
    pub history_limit: usize,
    pub history_timeout_ms: u64,
    /// Scale of the near-miss repulsion force.
    pub proximity_strength: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 50,
            impact_threshold: 0.5,
            restitution: 0.7,
            upward_threshold: 2.0,
            max_upward_impulse: 2.0,
            history_limit: 20,
            history_timeout_ms: 1000,
            proximity_strength: 0.8,
        }
    }
}

/// Per-tick pairwise resolver with a per-body collision history used to
/// de-duplicate contacts across consecutive ticks.
#[derive(Debug, Default)]
pub struct CollisionResolver {
    config: CollisionConfig,
    history: HashMap<u32, HashMap<u32, u64>>,
}

impl CollisionResolver {
    pub fn new(config: CollisionConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Drops the collision history of a removed body.
    pub fn forget(&mut self, id: u32) {
        self.history.remove(&id);
        for entries in self.history.values_mut() {
            entries.remove(&id);
        }
    }

    /// Scans every body against every other body and applies impulse and
    /// proximity responses. Mutates only the bodies' accumulators.
    pub fn resolve(&mut self, registry: &mut BodyRegistry, now_ms: u64) {
        let snapshot: Vec<(u32, Vec3, f32)> = registry
            .ids()
            .into_iter()
            .filter_map(|id| registry.get(id).map(|b| (b.id, b.position, b.radius)))
            .collect();

        for &(id, position, radius) in &snapshot {
            for &(other_id, other_position, other_radius) in &snapshot {
                if other_id == id {
                    continue;
                }
                // Only same-radius spheres take part in ball-vs-ball response.
                if (other_radius - radius).abs() > f32::EPSILON {
                    continue;
                }

                let delta = position.sub(&other_position);
                let distance = delta.magnitude();

                if distance <= radius * 2.0 {
                    self.resolve_contact(registry, id, other_id, &delta, now_ms);
                } else if distance < radius * 3.0 {
                    // Close but not touching: continuous horizontal repulsion,
                    // growing linearly as the gap closes. No cooldown.
                    let normal = delta.normalize();
                    let push = self.config.proximity_strength * (radius * 3.0 - distance);
                    if let Some(body) = registry.get_mut(id) {
                        body.apply_force(Vec3::new(normal.x * push, 0.0, normal.z * push));
                    }
                }
            }
        }
    }

    fn resolve_contact(
        &mut self,
        registry: &mut BodyRegistry,
        id: u32,
        other_id: u32,
        delta: &Vec3,
        now_ms: u64,
    ) {
        let entries = self.history.entry(id).or_default();
        let last = entries.get(&other_id).copied().unwrap_or(0);
        if now_ms.saturating_sub(last) <= self.config.cooldown_ms {
            return;
        }

        let body = match registry.get_mut(id) {
            Some(body) => body,
            None => return,
        };

        let normal = delta.normalize();
        let velocity_along_normal = body.velocity.horizontal().dot(&normal);

        // Contacts already separating hard are left to coast; everything else
        // gets the symmetric equal-mass impulse.
        if velocity_along_normal > -self.config.impact_threshold {
            let strength = -(1.0 + self.config.restitution)
                * velocity_along_normal
                * (body.mass * 0.5);
            let impulse = normal.scale(strength);
            body.apply_impulse(Vec3::new(impulse.x, 0.0, impulse.z));

            let impact_magnitude = impulse.magnitude();
            if impact_magnitude > self.config.upward_threshold {
                let upward = (impact_magnitude * 0.1).min(self.config.max_upward_impulse);
                body.apply_impulse(Vec3::new(0.0, upward, 0.0));
            }

            entries.insert(other_id, now_ms);

            if entries.len() > self.config.history_limit {
                let timeout = self.config.history_timeout_ms;
                entries.retain(|_, recorded| now_ms.saturating_sub(*recorded) <= timeout);
            }
        }
    }
}
