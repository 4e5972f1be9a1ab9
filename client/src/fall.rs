//! Fall detection and respawn scheduling for arena bodies
//!
//! Each body moves Grounded -> Fallen -> Grounded. A fall of the local
//! player's body is reported upward so the server can apply the score
//! penalty; shadow and decorative bodies just respawn quietly.

use crate::body::BodyRegistry;
use rand::Rng;
use shared::{Vec3, FALL_THRESHOLD_Y};
use std::collections::HashMap;

/// A body is polled at most once per this interval.
pub const FALL_POLL_INTERVAL_MS: u64 = 100;
/// Respawn delay for the local player's body.
pub const PLAYER_RESPAWN_DELAY_MS: u64 = 3000;
/// Upper bound of the jittered respawn delay for non-player bodies.
pub const SHADOW_RESPAWN_JITTER_MS: u64 = 500;
/// Respawns are raised above the spawn point to avoid clipping the platform.
pub const RESPAWN_HEIGHT_OFFSET: f32 = 1.5;
/// Horizontal jitter applied to non-player respawns so spheres never stack.
const RESPAWN_POSITION_JITTER: f32 = 0.5;

#[derive(Debug, Default)]
struct BodyFallState {
    fallen: bool,
    last_poll_ms: Option<u64>,
    respawn_due_ms: Option<u64>,
}

/// Watches vertical positions and reschedules fallen bodies back to their
/// spawn points.
#[derive(Debug, Default)]
pub struct FallMonitor {
    states: HashMap<u32, BodyFallState>,
}

impl FallMonitor {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    /// Drops tracking for a removed body.
    pub fn forget(&mut self, id: u32) {
        self.states.remove(&id);
    }

    pub fn is_fallen(&self, id: u32) -> bool {
        self.states.get(&id).map(|s| s.fallen).unwrap_or(false)
    }

    /// Checks every body once per poll interval and processes due respawns.
    /// Returns true when the local player's body fell during this call, so
    /// the caller can report it to the server exactly once per episode.
    pub fn poll(&mut self, registry: &mut BodyRegistry, local_id: u32, now_ms: u64) -> bool {
        let mut local_fell = false;

        for id in registry.ids() {
            let state = self.states.entry(id).or_default();

            let poll_due = match state.last_poll_ms {
                Some(last) => now_ms.saturating_sub(last) >= FALL_POLL_INTERVAL_MS,
                None => true,
            };

            if poll_due {
                state.last_poll_ms = Some(now_ms);

                let below = registry
                    .get(id)
                    .map(|b| b.position.y < FALL_THRESHOLD_Y)
                    .unwrap_or(false);

                if below && !state.fallen {
                    state.fallen = true;
                    if id == local_id {
                        local_fell = true;
                        state.respawn_due_ms = Some(now_ms + PLAYER_RESPAWN_DELAY_MS);
                    } else {
                        let jitter = rand::thread_rng().gen_range(0..=SHADOW_RESPAWN_JITTER_MS);
                        state.respawn_due_ms = Some(now_ms + jitter);
                    }
                }
            }

            // Respawns fire on schedule, independent of the poll gate.
            if let Some(due) = state.respawn_due_ms {
                if now_ms >= due {
                    state.respawn_due_ms = None;
                    state.fallen = false;
                    respawn(registry, id, id != local_id);
                }
            }
        }

        local_fell
    }
}

fn respawn(registry: &mut BodyRegistry, id: u32, jittered: bool) {
    if let Some(body) = registry.get_mut(id) {
        let offset = if jittered {
            let mut rng = rand::thread_rng();
            Vec3::new(
                (rng.gen::<f32>() - 0.5) * RESPAWN_POSITION_JITTER,
                0.0,
                (rng.gen::<f32>() - 0.5) * RESPAWN_POSITION_JITTER,
            )
        } else {
            Vec3::default()
        };

        body.position = Vec3::new(
            body.spawn_position.x + offset.x,
            body.spawn_position.y + RESPAWN_HEIGHT_OFFSET,
            body.spawn_position.z + offset.z,
        );
        body.velocity = Vec3::default();
        body.angular_velocity = Vec3::default();
        body.grounded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, BodyKind};
    use assert_approx_eq::assert_approx_eq;

    const LOCAL: u32 = 1;
    const SHADOW: u32 = 2;

    fn fallen_registry() -> BodyRegistry {
        let mut registry = BodyRegistry::new();
        let spawn = Vec3::new(-3.25, 1.0, -3.25);
        let mut local = Body::new(LOCAL, BodyKind::Player, spawn);
        local.position.y = -6.0;
        registry.insert(local);
        registry
    }

    #[test]
    fn test_local_fall_reported_once_per_episode() {
        let mut registry = fallen_registry();
        let mut monitor = FallMonitor::new();

        assert!(monitor.poll(&mut registry, LOCAL, 0));
        assert!(monitor.is_fallen(LOCAL));

        // Still below the threshold on later polls: no second report.
        assert!(!monitor.poll(&mut registry, LOCAL, 100));
        assert!(!monitor.poll(&mut registry, LOCAL, 200));
    }

    #[test]
    fn test_poll_gate_limits_checks() {
        let mut registry = BodyRegistry::new();
        let mut body = Body::new(LOCAL, BodyKind::Player, Vec3::new(-3.25, 1.0, -3.25));
        body.position.y = 0.75;
        registry.insert(body);

        let mut monitor = FallMonitor::new();
        assert!(!monitor.poll(&mut registry, LOCAL, 0));

        // The body drops below the threshold between polls, but the next
        // check is gated until 100ms have elapsed.
        registry.get_mut(LOCAL).unwrap().position.y = -6.0;
        assert!(!monitor.poll(&mut registry, LOCAL, 50));
        assert!(monitor.poll(&mut registry, LOCAL, 100));
    }

    #[test]
    fn test_local_respawn_after_fixed_delay() {
        let mut registry = fallen_registry();
        let mut monitor = FallMonitor::new();

        assert!(monitor.poll(&mut registry, LOCAL, 0));

        // Not due yet.
        monitor.poll(&mut registry, LOCAL, PLAYER_RESPAWN_DELAY_MS - 100);
        assert!(monitor.is_fallen(LOCAL));

        monitor.poll(&mut registry, LOCAL, PLAYER_RESPAWN_DELAY_MS);
        assert!(!monitor.is_fallen(LOCAL));

        let body = registry.get(LOCAL).unwrap();
        // Local respawn has no horizontal jitter and sits above the spawn.
        assert_approx_eq!(body.position.x, body.spawn_position.x, 0.0001);
        assert_approx_eq!(body.position.z, body.spawn_position.z, 0.0001);
        assert_approx_eq!(
            body.position.y,
            body.spawn_position.y + RESPAWN_HEIGHT_OFFSET,
            0.0001
        );
        assert_eq!(body.velocity, Vec3::default());
        assert_eq!(body.angular_velocity, Vec3::default());
    }

    #[test]
    fn test_shadow_respawn_is_quiet_and_jittered() {
        let mut registry = fallen_registry();
        let spawn = Vec3::new(3.25, 1.0, -3.25);
        let mut shadow = Body::new(SHADOW, BodyKind::Player, spawn);
        shadow.position.y = -7.0;
        registry.insert(shadow);

        let mut monitor = FallMonitor::new();
        // The local body fell too, but the shadow fall itself reports nothing
        // beyond that.
        monitor.poll(&mut registry, LOCAL, 0);
        assert!(monitor.is_fallen(SHADOW));

        // Shadow respawn lands within the jitter window.
        monitor.poll(&mut registry, LOCAL, SHADOW_RESPAWN_JITTER_MS);
        assert!(!monitor.is_fallen(SHADOW));

        let body = registry.get(SHADOW).unwrap();
        assert!((body.position.x - spawn.x).abs() <= RESPAWN_POSITION_JITTER);
        assert!((body.position.z - spawn.z).abs() <= RESPAWN_POSITION_JITTER);
        assert_approx_eq!(body.position.y, spawn.y + RESPAWN_HEIGHT_OFFSET, 0.0001);
    }

    #[test]
    fn test_refall_after_respawn_reports_again() {
        let mut registry = fallen_registry();
        let mut monitor = FallMonitor::new();

        assert!(monitor.poll(&mut registry, LOCAL, 0));
        monitor.poll(&mut registry, LOCAL, PLAYER_RESPAWN_DELAY_MS);
        assert!(!monitor.is_fallen(LOCAL));

        // A fresh fall is a new episode.
        registry.get_mut(LOCAL).unwrap().position.y = -6.0;
        assert!(monitor.poll(&mut registry, LOCAL, PLAYER_RESPAWN_DELAY_MS + 200));
    }

    #[test]
    fn test_forget_drops_state() {
        let mut registry = fallen_registry();
        let mut monitor = FallMonitor::new();
        monitor.poll(&mut registry, LOCAL, 0);
        assert!(monitor.is_fallen(LOCAL));

        monitor.forget(LOCAL);
        assert!(!monitor.is_fallen(LOCAL));
    }
}
