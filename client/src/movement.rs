//! Local player movement forces and the bunny-hop jump chain

use crate::body::Body;
use shared::{Phase, Vec3};

/// Continuous horizontal force per unit mass while an intent is held.
pub const MOVEMENT_FORCE: f32 = 8.0;
/// Drag engages only above this speed, so resting bodies stay put.
pub const DRAG_MIN_SPEED: f32 = 0.1;
pub const BASE_JUMP_IMPULSE: f32 = 7.0;
pub const CHAIN_JUMP_BONUS: f32 = 1.5;
/// Jump strength once the chain is exhausted.
pub const CAPPED_JUMP_IMPULSE: f32 = 5.0;
pub const MAX_CHAINED_JUMPS: u32 = 3;
/// Jumps inside this window of the previous one extend the chain.
pub const JUMP_CHAIN_WINDOW_MS: u64 = 500;
pub const JUMP_COOLDOWN_MS: u64 = 350;

/// Held directional intents plus the jump key, already decoupled from any
/// concrete input device.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputIntent {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Horizontal camera frame used to make movement camera-relative.
#[derive(Debug, Clone, Copy)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
}

impl CameraBasis {
    /// Builds a basis from arbitrary camera vectors by flattening them onto
    /// the xz plane and re-normalizing.
    pub fn flattened(forward: Vec3, right: Vec3) -> Self {
        Self {
            forward: forward.horizontal().normalize(),
            right: right.horizontal().normalize(),
        }
    }

    /// Basis for a camera yawed around the vertical axis. Yaw zero looks
    /// down negative z.
    pub fn from_yaw(yaw: f32) -> Self {
        Self {
            forward: Vec3::new(-yaw.sin(), 0.0, -yaw.cos()),
            right: Vec3::new(yaw.cos(), 0.0, -yaw.sin()),
        }
    }
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self::from_yaw(0.0)
    }
}

/// Escalating jump strength for rapid consecutive jumps, capped after a
/// threshold to keep chaining from being a pure exploit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpChain {
    Normal,
    Chained(u32),
    Capped,
}

impl JumpChain {
    /// Next state for a jump landed inside the chain window.
    fn advance(self) -> JumpChain {
        match self {
            JumpChain::Normal => JumpChain::Chained(1),
            JumpChain::Chained(count) if count + 1 >= MAX_CHAINED_JUMPS => JumpChain::Capped,
            JumpChain::Chained(count) => JumpChain::Chained(count + 1),
            JumpChain::Capped => JumpChain::Capped,
        }
    }

    fn impulse(self) -> f32 {
        match self {
            JumpChain::Normal => BASE_JUMP_IMPULSE,
            JumpChain::Chained(count) => BASE_JUMP_IMPULSE + count as f32 * CHAIN_JUMP_BONUS,
            JumpChain::Capped => CAPPED_JUMP_IMPULSE,
        }
    }
}

/// Converts input intent plus camera orientation into forces on the local
/// body, and runs the rate-limited jump chain.
#[derive(Debug)]
pub struct MovementController {
    jump_chain: JumpChain,
    last_jump_ms: Option<u64>,
    jump_ready_at_ms: u64,
}

impl MovementController {
    pub fn new() -> Self {
        Self {
            jump_chain: JumpChain::Normal,
            last_jump_ms: None,
            jump_ready_at_ms: 0,
        }
    }

    /// Applies movement force, drag and jumping for one tick.
    ///
    /// Active only while the match is underway and the body is grounded and
    /// not in a fall episode. Returns the action name to relay when a jump
    /// fired this tick.
    pub fn update(
        &mut self,
        body: &mut Body,
        intent: &InputIntent,
        camera: &CameraBasis,
        phase: Phase,
        fallen: bool,
        now_ms: u64,
    ) -> Option<&'static str> {
        if phase != Phase::Playing || fallen || !body.grounded {
            return None;
        }

        let mut direction = Vec3::default();
        if intent.forward {
            direction = direction.add(&camera.forward);
        }
        if intent.backward {
            direction = direction.sub(&camera.forward);
        }
        if intent.left {
            direction = direction.sub(&camera.right);
        }
        if intent.right {
            direction = direction.add(&camera.right);
        }

        if direction.magnitude() > 0.0 {
            let force = direction.normalize().scale(MOVEMENT_FORCE * body.mass);
            body.apply_force(Vec3::new(force.x, 0.0, force.z));
        }

        // Speed-adaptive drag keeps top speed bounded without killing the
        // initial acceleration.
        let speed = body.velocity.magnitude();
        if speed > DRAG_MIN_SPEED {
            let drag_factor = (0.05 + speed * 0.005).min(0.08);
            let drag = body.velocity.scale(-drag_factor);
            body.apply_force(Vec3::new(drag.x, 0.0, drag.z));
        }

        let mut action = None;
        if intent.jump && now_ms >= self.jump_ready_at_ms {
            let within_window = self
                .last_jump_ms
                .map(|last| now_ms.saturating_sub(last) < JUMP_CHAIN_WINDOW_MS)
                .unwrap_or(false);

            self.jump_chain = if within_window {
                self.jump_chain.advance()
            } else {
                JumpChain::Normal
            };

            body.apply_impulse(Vec3::new(0.0, self.jump_chain.impulse() * body.mass, 0.0));
            self.last_jump_ms = Some(now_ms);
            self.jump_ready_at_ms = now_ms + JUMP_COOLDOWN_MS;
            action = Some("jump");
        }

        action
    }
}

impl Default for MovementController {
    fn default() -> Self {
        Self::new()
    }
}
