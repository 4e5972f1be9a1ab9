use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const BALL_RADIUS: f32 = 0.5;
pub const BALL_MASS: f32 = 1.0;
pub const GRAVITY: f32 = 9.81;
pub const LINEAR_DAMPING: f32 = 0.25;
pub const FALL_THRESHOLD_Y: f32 = -5.0;
pub const PLATFORM_SIZE: f32 = 5.0;
pub const PLATFORM_HEIGHT: f32 = 0.5;
pub const PLATFORM_GAP: f32 = 1.5;
pub const PLATFORM_TOP_Y: f32 = PLATFORM_HEIGHT / 2.0;
pub const SPAWN_HEIGHT: f32 = 1.0;
pub const SPAWN_JITTER: f32 = 1.5;
pub const MAX_PLAYERS: usize = 8;
pub const GAME_DURATION_SECS: u32 = 60;
pub const POSITION_SEND_INTERVAL_MS: u64 = 50;
pub const SIMULATION_TICK_MS: u64 = 16;

/// Centers of the four arena platforms, one per quadrant.
/// Spawn slots cycle over these in index order.
pub fn platform_positions() -> [Vec3; 4] {
    let offset = PLATFORM_SIZE / 2.0 + PLATFORM_GAP / 2.0;
    [
        Vec3::new(-offset, 0.0, -offset),
        Vec3::new(offset, 0.0, -offset),
        Vec3::new(-offset, 0.0, offset),
        Vec3::new(offset, 0.0, offset),
    ]
}

/// Represents a vector in 3D space. Positive y is up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Returns the normalized vector, or zero if the magnitude is zero.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::default()
        } else {
            Vec3::new(self.x / mag, self.y / mag, self.z / mag)
        }
    }

    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Projection onto the xz plane (y zeroed).
    pub fn horizontal(&self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.z)
    }

    pub fn distance_to(&self, other: &Vec3) -> f32 {
        self.sub(other).magnitude()
    }
}

/// Match phase for a room. Cycles Lobby -> Playing -> GameOver -> Lobby.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Playing,
    GameOver,
}

/// Relayed, non-authoritative view of a player as the server tracks it.
/// Position/rotation/velocity are whatever the owning client last reported;
/// score and phase bookkeeping are authoritative on the server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub score: i32,
    pub room_id: String,
    pub platform_slot: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    JoinGame {
        player_name: String,
        room_id: String,
    },
    UpdatePosition {
        position: Vec3,
        rotation: Option<Vec3>,
        velocity: Option<Vec3>,
    },
    PlayerAction {
        action: String,
    },
    PlayerFell,
    PlayerKnockout {
        target_id: u32,
    },
    StartGame,
    ReturnToLobby,
    Disconnect,

    // Server -> client
    GameJoined {
        player_id: u32,
        room_id: String,
        players: Vec<PlayerSnapshot>,
        phase: Phase,
        time_remaining: u32,
    },
    JoinError {
        message: String,
    },
    PlayerJoined {
        player: PlayerSnapshot,
    },
    PlayerLeft {
        player_id: u32,
    },
    PlayerMoved {
        player_id: u32,
        position: Vec3,
        rotation: Option<Vec3>,
        velocity: Option<Vec3>,
    },
    PlayerActed {
        player_id: u32,
        action: String,
    },
    ScoreUpdate {
        player_id: u32,
        score: i32,
    },
    GameStateUpdate {
        phase: Phase,
        time_remaining: Option<u32>,
    },
    GameTimerUpdate {
        time_remaining: u32,
    },
    GameOver {
        final_scores: HashMap<u32, i32>,
        winner_player_id: Option<u32>,
        winner_name: Option<String>,
    },
}
