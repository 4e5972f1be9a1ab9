//! Room membership, match phases, score bookkeeping and broadcast fan-out
//!
//! This module is the authoritative half of the game: rooms own their
//! players, the match timer and the only score anybody believes. Handlers
//! mutate state and return the messages to fan out, so the whole state
//! machine runs synchronously and never touches a socket — the network
//! layer resolves deliveries to addresses afterwards.
//!
//! Commands that do not fit the current phase are silently dropped; the one
//! surfaced failure is a join against a full room.

use crate::utils::player_color;
use log::info;
use rand::Rng;
use shared::{
    platform_positions, Packet, Phase, PlayerSnapshot, Vec3, GAME_DURATION_SECS, MAX_PLAYERS,
    SPAWN_HEIGHT, SPAWN_JITTER,
};
use std::collections::HashMap;

/// The permanent room that exists for the whole process lifetime.
pub const DEFAULT_ROOM_ID: &str = "default";

/// Where a produced packet should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A single player.
    To(u32),
    /// Every current member of a room.
    Room(String),
    /// Every member of a room except one (typically the sender).
    Others { room: String, except: u32 },
}

/// A packet paired with its fan-out scope.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub delivery: Delivery,
    pub packet: Packet,
}

impl Outbound {
    fn to(player_id: u32, packet: Packet) -> Self {
        Self {
            delivery: Delivery::To(player_id),
            packet,
        }
    }

    fn room(room_id: &str, packet: Packet) -> Self {
        Self {
            delivery: Delivery::Room(room_id.to_string()),
            packet,
        }
    }

    fn others(room_id: &str, except: u32, packet: Packet) -> Self {
        Self {
            delivery: Delivery::Others {
                room: room_id.to_string(),
                except,
            },
            packet,
        }
    }
}

/// Per-room countdown. Present only while the room is in the Playing phase;
/// starting a game always replaces any previous timer.
#[derive(Debug, Clone, Copy)]
pub struct MatchTimer {
    pub remaining: u32,
}

#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub max_players: usize,
    pub phase: Phase,
    pub time_remaining: u32,
    pub players: HashMap<u32, PlayerSnapshot>,
    /// Ids in join order. Winner scans follow this, which makes the
    /// tie-break (first highest score encountered) deterministic.
    pub join_order: Vec<u32>,
    pub timer: Option<MatchTimer>,
}

impl Room {
    fn new(id: &str) -> Self {
        let name = if id == DEFAULT_ROOM_ID {
            "Main Arena".to_string()
        } else {
            format!("Room {}", id)
        };

        Self {
            id: id.to_string(),
            name,
            max_players: MAX_PLAYERS,
            phase: Phase::Lobby,
            time_remaining: GAME_DURATION_SECS,
            players: HashMap::new(),
            join_order: Vec::new(),
            timer: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Player with the strictly highest score, first-joined wins ties.
    /// None for an empty room.
    pub fn winner(&self) -> Option<&PlayerSnapshot> {
        let mut best: Option<&PlayerSnapshot> = None;
        for id in &self.join_order {
            if let Some(player) = self.players.get(id) {
                if best.map_or(true, |current| player.score > current.score) {
                    best = Some(player);
                }
            }
        }
        best
    }

    fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.join_order
            .iter()
            .filter_map(|id| self.players.get(id).cloned())
            .collect()
    }
}

/// Owns every room in the process. Constructed once; the default room is
/// created here and survives empty membership, all other rooms live only
/// while they have members.
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    /// player id -> room id, for routing events from bound connections.
    memberships: HashMap<u32, String>,
    next_player_id: u32,
}

impl RoomRegistry {
    pub fn new() -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(DEFAULT_ROOM_ID.to_string(), Room::new(DEFAULT_ROOM_ID));

        Self {
            rooms,
            memberships: HashMap::new(),
            next_player_id: 1,
        }
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, player_id: u32) -> Option<&str> {
        self.memberships.get(&player_id).map(String::as_str)
    }

    /// Current member ids of a room, used by the network layer to resolve
    /// room-scoped deliveries.
    pub fn room_members(&self, room_id: &str) -> Vec<u32> {
        self.rooms
            .get(room_id)
            .map(|room| room.join_order.clone())
            .unwrap_or_default()
    }

    /// Joins a room, creating it on first use. Returns the new player id and
    /// the messages to deliver, or the rejection message when the room is
    /// full — the only explicitly surfaced error in the protocol.
    pub fn join(&mut self, player_name: &str, room_id: &str) -> Result<(u32, Vec<Outbound>), String> {
        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id));

        if room.is_full() {
            return Err("Room is full".to_string());
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let name = if player_name.trim().is_empty() {
            format!("Player_{}", player_id)
        } else {
            player_name.to_string()
        };

        // Spawn slots cycle over the platform quadrants, with a small
        // in-platform offset so players never stack exactly.
        let slot = room.players.len() % platform_positions().len();
        let platform = platform_positions()[slot];
        let mut rng = rand::thread_rng();
        let position = Vec3::new(
            platform.x + (rng.gen::<f32>() - 0.5) * SPAWN_JITTER,
            SPAWN_HEIGHT,
            platform.z + (rng.gen::<f32>() - 0.5) * SPAWN_JITTER,
        );

        let player = PlayerSnapshot {
            id: player_id,
            name: name.clone(),
            color: player_color(player_id),
            position,
            rotation: Vec3::default(),
            velocity: Vec3::default(),
            score: 0,
            room_id: room_id.to_string(),
            platform_slot: slot,
        };

        room.players.insert(player_id, player.clone());
        room.join_order.push(player_id);
        self.memberships.insert(player_id, room_id.to_string());

        info!("Player '{}' ({}) joined room '{}'", name, player_id, room_id);

        let outbound = vec![
            Outbound::to(
                player_id,
                Packet::GameJoined {
                    player_id,
                    room_id: room_id.to_string(),
                    players: room.snapshots(),
                    phase: room.phase,
                    time_remaining: room.time_remaining,
                },
            ),
            Outbound::others(room_id, player_id, Packet::PlayerJoined { player }),
        ];

        Ok((player_id, outbound))
    }

    /// Stores a relayed position/velocity report and fans it out to room
    /// peers. No plausibility checks: the relay trusts the owning client.
    pub fn update_position(
        &mut self,
        player_id: u32,
        position: Vec3,
        rotation: Option<Vec3>,
        velocity: Option<Vec3>,
    ) -> Vec<Outbound> {
        let room_id = match self.memberships.get(&player_id) {
            Some(room_id) => room_id.clone(),
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        if let Some(player) = room.players.get_mut(&player_id) {
            player.position = position;
            if let Some(rotation) = rotation {
                player.rotation = rotation;
            }
            if let Some(velocity) = velocity {
                player.velocity = velocity;
            }

            vec![Outbound::others(
                &room_id,
                player_id,
                Packet::PlayerMoved {
                    player_id,
                    position,
                    rotation,
                    velocity,
                },
            )]
        } else {
            Vec::new()
        }
    }

    /// Relays a generic action token (e.g. "jump") verbatim to room peers.
    pub fn player_action(&mut self, player_id: u32, action: &str) -> Vec<Outbound> {
        match self.memberships.get(&player_id) {
            Some(room_id) => vec![Outbound::others(
                room_id,
                player_id,
                Packet::PlayerActed {
                    player_id,
                    action: action.to_string(),
                },
            )],
            None => Vec::new(),
        }
    }

    /// Applies the fall penalty. Only counted while the match is running.
    pub fn player_fell(&mut self, player_id: u32) -> Vec<Outbound> {
        let room_id = match self.memberships.get(&player_id) {
            Some(room_id) => room_id.clone(),
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        if room.phase != Phase::Playing {
            return Vec::new();
        }

        if let Some(player) = room.players.get_mut(&player_id) {
            player.score -= 1;
            let score = player.score;
            vec![Outbound::room(
                &room_id,
                Packet::ScoreUpdate { player_id, score },
            )]
        } else {
            Vec::new()
        }
    }

    /// Credits a knockout to the attacker. Requires the target to still be a
    /// member; only counted while the match is running.
    pub fn player_knockout(&mut self, player_id: u32, target_id: u32) -> Vec<Outbound> {
        let room_id = match self.memberships.get(&player_id) {
            Some(room_id) => room_id.clone(),
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        if room.phase != Phase::Playing || !room.players.contains_key(&target_id) {
            return Vec::new();
        }

        if let Some(player) = room.players.get_mut(&player_id) {
            player.score += 1;
            let score = player.score;
            vec![Outbound::room(
                &room_id,
                Packet::ScoreUpdate { player_id, score },
            )]
        } else {
            Vec::new()
        }
    }

    /// Lobby -> Playing. Any member may start; requests in other phases are
    /// silently ignored.
    pub fn start_game(&mut self, player_id: u32) -> Vec<Outbound> {
        let room_id = match self.memberships.get(&player_id) {
            Some(room_id) => room_id.clone(),
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        if room.phase != Phase::Lobby {
            return Vec::new();
        }

        room.phase = Phase::Playing;
        room.time_remaining = GAME_DURATION_SECS;
        room.timer = Some(MatchTimer {
            remaining: GAME_DURATION_SECS,
        });

        info!("Game started in room '{}'", room_id);

        vec![Outbound::room(
            &room_id,
            Packet::GameStateUpdate {
                phase: Phase::Playing,
                time_remaining: Some(GAME_DURATION_SECS),
            },
        )]
    }

    /// GameOver -> Lobby, resetting every score.
    pub fn return_to_lobby(&mut self, player_id: u32) -> Vec<Outbound> {
        let room_id = match self.memberships.get(&player_id) {
            Some(room_id) => room_id.clone(),
            None => return Vec::new(),
        };

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Vec::new(),
        };

        if room.phase != Phase::GameOver {
            return Vec::new();
        }

        room.phase = Phase::Lobby;
        for player in room.players.values_mut() {
            player.score = 0;
        }

        info!("Returned to lobby in room '{}'", room_id);

        vec![Outbound::room(
            &room_id,
            Packet::GameStateUpdate {
                phase: Phase::Lobby,
                time_remaining: None,
            },
        )]
    }

    /// Removes a player. Duplicate disconnects are safe no-ops. Deletes the
    /// room (and its timer) when the last member of a non-default room
    /// leaves.
    pub fn disconnect(&mut self, player_id: u32) -> Vec<Outbound> {
        let room_id = match self.memberships.remove(&player_id) {
            Some(room_id) => room_id,
            None => return Vec::new(),
        };

        let mut outbound = Vec::new();

        if let Some(room) = self.rooms.get_mut(&room_id) {
            if room.players.remove(&player_id).is_some() {
                room.join_order.retain(|id| *id != player_id);
                info!("Player {} left room '{}'", player_id, room_id);

                outbound.push(Outbound::room(&room_id, Packet::PlayerLeft { player_id }));
            }

            if room.players.is_empty() && room_id != DEFAULT_ROOM_ID {
                // Dropping the room drops its timer with it.
                self.rooms.remove(&room_id);
                info!("Deleted empty room '{}'", room_id);
            }
        }

        outbound
    }

    /// Advances every active match timer by one second. Driven at 1 Hz by
    /// the server event loop; rooms without a running match are untouched.
    pub fn tick_timers(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();

        for room in self.rooms.values_mut() {
            let timer = match &mut room.timer {
                Some(timer) => timer,
                None => continue,
            };

            timer.remaining = timer.remaining.saturating_sub(1);
            room.time_remaining = timer.remaining;

            outbound.push(Outbound::room(
                &room.id,
                Packet::GameTimerUpdate {
                    time_remaining: room.time_remaining,
                },
            ));

            if timer.remaining == 0 {
                room.timer = None;
                room.phase = Phase::GameOver;

                let final_scores: HashMap<u32, i32> = room
                    .players
                    .iter()
                    .map(|(id, player)| (*id, player.score))
                    .collect();

                let winner = room.winner();
                let winner_player_id = winner.map(|p| p.id);
                let winner_name = winner.map(|p| p.name.clone());

                info!(
                    "Game over in room '{}', winner: {}",
                    room.id,
                    winner_name.as_deref().unwrap_or("none")
                );

                outbound.push(Outbound::room(
                    &room.id,
                    Packet::GameOver {
                        final_scores,
                        winner_player_id,
                        winner_name,
                    },
                ));
            }
        }

        outbound
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
