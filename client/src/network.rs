//! Client networking and the simulation tick
//!
//! The `Client` owns every locally simulated body, including one shadow body
//! per remote player. Incoming `PlayerMoved` payloads are buffered and
//! applied as plain state writes at the top of the next tick; nothing
//! mutates physics state from the network side of the select loop.

use crate::body::{Body, BodyKind, BodyRegistry};
use crate::collision::CollisionResolver;
use crate::fall::FallMonitor;
use crate::movement::{CameraBasis, InputIntent, MovementController};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, Phase, Vec3, POSITION_SEND_INTERVAL_MS, SIMULATION_TICK_MS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::interval;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_name: String,
    room_id: String,
    connected: bool,

    player_id: Option<u32>,
    phase: Phase,
    time_remaining: u32,
    scores: HashMap<u32, i32>,
    names: HashMap<u32, String>,

    bodies: BodyRegistry,
    resolver: CollisionResolver,
    fall_monitor: FallMonitor,
    movement: MovementController,
    intent: InputIntent,
    camera: CameraBasis,

    pending_moves: Vec<(u32, Vec3, Option<Vec3>)>,
    last_position_sent_ms: Option<u64>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        player_name: &str,
        room_id: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            player_name: player_name.to_string(),
            room_id: room_id.to_string(),
            connected: false,
            player_id: None,
            phase: Phase::Lobby,
            time_remaining: 0,
            scores: HashMap::new(),
            names: HashMap::new(),
            bodies: BodyRegistry::new(),
            resolver: CollisionResolver::default(),
            fall_monitor: FallMonitor::new(),
            movement: MovementController::new(),
            intent: InputIntent::default(),
            camera: CameraBasis::default(),
            pending_moves: Vec::new(),
            last_position_sent_ms: None,
        })
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn score_of(&self, player_id: u32) -> Option<i32> {
        self.scores.get(&player_id).copied()
    }

    pub fn bodies(&self) -> &BodyRegistry {
        &self.bodies
    }

    /// Replaces the held input intent consumed by subsequent ticks.
    pub fn set_intent(&mut self, intent: InputIntent) {
        self.intent = intent;
    }

    /// Updates the camera frame that movement is computed relative to.
    pub fn set_camera(&mut self, camera: CameraBasis) {
        self.camera = camera;
    }

    async fn join(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!(
            "Joining room '{}' as '{}'",
            self.room_id, self.player_name
        );
        let packet = Packet::JoinGame {
            player_name: self.player_name.clone(),
            room_id: self.room_id.clone(),
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Applies a server packet to the mirrored room state. Physics state is
    /// only queued here, never written directly.
    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::GameJoined {
                player_id,
                room_id,
                players,
                phase,
                time_remaining,
            } => {
                info!("Joined room '{}' as player {}", room_id, player_id);
                self.connected = true;
                self.player_id = Some(player_id);
                self.room_id = room_id;
                self.phase = phase;
                self.time_remaining = time_remaining;

                for snapshot in players {
                    self.names.insert(snapshot.id, snapshot.name.clone());
                    self.scores.insert(snapshot.id, snapshot.score);
                    self.bodies
                        .insert(Body::new(snapshot.id, BodyKind::Player, snapshot.position));
                }
            }

            Packet::JoinError { message } => {
                error!("Join rejected: {}", message);
                self.connected = false;
            }

            Packet::PlayerJoined { player } => {
                info!("Player '{}' joined", player.name);
                self.names.insert(player.id, player.name.clone());
                self.scores.insert(player.id, player.score);
                self.bodies
                    .insert(Body::new(player.id, BodyKind::Player, player.position));
            }

            Packet::PlayerLeft { player_id } => {
                if let Some(name) = self.names.remove(&player_id) {
                    info!("Player '{}' left", name);
                }
                self.scores.remove(&player_id);
                self.bodies.remove(player_id);
                self.resolver.forget(player_id);
                self.fall_monitor.forget(player_id);
            }

            Packet::PlayerMoved {
                player_id,
                position,
                velocity,
                ..
            } => {
                if Some(player_id) != self.player_id {
                    self.pending_moves.push((player_id, position, velocity));
                }
            }

            Packet::PlayerActed { player_id, action } => {
                debug!("Player {} action '{}'", player_id, action);
            }

            Packet::ScoreUpdate { player_id, score } => {
                self.scores.insert(player_id, score);
            }

            Packet::GameStateUpdate {
                phase,
                time_remaining,
            } => {
                self.phase = phase;
                if let Some(time_remaining) = time_remaining {
                    self.time_remaining = time_remaining;
                }
                if phase == Phase::Lobby {
                    for score in self.scores.values_mut() {
                        *score = 0;
                    }
                }
                info!("Phase is now {:?}", phase);
            }

            Packet::GameTimerUpdate { time_remaining } => {
                self.time_remaining = time_remaining;
            }

            Packet::GameOver {
                winner_name,
                winner_player_id,
                ..
            } => {
                self.phase = Phase::GameOver;
                match winner_name {
                    Some(name) => info!("Game over, winner: {}", name),
                    None => info!("Game over, no winner (id {:?})", winner_player_id),
                }
            }

            _ => {
                warn!("Unexpected packet type from server");
            }
        }
    }

    /// Runs one simulation tick and returns the packets to send upstream.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Packet> {
        let mut outbound = Vec::new();

        let local_id = match self.player_id {
            Some(id) => id,
            None => return outbound,
        };

        // Remote state writes queued since the last tick.
        for (player_id, position, velocity) in self.pending_moves.drain(..) {
            if let Some(body) = self.bodies.get_mut(player_id) {
                body.position = position;
                if let Some(velocity) = velocity {
                    body.velocity = velocity;
                }
            }
        }

        if self.fall_monitor.poll(&mut self.bodies, local_id, now_ms) {
            info!("Fell off the arena");
            outbound.push(Packet::PlayerFell);
        }

        let fallen = self.fall_monitor.is_fallen(local_id);
        if let Some(body) = self.bodies.get_mut(local_id) {
            if let Some(action) =
                self.movement
                    .update(body, &self.intent, &self.camera, self.phase, fallen, now_ms)
            {
                outbound.push(Packet::PlayerAction {
                    action: action.to_string(),
                });
            }
        }

        self.resolver.resolve(&mut self.bodies, now_ms);
        self.bodies.step(SIMULATION_TICK_MS as f32 / 1000.0);

        let send_due = match self.last_position_sent_ms {
            Some(last) => now_ms.saturating_sub(last) >= POSITION_SEND_INTERVAL_MS,
            None => true,
        };
        if send_due && !fallen {
            if let Some(body) = self.bodies.get(local_id) {
                outbound.push(Packet::UpdatePosition {
                    position: body.position,
                    rotation: None,
                    velocity: Some(body.velocity),
                });
                self.last_position_sent_ms = Some(now_ms);
            }
        }

        outbound
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.join().await?;

        let mut tick_interval = interval(Duration::from_millis(SIMULATION_TICK_MS));
        let mut buffer = [0u8; 4096];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.handle_packet(packet);
                            } else {
                                warn!("Failed to deserialize packet from server");
                            }
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now = unix_millis();
                    for packet in self.tick(now) {
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending packet: {}", e);
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PlayerSnapshot;

    fn snapshot(id: u32, name: &str, position: Vec3) -> PlayerSnapshot {
        PlayerSnapshot {
            id,
            name: name.to_string(),
            color: "#4f8fea".to_string(),
            position,
            rotation: Vec3::default(),
            velocity: Vec3::default(),
            score: 0,
            room_id: "default".to_string(),
            platform_slot: 0,
        }
    }

    async fn joined_client() -> Client {
        let mut client = Client::new("127.0.0.1:9", "Ada", "default").await.unwrap();
        client.handle_packet(Packet::GameJoined {
            player_id: 1,
            room_id: "default".to_string(),
            players: vec![
                snapshot(1, "Ada", Vec3::new(-3.25, 1.0, -3.25)),
                snapshot(2, "Grace", Vec3::new(3.25, 1.0, -3.25)),
            ],
            phase: Phase::Lobby,
            time_remaining: 60,
        });
        client
    }

    #[tokio::test]
    async fn test_game_joined_builds_bodies() {
        let client = joined_client().await;

        assert_eq!(client.player_id(), Some(1));
        assert_eq!(client.bodies().len(), 2);
        assert_eq!(client.phase(), Phase::Lobby);
        assert_eq!(client.score_of(2), Some(0));
    }

    #[tokio::test]
    async fn test_player_moved_applied_next_tick() {
        let mut client = joined_client().await;

        let moved = Vec3::new(2.0, 1.0, -3.0);
        client.handle_packet(Packet::PlayerMoved {
            player_id: 2,
            position: moved,
            rotation: None,
            velocity: Some(Vec3::new(1.0, 0.0, 0.0)),
        });

        // Not applied until the next tick runs.
        assert_eq!(
            client.bodies().get(2).unwrap().position,
            Vec3::new(3.25, 1.0, -3.25)
        );

        client.tick(0);
        let body = client.bodies().get(2).unwrap();
        // One integration step has already run on top of the applied write.
        assert!((body.position.x - moved.x).abs() < 0.1);
        assert!((body.position.z - moved.z).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_player_left_is_idempotent() {
        let mut client = joined_client().await;

        client.handle_packet(Packet::PlayerLeft { player_id: 2 });
        assert_eq!(client.bodies().len(), 1);

        client.handle_packet(Packet::PlayerLeft { player_id: 2 });
        assert_eq!(client.bodies().len(), 1);
    }

    #[tokio::test]
    async fn test_lobby_transition_resets_scores() {
        let mut client = joined_client().await;
        client.handle_packet(Packet::ScoreUpdate {
            player_id: 2,
            score: 3,
        });
        assert_eq!(client.score_of(2), Some(3));

        client.handle_packet(Packet::GameStateUpdate {
            phase: Phase::Lobby,
            time_remaining: None,
        });
        assert_eq!(client.score_of(2), Some(0));
    }

    #[tokio::test]
    async fn test_position_updates_are_throttled() {
        let mut client = joined_client().await;
        client.handle_packet(Packet::GameStateUpdate {
            phase: Phase::Playing,
            time_remaining: Some(60),
        });

        let count_updates = |packets: &[Packet]| {
            packets
                .iter()
                .filter(|p| matches!(p, Packet::UpdatePosition { .. }))
                .count()
        };

        // 16ms ticks: only the first and the one crossing 50ms may send.
        let mut sent = 0;
        for tick in 0..5u64 {
            sent += count_updates(&client.tick(tick * 16));
        }
        assert_eq!(sent, 2); // t=0 and t=64
    }
}
