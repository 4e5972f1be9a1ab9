//! Server network layer handling UDP communications and room coordination
//!
//! One event loop owns all server state: packets arrive through a channel,
//! are handled to completion (no cross-await mutation), and the resulting
//! fan-out is queued to a sender task. A 1 Hz arm of the same loop drives
//! every room's match timer and the connection liveness sweep — UDP has no
//! disconnect signal, so a silent peer is treated as disconnected.

use crate::room::{Delivery, Outbound, RoomRegistry};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// A peer that has not been heard from for this long is disconnected.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Outgoing packet queued for the sender task
#[derive(Debug)]
pub struct OutgoingPacket {
    pub packet: Packet,
    pub addr: SocketAddr,
}

/// Main server coordinating networking and room state
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: RoomRegistry,

    /// Connection bindings established by a successful join.
    players_by_addr: HashMap<SocketAddr, u32>,
    addrs_by_player: HashMap<u32, SocketAddr>,
    last_seen: HashMap<SocketAddr, Instant>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutgoingPacket>,
    out_rx: mpsc::UnboundedReceiver<OutgoingPacket>,
}

impl Server {
    pub async fn new(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            registry: RoomRegistry::new(),
            players_by_addr: HashMap::new(),
            addrs_by_player: HashMap::new(),
            last_seen: HashMap::new(),
            server_tx,
            server_rx,
            out_tx,
            out_rx,
        })
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 4096];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                match serialize(&outgoing.packet) {
                    Ok(data) => {
                        if let Err(e) = socket.send_to(&data, outgoing.addr).await {
                            error!("Failed to send packet to {}: {}", outgoing.addr, e);
                        }
                    }
                    Err(e) => error!("Failed to serialize outgoing packet: {}", e),
                }
            }
        });
    }

    fn queue_packet(&self, packet: Packet, addr: SocketAddr) {
        if self.out_tx.send(OutgoingPacket { packet, addr }).is_err() {
            error!("Failed to queue packet for sending");
        }
    }

    /// Resolves registry deliveries to socket addresses and queues them.
    fn dispatch(&self, outbound: Vec<Outbound>) {
        for message in outbound {
            match message.delivery {
                Delivery::To(player_id) => {
                    if let Some(addr) = self.addrs_by_player.get(&player_id) {
                        self.queue_packet(message.packet, *addr);
                    }
                }
                Delivery::Room(room_id) => {
                    for player_id in self.registry.room_members(&room_id) {
                        if let Some(addr) = self.addrs_by_player.get(&player_id) {
                            self.queue_packet(message.packet.clone(), *addr);
                        }
                    }
                }
                Delivery::Others { room, except } => {
                    for player_id in self.registry.room_members(&room) {
                        if player_id == except {
                            continue;
                        }
                        if let Some(addr) = self.addrs_by_player.get(&player_id) {
                            self.queue_packet(message.packet.clone(), *addr);
                        }
                    }
                }
            }
        }
    }

    /// Processes one packet to completion against the room registry
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        self.last_seen.insert(addr, Instant::now());

        match packet {
            Packet::JoinGame {
                player_name,
                room_id,
            } => {
                // A re-join from a bound address replaces the old identity.
                if let Some(existing) = self.players_by_addr.get(&addr).copied() {
                    info!("Replacing existing player {} from {}", existing, addr);
                    self.unbind(addr);
                }

                match self.registry.join(&player_name, &room_id) {
                    Ok((player_id, outbound)) => {
                        self.players_by_addr.insert(addr, player_id);
                        self.addrs_by_player.insert(player_id, addr);
                        self.dispatch(outbound);
                    }
                    Err(message) => {
                        debug!("Join from {} rejected: {}", addr, message);
                        self.queue_packet(Packet::JoinError { message }, addr);
                    }
                }
            }

            Packet::UpdatePosition {
                position,
                rotation,
                velocity,
            } => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound =
                        self.registry
                            .update_position(player_id, position, rotation, velocity);
                    self.dispatch(outbound);
                }
            }

            Packet::PlayerAction { action } => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound = self.registry.player_action(player_id, &action);
                    self.dispatch(outbound);
                }
            }

            Packet::PlayerFell => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound = self.registry.player_fell(player_id);
                    self.dispatch(outbound);
                }
            }

            Packet::PlayerKnockout { target_id } => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound = self.registry.player_knockout(player_id, target_id);
                    self.dispatch(outbound);
                }
            }

            Packet::StartGame => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound = self.registry.start_game(player_id);
                    self.dispatch(outbound);
                }
            }

            Packet::ReturnToLobby => {
                if let Some(&player_id) = self.players_by_addr.get(&addr) {
                    let outbound = self.registry.return_to_lobby(player_id);
                    self.dispatch(outbound);
                }
            }

            Packet::Disconnect => {
                self.disconnect_addr(addr);
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    fn unbind(&mut self, addr: SocketAddr) {
        if let Some(player_id) = self.players_by_addr.remove(&addr) {
            self.addrs_by_player.remove(&player_id);
            let outbound = self.registry.disconnect(player_id);
            self.dispatch(outbound);
        }
    }

    fn disconnect_addr(&mut self, addr: SocketAddr) {
        self.last_seen.remove(&addr);
        self.unbind(addr);
    }

    /// Disconnects peers that have gone silent past the timeout
    fn sweep_timeouts(&mut self) {
        let timed_out: Vec<SocketAddr> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed() > CONNECTION_TIMEOUT)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in timed_out {
            info!("Connection {} timed out", addr);
            self.disconnect_addr(addr);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        // Room timers run at 1 Hz; the liveness sweep shares the interval.
        let mut second_interval = interval(Duration::from_secs(1));

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = second_interval.tick() => {
                    let outbound = self.registry.tick_timers();
                    self.dispatch(outbound);
                    self.sweep_timeouts();
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Phase, Vec3};

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0").await.unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[tokio::test]
    async fn test_join_binds_connection() {
        let mut server = test_server().await;
        server.handle_packet(
            Packet::JoinGame {
                player_name: "Ada".to_string(),
                room_id: "default".to_string(),
            },
            addr(5000),
        );

        let player_id = *server.players_by_addr.get(&addr(5000)).unwrap();
        assert_eq!(server.addrs_by_player.get(&player_id), Some(&addr(5000)));
        assert_eq!(
            server.registry.room("default").unwrap().players.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_full_room_join_leaves_no_binding() {
        let mut server = test_server().await;
        for port in 0..8u16 {
            server.handle_packet(
                Packet::JoinGame {
                    player_name: format!("P{}", port),
                    room_id: "default".to_string(),
                },
                addr(5000 + port),
            );
        }

        server.handle_packet(
            Packet::JoinGame {
                player_name: "Late".to_string(),
                room_id: "default".to_string(),
            },
            addr(5100),
        );

        assert!(!server.players_by_addr.contains_key(&addr(5100)));
        assert_eq!(server.registry.room("default").unwrap().players.len(), 8);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut server = test_server().await;
        server.handle_packet(
            Packet::JoinGame {
                player_name: "Ada".to_string(),
                room_id: "default".to_string(),
            },
            addr(5000),
        );

        server.handle_packet(Packet::Disconnect, addr(5000));
        assert!(server.players_by_addr.is_empty());
        assert!(server.registry.room("default").unwrap().players.is_empty());

        // A duplicate disconnect from the same address is a safe no-op.
        server.handle_packet(Packet::Disconnect, addr(5000));
        assert!(server.players_by_addr.is_empty());
    }

    #[tokio::test]
    async fn test_events_before_join_are_ignored() {
        let mut server = test_server().await;
        server.handle_packet(Packet::StartGame, addr(5000));
        server.handle_packet(Packet::PlayerFell, addr(5000));
        server.handle_packet(
            Packet::UpdatePosition {
                position: Vec3::default(),
                rotation: None,
                velocity: None,
            },
            addr(5000),
        );

        assert_eq!(
            server.registry.room("default").unwrap().phase,
            Phase::Lobby
        );
    }

    #[tokio::test]
    async fn test_rejoin_replaces_previous_identity() {
        let mut server = test_server().await;
        server.handle_packet(
            Packet::JoinGame {
                player_name: "Ada".to_string(),
                room_id: "default".to_string(),
            },
            addr(5000),
        );
        let first_id = *server.players_by_addr.get(&addr(5000)).unwrap();

        server.handle_packet(
            Packet::JoinGame {
                player_name: "Ada".to_string(),
                room_id: "default".to_string(),
            },
            addr(5000),
        );
        let second_id = *server.players_by_addr.get(&addr(5000)).unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(server.registry.room("default").unwrap().players.len(), 1);
        assert!(!server.addrs_by_player.contains_key(&first_id));
    }
}
