//! Performance benchmarks for critical game systems

use client::body::{Body, BodyKind, BodyRegistry};
use client::collision::CollisionResolver;
use server::room::RoomRegistry;
use shared::{Packet, Vec3};
use std::time::Instant;

fn crowded_registry(count: u32) -> BodyRegistry {
    let mut registry = BodyRegistry::new();
    for id in 1..=count {
        let angle = id as f32 * 0.7;
        registry.insert(Body::new(
            id,
            BodyKind::Player,
            Vec3::new(angle.cos() * 1.2, 0.75, angle.sin() * 1.2),
        ));
    }
    registry
}

/// Benchmarks the pairwise collision resolver with a full room of spheres
#[test]
fn benchmark_collision_resolution() {
    let mut registry = crowded_registry(8);
    let mut resolver = CollisionResolver::default();

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        resolver.resolve(&mut registry, i as u64 * 16);
    }

    let duration = start.elapsed();
    println!(
        "Collision resolution: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a full physics step across a crowded arena
#[test]
fn benchmark_physics_step() {
    let mut registry = crowded_registry(8);
    let mut resolver = CollisionResolver::default();

    let dt = 1.0 / 60.0;
    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        resolver.resolve(&mut registry, i as u64 * 16);
        registry.step(dt);
    }

    let duration = start.elapsed();
    println!(
        "Physics step: {} bodies x {} frames in {:?} ({:.2} μs/frame)",
        registry.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks room timer sweeps across many concurrent matches
#[test]
fn benchmark_timer_sweep() {
    let mut registry = RoomRegistry::new();
    for room in 0..50 {
        let room_id = format!("room-{}", room);
        let (player_id, _) = registry.join("P", &room_id).unwrap();
        registry.start_game(player_id);
    }

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        // The first 60 sweeps carry live timers; the rest measure the idle
        // scan over finished rooms.
        let _ = registry.tick_timers();
    }

    let duration = start.elapsed();
    println!(
        "Timer sweep: 50 rooms x {} sweeps in {:?} ({:.2} μs/sweep)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks network packet serialization performance
#[test]
fn benchmark_packet_serialization() {
    use bincode::{deserialize, serialize};

    let mut registry = RoomRegistry::new();
    for i in 0..8 {
        registry.join(&format!("P{}", i), "default").unwrap();
    }
    let room = registry.room("default").unwrap();
    let players: Vec<shared::PlayerSnapshot> = room.players.values().cloned().collect();

    let packet = Packet::GameJoined {
        player_id: 1,
        room_id: "default".to_string(),
        players,
        phase: shared::Phase::Lobby,
        time_remaining: 60,
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let serialized = serialize(&packet).unwrap();
        let _: Packet = deserialize(&serialized).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} round-trips in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
