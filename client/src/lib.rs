//! # Game Client Library
//!
//! Client-side simulation for the sumo spheres arena. The client owns a
//! local physics world containing one sphere body per participant: the
//! local player plus a shadow body for every remote player the server
//! relays. All of the game feel lives here — collision impulses, proximity
//! separation, fall/respawn handling and the bunny-hop movement controller
//! run identically for every body, so any sphere can push or be pushed
//! regardless of who controls it.
//!
//! The server stays authoritative over rooms, phases and scores; this crate
//! only mirrors that state and reports score-affecting events (falls) as it
//! observes them. Cross-client physics is deliberately not lockstep: each
//! client resolves collisions against its own view of the world and small
//! divergences are tolerated by design.
//!
//! ## Module Organization
//!
//! - [`body`] — sphere bodies, the explicit body registry and the per-tick
//!   integrator (gravity, damping, platform support).
//! - [`collision`] — impulse-based sphere-vs-sphere resolution with per-pair
//!   cooldowns, plus the short-range proximity repulsion band.
//! - [`fall`] — the Grounded/Fallen state machine, fall reporting and
//!   delayed respawns.
//! - [`movement`] — input intent to forces, speed-adaptive drag and the
//!   escalating-then-capped jump chain.
//! - [`network`] — the UDP connection, the mirrored room state and the
//!   simulation tick loop.
//!
//! Rendering, camera control and input capture are external collaborators:
//! embedders feed an [`movement::InputIntent`] and a
//! [`movement::CameraBasis`] in and read body positions out.

pub mod body;
pub mod collision;
pub mod fall;
pub mod movement;
pub mod network;
