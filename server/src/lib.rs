//! # Game Server Library
//!
//! Authoritative server for the sumo spheres arena. Clients simulate their
//! own physics; the server owns everything worth arguing about — room
//! membership, the match phase, the countdown timer and the scores — and
//! relays per-player position reports to room peers without validating
//! them.
//!
//! ## Architecture
//!
//! The server is a single-threaded, event-driven loop. Incoming packets are
//! funneled through a channel by a receiver task, handled to completion
//! against the room registry, and answered by queueing outgoing packets to
//! a sender task. A 1 Hz interval on the same loop drives every room's
//! match timer and the connection liveness sweep. Because one loop owns all
//! state, no handler ever observes another handler mid-mutation.
//!
//! Rooms cycle Lobby -> Playing -> GameOver -> Lobby. Phase-mismatched
//! commands are dropped silently; a join against a full room is the one
//! error surfaced back to the requester. The "default" room is created at
//! startup and never deleted; any other room lives exactly as long as it
//! has members.
//!
//! ## Module Organization
//!
//! - [`room`] — rooms, the registry, phase transitions, score bookkeeping
//!   and the relay handlers. Pure state machine: handlers return the
//!   messages to fan out.
//! - [`network`] — the UDP plumbing, connection bindings and the event
//!   loop that ties packets and timers to the registry.
//! - [`utils`] — the player color palette.

pub mod network;
pub mod room;
pub mod utils;
