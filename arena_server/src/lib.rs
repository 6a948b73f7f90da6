//! `arena_server`
//!
//! Server-side systems:
//! - Fixed timestep simulation of the authoritative world
//! - Player login and announcement of newcomers
//! - Receives key edges, echoes them to every client
//! - Sends `GameState` snapshots every 100 ms
//!
//! Networking model:
//! - TCP: handshake, Login, DrawNewPlayer
//! - UDP: key edges, key echoes, game state

pub mod server;
pub mod wire;

pub use server::{bind_ephemeral, GameServer};
pub use wire::ServerPacket;
