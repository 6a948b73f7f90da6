//! Server → client wire types.
//!
//! The shared packet types have no public constructors; clients only ever
//! decode them. The server writes the same JSON shape from these types.

use arena_shared::{
    entity::{GameId, PlayerId},
    keys::KeyCode,
    packet::{PlayerLocation, PlayerRotation},
};
use serde::Serialize;

/// Mirrors `IncomingPacket` variant for variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ServerPacket {
    Login {
        game_id: GameId,
        player_id: PlayerId,
        players: Vec<PlayerLocation>,
    },
    DrawNewPlayer {
        game_id: GameId,
        player_id: PlayerId,
        x: f32,
        y: f32,
        rotation: f32,
    },
    GameState {
        locations: Vec<PlayerLocation>,
        rotations: Vec<PlayerRotation>,
    },
    KeyPressedResponse {
        game_id: GameId,
        player_id: PlayerId,
        key: KeyCode,
    },
    KeyUnpressedResponse {
        game_id: GameId,
        player_id: PlayerId,
        key: KeyCode,
    },
    Disconnect {
        reason: String,
    },
}
